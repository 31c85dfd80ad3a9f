//! Query API handlers
//!
//! Read-only aggregate endpoints over the event store. Each cached
//! endpoint consults the aggregation cache under its fingerprint and
//! falls through to the store on a miss; `/api/recent` reads the store
//! directly (a live tail view has no useful staleness bound).

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use chrono::Utc;
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::{json, Value};

use super::cache::{Fingerprint, QueryCache, QueryKind};
use crate::config::QueryConfig;
use crate::error::AppError;
use crate::store::Store;

/// Shared state for all query API handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<Store>,
    pub cache: Arc<QueryCache>,
    pub query: QueryConfig,
    pub metrics_handle: PrometheusHandle,
}

impl AppState {
    fn window_start(&self) -> i64 {
        Utc::now().timestamp() - self.query.window_secs
    }
}

/// GET /api/stats - totals over the aggregation window
pub async fn get_stats(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    let fingerprint = Fingerprint::new(QueryKind::Summary, state.query.window_secs, 0);
    let store = Arc::clone(&state.store);
    let since = state.window_start();

    let payload = state
        .cache
        .get_or_compute(fingerprint, state.query.summary_ttl(), || async move {
            let stats = store.summary(since).await?;
            Ok(serde_json::to_value(stats)?)
        })
        .await?;

    Ok(Json(payload))
}

/// GET /api/top-domains - most queried allowed domains
pub async fn get_top_domains(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    top_domains_payload(state, QueryKind::TopDomains, false).await
}

/// GET /api/top-blocked - most blocked domains
pub async fn get_top_blocked(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    top_domains_payload(state, QueryKind::TopBlocked, true).await
}

async fn top_domains_payload(
    state: AppState,
    kind: QueryKind,
    blocked: bool,
) -> Result<Json<Value>, AppError> {
    let fingerprint = Fingerprint::new(kind, state.query.window_secs, state.query.top_limit);
    let store = Arc::clone(&state.store);
    let since = state.window_start();
    let limit = state.query.top_limit;

    let payload = state
        .cache
        .get_or_compute(fingerprint, state.query.toplist_ttl(), || async move {
            let rows = store.top_domains(since, limit, blocked).await?;
            Ok(serde_json::to_value(rows)?)
        })
        .await?;

    Ok(Json(payload))
}

/// GET /api/clients - top clients by query count
pub async fn get_clients(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    let fingerprint = Fingerprint::new(
        QueryKind::TopClients,
        state.query.window_secs,
        state.query.top_limit,
    );
    let store = Arc::clone(&state.store);
    let since = state.window_start();
    let limit = state.query.top_limit;

    let payload = state
        .cache
        .get_or_compute(fingerprint, state.query.toplist_ttl(), || async move {
            let rows = store.top_clients(since, limit).await?;
            Ok(serde_json::to_value(rows)?)
        })
        .await?;

    Ok(Json(payload))
}

/// GET /api/timeline - hourly total/blocked buckets
pub async fn get_timeline(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    let fingerprint = Fingerprint::new(QueryKind::Timeline, state.query.window_secs, 0);
    let store = Arc::clone(&state.store);
    let since = state.window_start();

    let payload = state
        .cache
        .get_or_compute(fingerprint, state.query.toplist_ttl(), || async move {
            let rows = store.timeline(since).await?;
            Ok(serde_json::to_value(rows)?)
        })
        .await?;

    Ok(Json(payload))
}

/// GET /api/query-types - query type distribution
pub async fn get_query_types(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    let fingerprint = Fingerprint::new(QueryKind::QueryTypes, state.query.window_secs, 0);
    let store = Arc::clone(&state.store);
    let since = state.window_start();

    let payload = state
        .cache
        .get_or_compute(fingerprint, state.query.query_types_ttl(), || async move {
            let rows = store.query_type_counts(since).await?;
            Ok(serde_json::to_value(rows)?)
        })
        .await?;

    Ok(Json(payload))
}

/// GET /api/recent - most recent queries, straight from the store
pub async fn get_recent(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    let rows = state.store.recent(state.query.recent_limit).await?;
    Ok(Json(serde_json::to_value(rows)?))
}

/// GET /health - store liveness probe
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    match state.store.ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({
                "status": "healthy",
                "timestamp": Utc::now().timestamp(),
            })),
        ),
        Err(err) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({
                "status": "unhealthy",
                "error": err.to_string(),
            })),
        ),
    }
}

/// GET /metrics - Prometheus exposition
pub async fn render_metrics(State(state): State<AppState>) -> String {
    state.metrics_handle.render()
}
