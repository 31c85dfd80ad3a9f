use anyhow::Result;
use axum::{routing::get, Router};
use std::{net::SocketAddr, path::Path, sync::Arc};
use tokio::sync::Notify;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::{
    config::Config,
    ingest::{BatchWriter, EventBuffer, LogTailer},
    query::{handlers, AppState, QueryCache},
    retention,
    signals::setup_signal_handlers,
    store::Store,
};

/// Start the monitor: ingestion pipeline, retention task and query API.
///
/// This function:
/// 1. Opens the store (WAL journal, migrations)
/// 2. Spawns the tailer and batch-writer tasks
/// 3. Serves the query API with graceful shutdown support
/// 4. On shutdown, waits for the tailer to stop and the writer to perform
///    its final flush before releasing the store handle
pub async fn run(config: Config) -> Result<()> {
    info!(
        log_path = %config.ingest.log_path,
        database = %config.database.path,
        batch_size = config.ingest.batch_size,
        batch_interval_secs = config.ingest.batch_interval_secs,
        buffer_capacity = config.ingest.buffer_capacity,
        retention_days = config.retention.days,
        "dnstrail starting"
    );

    let metrics_handle = crate::metrics::init_metrics();

    // Ensure the database parent directory exists
    if let Some(parent) = Path::new(&config.database.path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let store = Arc::new(Store::connect(&config.database.path).await?);

    // Startup retention sweep, then the daily task
    match retention::run_sweep(&store, config.retention.days).await {
        Ok(deleted) if deleted > 0 => {
            info!(deleted, "startup retention sweep removed expired rows")
        }
        Ok(_) => {}
        Err(err) => tracing::warn!(error = %err, "startup retention sweep failed"),
    }
    let retention_task = retention::start_retention_task(Arc::clone(&store), config.retention.clone());

    // Ingestion pipeline: tailer -> bounded buffer -> batch writer
    let (shutdown_tx, signal_handle) = setup_signal_handlers();
    let buffer = Arc::new(EventBuffer::new(config.ingest.buffer_capacity));
    let flush_hint = Arc::new(Notify::new());

    let tailer = LogTailer::new(&config.ingest, Arc::clone(&buffer), Arc::clone(&flush_hint));
    let tailer_handle = tokio::spawn(tailer.run(shutdown_tx.subscribe()));

    let writer = BatchWriter::new(
        &config.ingest,
        Arc::clone(&store),
        Arc::clone(&buffer),
        Arc::clone(&flush_hint),
        shutdown_tx.clone(),
    );
    let writer_handle = tokio::spawn(writer.run());

    // Query API
    let app_state = AppState {
        store: Arc::clone(&store),
        cache: Arc::new(QueryCache::new()),
        query: config.query.clone(),
        metrics_handle,
    };
    let app = create_router(app_state);

    let addr = SocketAddr::from((
        config.server.host.parse::<std::net::IpAddr>()?,
        config.server.port,
    ));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("serving query API on {}", addr);

    let mut shutdown_rx = shutdown_tx.subscribe();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.recv().await;
            info!("shutdown signal received, draining connections");
        })
        .await?;

    // Ordered teardown: the tailer stops polling, the writer performs its
    // final flush, and only then is the store handle released.
    tailer_handle.await?;
    writer_handle.await?;
    retention_task.abort();
    signal_handle.abort();
    store.close().await;

    info!("server stopped gracefully");
    Ok(())
}

/// Create the axum router with all routes and middleware
fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/metrics", get(handlers::render_metrics))
        .route("/api/stats", get(handlers::get_stats))
        .route("/api/top-domains", get(handlers::get_top_domains))
        .route("/api/top-blocked", get(handlers::get_top_blocked))
        .route("/api/clients", get(handlers::get_clients))
        .route("/api/timeline", get(handlers::get_timeline))
        .route("/api/query-types", get(handlers::get_query_types))
        .route("/api/recent", get(handlers::get_recent))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
