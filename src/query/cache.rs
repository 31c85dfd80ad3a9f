//! Aggregation cache
//!
//! Maps a query fingerprint to its most recent computed result and the
//! time it was computed. A result is never served past its staleness
//! bound; an expired fingerprint is recomputed on next access. The cache
//! is best-effort: concurrent requests for the same expired fingerprint
//! may recompute more than once, which is acceptable because every
//! computation is an idempotent pure read of the store.

use std::future::Future;
use std::time::Duration;

use dashmap::DashMap;
use serde_json::Value;
use tokio::time::Instant;

use crate::error::AppError;

/// The fixed set of aggregate queries the API exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryKind {
    Summary,
    TopDomains,
    TopBlocked,
    TopClients,
    Timeline,
    QueryTypes,
}

/// Identity key for one aggregate query's cached result: the kind plus
/// the parameters it was computed with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint {
    pub kind: QueryKind,
    pub window_secs: i64,
    pub limit: i64,
}

impl Fingerprint {
    pub fn new(kind: QueryKind, window_secs: i64, limit: i64) -> Self {
        Self {
            kind,
            window_secs,
            limit,
        }
    }
}

struct CacheEntry {
    payload: Value,
    computed_at: Instant,
}

#[derive(Default)]
pub struct QueryCache {
    entries: DashMap<Fingerprint, CacheEntry>,
}

impl QueryCache {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Return the cached payload when its age is within `max_age`.
    pub fn lookup(&self, fingerprint: &Fingerprint, max_age: Duration) -> Option<Value> {
        let entry = self.entries.get(fingerprint)?;
        if entry.computed_at.elapsed() <= max_age {
            Some(entry.payload.clone())
        } else {
            None
        }
    }

    /// Store a freshly computed payload. Last write wins; the cache never
    /// holds more than one entry per fingerprint.
    pub fn store(&self, fingerprint: Fingerprint, payload: Value) {
        self.entries.insert(
            fingerprint,
            CacheEntry {
                payload,
                computed_at: Instant::now(),
            },
        );
    }

    /// Serve from cache within the staleness bound, otherwise recompute,
    /// cache and return.
    pub async fn get_or_compute<F, Fut>(
        &self,
        fingerprint: Fingerprint,
        max_age: Duration,
        compute: F,
    ) -> Result<Value, AppError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Value, AppError>>,
    {
        if let Some(hit) = self.lookup(&fingerprint, max_age) {
            metrics::counter!("dns_cache_hits_total").increment(1);
            return Ok(hit);
        }

        metrics::counter!("dns_cache_misses_total").increment(1);
        let payload = compute().await?;
        self.store(fingerprint, payload.clone());
        Ok(payload)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
