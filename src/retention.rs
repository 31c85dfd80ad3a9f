//! Retention sweep
//!
//! Rows older than the configured horizon are bulk-deleted below a
//! timestamp cutoff: once at startup, then daily at the configured hour.
//! The sweep shares nothing with the ingestion flow beyond the store.

use std::sync::Arc;
use std::time::Duration;

use chrono::{Timelike, Utc};
use tokio::time::interval;
use tracing::{error, info};

use crate::config::RetentionConfig;
use crate::store::Store;

/// Start the daily cleanup task. Checks hourly whether the configured
/// cleanup hour has arrived.
pub fn start_retention_task(store: Arc<Store>, config: RetentionConfig) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(Duration::from_secs(3600));
        // The first tick completes immediately; the startup sweep already
        // ran, so consume it.
        ticker.tick().await;

        loop {
            ticker.tick().await;

            if Utc::now().hour() as u8 != config.cleanup_hour {
                continue;
            }

            match run_sweep(&store, config.days).await {
                Ok(deleted) => {
                    if deleted > 0 {
                        info!(deleted, retention_days = config.days, "retention sweep completed");
                    }
                }
                Err(err) => {
                    error!(error = %err, "retention sweep failed");
                }
            }
        }
    })
}

/// Delete everything older than the retention horizon. Returns the number
/// of rows removed.
pub async fn run_sweep(store: &Store, retention_days: u64) -> Result<u64, sqlx::Error> {
    let cutoff = Utc::now().timestamp() - (retention_days as i64) * 86400;
    store.delete_before(cutoff).await
}
