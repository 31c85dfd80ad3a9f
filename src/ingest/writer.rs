//! Batch writer
//!
//! Drains the ingestion buffer on a size-or-time trigger and persists each
//! batch in one transaction. The drain happens before the write so the
//! buffer's critical section is never held across a slow store operation.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, Notify};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use super::buffer::EventBuffer;
use crate::config::IngestConfig;
use crate::signals::ShutdownSignal;
use crate::store::Store;

pub struct BatchWriter {
    store: Arc<Store>,
    buffer: Arc<EventBuffer>,
    flush_hint: Arc<Notify>,
    batch_size: usize,
    batch_interval: Duration,
    write_retries: u32,
    retry_backoff: Duration,
    max_consecutive_failures: u32,
    consecutive_failures: u32,
    shutdown_tx: broadcast::Sender<ShutdownSignal>,
}

impl BatchWriter {
    pub fn new(
        config: &IngestConfig,
        store: Arc<Store>,
        buffer: Arc<EventBuffer>,
        flush_hint: Arc<Notify>,
        shutdown_tx: broadcast::Sender<ShutdownSignal>,
    ) -> Self {
        Self {
            store,
            buffer,
            flush_hint,
            batch_size: config.batch_size,
            batch_interval: config.batch_interval(),
            write_retries: config.write_retries,
            retry_backoff: config.retry_backoff(),
            max_consecutive_failures: config.max_consecutive_failures,
            consecutive_failures: 0,
            shutdown_tx,
        }
    }

    /// Drive the flush loop until shutdown, then perform one final
    /// unconditional flush of whatever remains buffered.
    pub async fn run(mut self) {
        info!(
            batch_size = self.batch_size,
            batch_interval_secs = self.batch_interval.as_secs(),
            "batch writer started"
        );

        let mut shutdown = self.shutdown_tx.subscribe();
        let hint = Arc::clone(&self.flush_hint);

        let mut ticker = tokio::time::interval(self.batch_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await; // the first tick completes immediately

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.flush().await;
                    ticker.reset();
                }
                _ = hint.notified() => {
                    // The tailer hints when the buffer reaches the batch
                    // threshold; re-check, the buffer may have been
                    // drained since the hint was raised.
                    if self.buffer.len() >= self.batch_size {
                        self.flush().await;
                        ticker.reset();
                    }
                }
                _ = shutdown.recv() => {
                    info!("shutdown received, flushing remaining events");
                    self.flush().await;
                    break;
                }
            }
        }

        info!("batch writer stopped");
    }

    /// Drain the buffer and commit the batch, retrying a failed insert a
    /// bounded number of times before declaring the batch lost.
    async fn flush(&mut self) {
        let batch = self.buffer.drain_all();
        if batch.is_empty() {
            return;
        }

        let rows = batch.len();
        let mut attempt: u32 = 0;
        loop {
            match self.store.insert_batch(&batch).await {
                Ok(()) => {
                    self.consecutive_failures = 0;
                    metrics::counter!("dns_batches_written_total").increment(1);
                    metrics::counter!("dns_rows_written_total").increment(rows as u64);
                    debug!(rows, "batch committed");
                    return;
                }
                Err(err) if attempt < self.write_retries => {
                    attempt += 1;
                    warn!(
                        error = %err,
                        attempt,
                        retries = self.write_retries,
                        "batch insert failed, backing off"
                    );
                    tokio::time::sleep(self.retry_backoff * attempt).await;
                }
                Err(err) => {
                    self.consecutive_failures += 1;
                    metrics::counter!("dns_batches_lost_total").increment(1);
                    error!(
                        error = %err,
                        rows,
                        retries = self.write_retries,
                        "batch lost after exhausting retries"
                    );
                    if self.consecutive_failures >= self.max_consecutive_failures {
                        error!(
                            consecutive = self.consecutive_failures,
                            "store unavailable, terminating ingestion"
                        );
                        let _ = self.shutdown_tx.send(ShutdownSignal::Graceful);
                    }
                    return;
                }
            }
        }
    }
}
