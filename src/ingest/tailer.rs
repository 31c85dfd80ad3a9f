//! Tailing source reader
//!
//! Follows the resolver's append-only log, survives rotation and
//! truncation, and feeds decoded events into the bounded buffer. The only
//! suspension point in the ingestion path is the poll-interval sleep; the
//! reader never blocks on a full buffer (the buffer evicts instead), so a
//! slow store can never turn into an unbounded source backlog.

use std::io::{self, SeekFrom};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::sync::{broadcast, Notify};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::buffer::EventBuffer;
use super::decoder::LineDecoder;
use crate::config::IngestConfig;
use crate::signals::ShutdownSignal;

/// Reader attachment state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TailerState {
    /// Source is open and being followed.
    Attached,
    /// Source is missing or unreadable; reattach is retried each poll.
    Detached,
}

/// How far into the source has been consumed. Owned solely by the tailer;
/// reset when the source identity changes or the file shrinks below the
/// recorded offset.
#[derive(Debug, Clone, Copy, Default)]
pub struct SourceCursor {
    pub offset: u64,
    pub identity: Option<u64>,
}

pub struct LogTailer {
    path: PathBuf,
    poll_interval: Duration,
    batch_size: usize,
    decoder: LineDecoder,
    buffer: Arc<EventBuffer>,
    flush_hint: Arc<Notify>,
    cursor: SourceCursor,
    state: TailerState,
    /// Trailing bytes of the last read that did not end in a newline,
    /// held back until completed by a subsequent read.
    partial: String,
    last_timestamp: Option<i64>,
    decode_failures: u64,
}

impl LogTailer {
    pub fn new(config: &IngestConfig, buffer: Arc<EventBuffer>, flush_hint: Arc<Notify>) -> Self {
        Self {
            path: PathBuf::from(&config.log_path),
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            batch_size: config.batch_size,
            decoder: LineDecoder::new(),
            buffer,
            flush_hint,
            cursor: SourceCursor::default(),
            state: TailerState::Detached,
            partial: String::new(),
            last_timestamp: None,
            decode_failures: 0,
        }
    }

    /// Drive the tail-read-decode-buffer loop until shutdown.
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<ShutdownSignal>) {
        info!(path = %self.path.display(), "log tailer started");

        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(err) = self.poll_once().await {
                        self.on_unavailable(&err);
                    }
                }
                _ = shutdown.recv() => {
                    info!("shutdown received, stopping log tailer");
                    break;
                }
            }
        }

        info!(
            decode_failures = self.decode_failures,
            dropped = self.buffer.dropped(),
            "log tailer stopped"
        );
    }

    /// Read newly appended bytes since the cursor, if any.
    async fn poll_once(&mut self) -> io::Result<()> {
        let metadata = tokio::fs::metadata(&self.path).await?;
        let identity = file_identity(&metadata);
        let size = metadata.len();

        if self.state == TailerState::Detached {
            info!(path = %self.path.display(), "log source attached");
            self.state = TailerState::Attached;
        }

        // Initial attach positions the cursor at end-of-file: history is
        // not backfilled, only new appends are consumed.
        let Some(known) = self.cursor.identity else {
            self.cursor = SourceCursor {
                offset: size,
                identity: Some(identity),
            };
            debug!(offset = size, "cursor initialized at end of source");
            return Ok(());
        };

        let rotated = identity != known || size < self.cursor.offset;
        if rotated {
            info!(
                old_identity = known,
                new_identity = identity,
                "log source rotated, resetting cursor to offset 0"
            );
            metrics::counter!("dns_source_rotations_total").increment(1);
            self.cursor = SourceCursor {
                offset: 0,
                identity: Some(identity),
            };
            self.partial.clear();
            // Timestamps may legitimately reset backward across a rotation.
            self.last_timestamp = None;
        }

        if size == self.cursor.offset {
            return Ok(());
        }

        let mut file = tokio::fs::File::open(&self.path).await?;
        file.seek(SeekFrom::Start(self.cursor.offset)).await?;

        let mut raw = Vec::with_capacity((size - self.cursor.offset) as usize);
        file.take(size - self.cursor.offset)
            .read_to_end(&mut raw)
            .await?;

        // The cursor always advances past read bytes, even when a decoded
        // event is later evicted from the buffer.
        self.cursor.offset += raw.len() as u64;
        let chunk = String::from_utf8_lossy(&raw).into_owned();
        self.consume(&chunk);

        Ok(())
    }

    /// Split buffered bytes into complete lines and decode each one.
    fn consume(&mut self, chunk: &str) {
        self.partial.push_str(chunk);

        while let Some(pos) = self.partial.find('\n') {
            let line: String = self.partial.drain(..=pos).collect();
            let line = line.trim_end_matches(['\n', '\r']);
            if line.is_empty() {
                continue;
            }

            metrics::counter!("dns_lines_read_total").increment(1);
            match self.decoder.decode(line) {
                Ok(event) => {
                    self.check_timestamp_order(event.timestamp);
                    let buffered = self.buffer.push(event);
                    if buffered >= self.batch_size {
                        self.flush_hint.notify_one();
                    }
                }
                Err(err) => {
                    self.decode_failures += 1;
                    metrics::counter!("dns_decode_failures_total").increment(1);
                    debug!(error = %err, "skipping undecodable line");
                }
            }
        }
    }

    /// A backward jump without a rotation signal is a clock anomaly
    /// upstream. Logged and counted, never guessed at.
    fn check_timestamp_order(&mut self, timestamp: i64) {
        if let Some(prev) = self.last_timestamp {
            if timestamp < prev {
                warn!(
                    previous = prev,
                    current = timestamp,
                    "timestamp moved backward without rotation"
                );
                metrics::counter!("dns_timestamp_anomalies_total").increment(1);
            }
        }
        self.last_timestamp = Some(timestamp);
    }

    fn on_unavailable(&mut self, err: &io::Error) {
        if self.state != TailerState::Detached {
            warn!(
                path = %self.path.display(),
                error = %err,
                "log source unavailable, will retry on poll interval"
            );
            self.state = TailerState::Detached;
        } else {
            debug!(path = %self.path.display(), error = %err, "log source still unavailable");
        }
    }
}

#[cfg(unix)]
fn file_identity(metadata: &std::fs::Metadata) -> u64 {
    use std::os::unix::fs::MetadataExt;
    metadata.ino()
}

#[cfg(not(unix))]
fn file_identity(_metadata: &std::fs::Metadata) -> u64 {
    // Truncation detection (size < offset) still applies.
    0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IngestConfig;

    fn tailer_with_buffer(capacity: usize) -> (LogTailer, Arc<EventBuffer>) {
        let config = IngestConfig {
            log_path: "/nonexistent/pihole.log".to_string(),
            ..IngestConfig::default()
        };
        let buffer = Arc::new(EventBuffer::new(capacity));
        let tailer = LogTailer::new(&config, Arc::clone(&buffer), Arc::new(Notify::new()));
        (tailer, buffer)
    }

    #[test]
    fn holds_back_partial_line_until_completed() {
        let (mut tailer, buffer) = tailer_with_buffer(16);

        tailer.consume("Aug  7 12:00:01 dnsmasq[1]: query[A] a.com from 10.0.0.1\nAug  7 12:00:02 dnsmasq[1]: query[A] b.co");
        assert_eq!(buffer.len(), 1);

        tailer.consume("m from 10.0.0.2\n");
        let drained = buffer.drain_all();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[1].domain, "b.com");
    }

    #[test]
    fn decode_failures_counted_but_not_fatal() {
        let (mut tailer, buffer) = tailer_with_buffer(16);

        tailer.consume("not a dns line\nAug  7 12:00:03 dnsmasq[1]: query[A] c.com from 10.0.0.3\n");
        assert_eq!(tailer.decode_failures, 1);
        assert_eq!(buffer.len(), 1);
    }

    #[test]
    fn blank_lines_are_skipped() {
        let (mut tailer, buffer) = tailer_with_buffer(16);
        tailer.consume("\n\r\n\n");
        assert_eq!(tailer.decode_failures, 0);
        assert!(buffer.is_empty());
    }
}
