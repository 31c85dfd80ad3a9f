use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub query: QueryConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Ingestion pipeline tuning. Defaults mirror a low-memory deployment:
/// small batches, a small oldest-evicting buffer, half-second polling.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IngestConfig {
    /// The resolver's append-only query log.
    #[serde(default = "default_log_path")]
    pub log_path: String,

    /// How long the tailer sleeps when no new bytes are available.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Maximum events held in memory awaiting a flush; overflow evicts
    /// the oldest pending event.
    #[serde(default = "default_buffer_capacity")]
    pub buffer_capacity: usize,

    /// Flush as soon as this many events are buffered.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Flush at least this often regardless of batch size.
    #[serde(default = "default_batch_interval_secs")]
    pub batch_interval_secs: u64,

    /// Retries for a failed batch insert before the batch is dropped.
    #[serde(default = "default_write_retries")]
    pub write_retries: u32,

    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Consecutive lost batches before the store is declared unavailable
    /// and the process shuts down.
    #[serde(default = "default_max_consecutive_failures")]
    pub max_consecutive_failures: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_path")]
    pub path: String,
}

/// Query API windows, limits and per-endpoint staleness bounds.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QueryConfig {
    /// Aggregation window for the dashboard endpoints, in seconds.
    #[serde(default = "default_window_secs")]
    pub window_secs: i64,

    /// Row limit for the top-N endpoints.
    #[serde(default = "default_top_limit")]
    pub top_limit: i64,

    /// Row limit for the recent-queries endpoint.
    #[serde(default = "default_recent_limit")]
    pub recent_limit: i64,

    #[serde(default = "default_summary_ttl_secs")]
    pub summary_ttl_secs: u64,

    #[serde(default = "default_toplist_ttl_secs")]
    pub toplist_ttl_secs: u64,

    #[serde(default = "default_query_types_ttl_secs")]
    pub query_types_ttl_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetentionConfig {
    /// Rows older than this many days are eligible for the sweep.
    #[serde(default = "default_retention_days")]
    pub days: u64,

    /// Hour of day (0-23) the daily sweep runs.
    #[serde(default = "default_cleanup_hour")]
    pub cleanup_hour: u8,
}

impl IngestConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn batch_interval(&self) -> Duration {
        Duration::from_secs(self.batch_interval_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

impl QueryConfig {
    pub fn summary_ttl(&self) -> Duration {
        Duration::from_secs(self.summary_ttl_secs)
    }

    pub fn toplist_ttl(&self) -> Duration {
        Duration::from_secs(self.toplist_ttl_secs)
    }

    pub fn query_types_ttl(&self) -> Duration {
        Duration::from_secs(self.query_types_ttl_secs)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            log_level: default_log_level(),
        }
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            log_path: default_log_path(),
            poll_interval_ms: default_poll_interval_ms(),
            buffer_capacity: default_buffer_capacity(),
            batch_size: default_batch_size(),
            batch_interval_secs: default_batch_interval_secs(),
            write_retries: default_write_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            max_consecutive_failures: default_max_consecutive_failures(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
        }
    }
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            window_secs: default_window_secs(),
            top_limit: default_top_limit(),
            recent_limit: default_recent_limit(),
            summary_ttl_secs: default_summary_ttl_secs(),
            toplist_ttl_secs: default_toplist_ttl_secs(),
            query_types_ttl_secs: default_query_types_ttl_secs(),
        }
    }
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            days: default_retention_days(),
            cleanup_hour: default_cleanup_hour(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_path() -> String {
    "/var/log/pihole.log".to_string()
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_buffer_capacity() -> usize {
    100
}

fn default_batch_size() -> usize {
    50
}

fn default_batch_interval_secs() -> u64 {
    30
}

fn default_write_retries() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    500
}

fn default_max_consecutive_failures() -> u32 {
    5
}

fn default_database_path() -> String {
    "data/dns_logs.db".to_string()
}

fn default_window_secs() -> i64 {
    86400
}

fn default_top_limit() -> i64 {
    10
}

fn default_recent_limit() -> i64 {
    50
}

fn default_summary_ttl_secs() -> u64 {
    30
}

fn default_toplist_ttl_secs() -> u64 {
    60
}

fn default_query_types_ttl_secs() -> u64 {
    120
}

fn default_retention_days() -> u64 {
    30
}

fn default_cleanup_hour() -> u8 {
    3
}

/// Load configuration from the given TOML file (optional; defaults apply
/// when absent) with `DNSTRAIL__`-prefixed environment overrides.
pub fn load_config(path: &Path) -> anyhow::Result<Config> {
    let settings = config::Config::builder()
        .add_source(config::File::from(path).required(false))
        .add_source(config::Environment::with_prefix("DNSTRAIL").separator("__"))
        .build()?;

    let cfg: Config = settings.try_deserialize()?;
    validate_config(&cfg)?;

    Ok(cfg)
}

fn validate_config(cfg: &Config) -> anyhow::Result<()> {
    if cfg.ingest.log_path.is_empty() {
        anyhow::bail!("ingest.log_path must not be empty");
    }
    if cfg.ingest.batch_size == 0 {
        anyhow::bail!("ingest.batch_size must be at least 1");
    }
    if cfg.ingest.buffer_capacity < cfg.ingest.batch_size {
        anyhow::bail!(
            "ingest.buffer_capacity ({}) must be at least ingest.batch_size ({})",
            cfg.ingest.buffer_capacity,
            cfg.ingest.batch_size
        );
    }
    if cfg.ingest.batch_interval_secs == 0 {
        anyhow::bail!("ingest.batch_interval_secs must be at least 1");
    }
    if cfg.ingest.poll_interval_ms == 0 {
        anyhow::bail!("ingest.poll_interval_ms must be at least 1");
    }
    if cfg.query.window_secs <= 0 {
        anyhow::bail!("query.window_secs must be positive");
    }
    if cfg.retention.days == 0 {
        anyhow::bail!("retention.days must be at least 1");
    }
    if cfg.retention.cleanup_hour > 23 {
        anyhow::bail!("retention.cleanup_hour must be between 0 and 23");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_tuning() {
        let cfg: Config = toml::from_str("").unwrap();
        assert_eq!(cfg.ingest.batch_size, 50);
        assert_eq!(cfg.ingest.batch_interval_secs, 30);
        assert_eq!(cfg.ingest.buffer_capacity, 100);
        assert_eq!(cfg.ingest.poll_interval_ms, 500);
        assert_eq!(cfg.retention.days, 30);
        assert_eq!(cfg.query.summary_ttl_secs, 30);
        assert_eq!(cfg.query.toplist_ttl_secs, 60);
        assert_eq!(cfg.server.port, 5000);
        assert!(validate_config(&cfg).is_ok());
    }

    #[test]
    fn partial_file_overrides_only_named_fields() {
        let cfg: Config = toml::from_str(
            r#"
            [ingest]
            batch_size = 10
            buffer_capacity = 20

            [retention]
            days = 7
            "#,
        )
        .unwrap();
        assert_eq!(cfg.ingest.batch_size, 10);
        assert_eq!(cfg.ingest.buffer_capacity, 20);
        assert_eq!(cfg.ingest.batch_interval_secs, 30);
        assert_eq!(cfg.retention.days, 7);
        assert_eq!(cfg.retention.cleanup_hour, 3);
    }

    #[test]
    fn rejects_buffer_smaller_than_batch() {
        let mut cfg = Config::default();
        cfg.ingest.batch_size = 200;
        cfg.ingest.buffer_capacity = 100;
        assert!(validate_config(&cfg).is_err());
    }

    #[test]
    fn rejects_out_of_range_cleanup_hour() {
        let mut cfg = Config::default();
        cfg.retention.cleanup_hour = 24;
        assert!(validate_config(&cfg).is_err());
    }
}
