//! SQLite-backed event store
//!
//! Append-mostly table of decoded DNS events plus the fixed aggregate
//! query set the dashboard endpoints are built on. WAL journaling with
//! `synchronous=NORMAL` trades OS-crash durability for write throughput:
//! a committed batch survives a process crash, which is the durability
//! level this pipeline promises.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqliteSynchronous};
use sqlx::{FromRow, QueryBuilder, Sqlite};

use crate::ingest::DnsEvent;

/// SQLite has a bind-parameter ceiling; batches are chunked well below it
/// inside a single transaction.
const INSERT_CHUNK_ROWS: usize = 100;

pub struct Store {
    pool: SqlitePool,
    writes: AtomicU64,
    reads: AtomicU64,
}

/// Last-24h style roll-up for the summary endpoint.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SummaryStats {
    pub total_queries: i64,
    pub blocked_queries: i64,
    pub blocked_percentage: f64,
    pub unique_domains: i64,
    pub unique_clients: i64,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct DomainCount {
    pub domain: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ClientCount {
    pub client: String,
    pub queries: i64,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct TimelineBucket {
    #[serde(rename = "timestamp")]
    pub bucket: i64,
    pub total: i64,
    pub blocked: i64,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct TypeCount {
    #[serde(rename = "type")]
    pub query_type: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct RecentQuery {
    pub timestamp: i64,
    pub client: Option<String>,
    pub domain: String,
    #[serde(rename = "type")]
    pub query_type: Option<String>,
    pub status: String,
    pub blocked: bool,
}

impl Store {
    /// Open (creating if missing) the database and run migrations.
    pub async fn connect(path: &str) -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePool::connect_with(options).await?;
        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self {
            pool,
            writes: AtomicU64::new(0),
            reads: AtomicU64::new(0),
        })
    }

    /// Persist a batch of events in one transaction, preserving arrival
    /// order.
    pub async fn insert_batch(&self, events: &[DnsEvent]) -> Result<(), sqlx::Error> {
        if events.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        for chunk in events.chunks(INSERT_CHUNK_ROWS) {
            let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(
                "INSERT INTO dns_queries \
                 (timestamp, client_ip, domain, query_type, status, blocked, response_time_ms) ",
            );
            builder.push_values(chunk, |mut row, event| {
                row.push_bind(event.timestamp)
                    .push_bind(event.client.as_deref())
                    .push_bind(event.domain.as_str())
                    .push_bind(event.query_type.map(|t| t.as_str()))
                    .push_bind(event.outcome.as_str())
                    .push_bind(event.outcome.is_blocked() as i64)
                    .push_bind(event.response_time_ms);
            });
            builder.build().execute(&mut *tx).await?;
        }
        tx.commit().await?;

        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    pub async fn summary(&self, since: i64) -> Result<SummaryStats, sqlx::Error> {
        self.note_read();
        let (total, blocked, domains, clients) = sqlx::query_as::<_, (i64, i64, i64, i64)>(
            "SELECT COUNT(*), COALESCE(SUM(blocked), 0), \
             COUNT(DISTINCT domain), COUNT(DISTINCT client_ip) \
             FROM dns_queries WHERE timestamp > ?",
        )
        .bind(since)
        .fetch_one(&self.pool)
        .await?;

        let blocked_percentage = if total > 0 {
            (blocked as f64 / total as f64 * 1000.0).round() / 10.0
        } else {
            0.0
        };

        Ok(SummaryStats {
            total_queries: total,
            blocked_queries: blocked,
            blocked_percentage,
            unique_domains: domains,
            unique_clients: clients,
        })
    }

    pub async fn top_domains(
        &self,
        since: i64,
        limit: i64,
        blocked: bool,
    ) -> Result<Vec<DomainCount>, sqlx::Error> {
        self.note_read();
        sqlx::query_as(
            "SELECT domain, COUNT(*) AS count FROM dns_queries \
             WHERE timestamp > ? AND blocked = ? \
             GROUP BY domain ORDER BY count DESC LIMIT ?",
        )
        .bind(since)
        .bind(blocked as i64)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
    }

    pub async fn top_clients(&self, since: i64, limit: i64) -> Result<Vec<ClientCount>, sqlx::Error> {
        self.note_read();
        sqlx::query_as(
            "SELECT client_ip AS client, COUNT(*) AS queries FROM dns_queries \
             WHERE client_ip IS NOT NULL AND timestamp > ? \
             GROUP BY client_ip ORDER BY queries DESC LIMIT ?",
        )
        .bind(since)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
    }

    /// Hourly total/blocked buckets over the window.
    pub async fn timeline(&self, since: i64) -> Result<Vec<TimelineBucket>, sqlx::Error> {
        self.note_read();
        sqlx::query_as(
            "SELECT (timestamp / 3600) * 3600 AS bucket, \
             COUNT(*) AS total, COALESCE(SUM(blocked), 0) AS blocked \
             FROM dns_queries WHERE timestamp > ? \
             GROUP BY bucket ORDER BY bucket",
        )
        .bind(since)
        .fetch_all(&self.pool)
        .await
    }

    pub async fn query_type_counts(&self, since: i64) -> Result<Vec<TypeCount>, sqlx::Error> {
        self.note_read();
        sqlx::query_as(
            "SELECT query_type, COUNT(*) AS count FROM dns_queries \
             WHERE query_type IS NOT NULL AND timestamp > ? \
             GROUP BY query_type ORDER BY count DESC",
        )
        .bind(since)
        .fetch_all(&self.pool)
        .await
    }

    pub async fn recent(&self, limit: i64) -> Result<Vec<RecentQuery>, sqlx::Error> {
        self.note_read();
        sqlx::query_as(
            "SELECT timestamp, client_ip AS client, domain, query_type, status, blocked \
             FROM dns_queries ORDER BY timestamp DESC, id DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
    }

    /// Bulk-delete rows below the retention cutoff. Index-served by the
    /// timestamp index; returns the number of rows removed.
    pub async fn delete_before(&self, cutoff: i64) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM dns_queries WHERE timestamp < ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn row_count(&self) -> Result<i64, sqlx::Error> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM dns_queries")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Liveness probe for the health endpoint.
    pub async fn ping(&self) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// Transactions committed by `insert_batch` since startup.
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    /// Aggregate reads served since startup.
    pub fn read_count(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    fn note_read(&self) {
        self.reads.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("dns_store_reads_total").increment(1);
    }
}
