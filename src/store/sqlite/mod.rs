//! SQLite-backed tracker store
//!
//! All coordination between concurrent writers goes through SQLite itself.
//! Every write transaction opens with [`SqliteStore::begin_write`], whose
//! first statement is a write; that takes the database's single writer lock
//! up front, so the reads that follow inside the transaction observe the
//! latest committed state and concurrent writers on the same key queue up
//! behind it (bounded by the configured busy timeout) instead of racing.

mod projects;
mod records;
mod tasks;

use crate::error::{TrackerError, TrackerResult};
use chrono::{DateTime, NaiveDate, SecondsFormat, SubsecRound, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Sqlite, SqlitePool, Transaction};
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

/// Connection settings for [`SqliteStore`]
#[derive(Debug, Clone)]
pub struct SqliteStoreConfig {
    /// `sqlite://path/to/file.db`
    pub url: String,
    pub max_connections: u32,
    pub busy_timeout: Duration,
}

impl SqliteStoreConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_connections: 4,
            busy_timeout: Duration::from_millis(5000),
        }
    }
}

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if needed) the database and apply the schema
    pub async fn connect(config: &SqliteStoreConfig) -> TrackerResult<Self> {
        let options = SqliteConnectOptions::from_str(&config.url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(config.busy_timeout)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections.max(1))
            .connect_with(options)
            .await?;

        super::schema::apply_schema(&pool).await?;
        tracing::info!(url = %config.url, "SQLite store ready");

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Check the database answers a trivial query
    pub async fn health_check(&self) -> TrackerResult<bool> {
        let value: i64 = sqlx::query_scalar("SELECT 1").fetch_one(&self.pool).await?;
        Ok(value == 1)
    }

    /// Begin a transaction that already holds the writer lock.
    pub(crate) async fn begin_write(&self) -> TrackerResult<Transaction<'static, Sqlite>> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("UPDATE write_gate SET generation = generation + 1 WHERE id = 1")
            .execute(&mut *tx)
            .await?;
        Ok(tx)
    }
}

// ============================================================================
// Column codecs
// ============================================================================

/// Current time at the precision stored in the database
pub(crate) fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

pub(crate) fn encode_dt(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn decode_dt(value: &str) -> TrackerResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|v| v.with_timezone(&Utc))
        .map_err(|e| TrackerError::Corrupt(format!("timestamp '{value}': {e}")))
}

pub(crate) fn encode_date(value: Option<NaiveDate>) -> Option<String> {
    value.map(|d| d.format("%Y-%m-%d").to_string())
}

pub(crate) fn decode_date(value: Option<String>) -> TrackerResult<Option<NaiveDate>> {
    value
        .map(|v| {
            NaiveDate::parse_from_str(&v, "%Y-%m-%d")
                .map_err(|e| TrackerError::Corrupt(format!("date '{v}': {e}")))
        })
        .transpose()
}

pub(crate) fn parse_uuid(value: &str) -> TrackerResult<Uuid> {
    Uuid::parse_str(value).map_err(|e| TrackerError::Corrupt(format!("uuid '{value}': {e}")))
}

pub(crate) fn parse_opt_uuid(value: Option<String>) -> TrackerResult<Option<Uuid>> {
    value.as_deref().map(parse_uuid).transpose()
}

pub(crate) fn decode_enum<T>(value: &str) -> TrackerResult<T>
where
    T: FromStr<Err = String>,
{
    value.parse().map_err(TrackerError::Corrupt)
}

pub(crate) fn encode_json(value: &Option<serde_json::Value>) -> TrackerResult<Option<String>> {
    value
        .as_ref()
        .map(|v| serde_json::to_string(v).map_err(|e| TrackerError::Corrupt(e.to_string())))
        .transpose()
}

pub(crate) fn decode_json(value: Option<String>) -> TrackerResult<Option<serde_json::Value>> {
    value
        .map(|v| serde_json::from_str(&v).map_err(|e| TrackerError::Corrupt(e.to_string())))
        .transpose()
}

/// True when the error is a UNIQUE (or primary key) constraint failure
pub(crate) fn is_unique_violation(error: &sqlx::Error) -> bool {
    matches!(error, sqlx::Error::Database(e) if e.is_unique_violation())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_timestamp_codec_is_fixed_width() {
        let a = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        let b = a + chrono::Duration::microseconds(1);
        let (ea, eb) = (encode_dt(a), encode_dt(b));
        assert_eq!(ea, "2024-01-02T03:04:05.000000Z");
        assert_eq!(ea.len(), eb.len());
        assert!(ea < eb);
        assert_eq!(decode_dt(&eb).unwrap(), b);
    }

    #[test]
    fn test_now_round_trips() {
        let t = now();
        assert_eq!(decode_dt(&encode_dt(t)).unwrap(), t);
    }

    #[test]
    fn test_date_codec() {
        let d = NaiveDate::from_ymd_opt(2025, 10, 6);
        let encoded = encode_date(d);
        assert_eq!(encoded.as_deref(), Some("2025-10-06"));
        assert_eq!(decode_date(encoded).unwrap(), d);
        assert!(decode_date(Some("06/10/2025".into())).is_err());
    }

    #[test]
    fn test_corrupt_values_are_reported() {
        assert!(matches!(parse_uuid("nope"), Err(TrackerError::Corrupt(_))));
        let status: TrackerResult<crate::store::models::TaskStatus> = decode_enum("finished");
        assert!(matches!(status, Err(TrackerError::Corrupt(_))));
    }
}
