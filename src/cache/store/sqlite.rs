//! SQLite-backed [`CacheStore`]: an embedded, file-backed cache.
//!
//! Entries live in the `cache_entries` table, created on first open.
//! Each row carries an `expires_at` deadline in Unix milliseconds (NULL
//! for no expiry); reads filter on it, so an expired key reads as absent
//! straight from the store. [`purge_expired`](CacheStore::purge_expired)
//! deletes the dead rows.

use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use bytes::Bytes;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode};
use sqlx::SqlitePool;

use super::CacheStore;
use crate::error::{CacheError, CacheGateError};

pub struct SqliteStore {
    pool: SqlitePool,
}

#[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
fn unix_millis(at: SystemTime) -> i64 {
    at.duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis() as i64)
}

impl SqliteStore {
    pub async fn open(path: &Path) -> Result<Self, CacheGateError> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePool::connect_with(options).await.map_err(|e| {
            CacheGateError::StoreUnavailable {
                backend: "sqlite",
                hint: format!("{}: {e}", path.display()),
            }
        })?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS cache_entries (\
                key TEXT PRIMARY KEY, \
                value BLOB NOT NULL, \
                expires_at INTEGER\
            )",
        )
        .execute(&pool)
        .await
        .map_err(|e| CacheGateError::StoreUnavailable {
            backend: "sqlite",
            hint: e.to_string(),
        })?;

        Ok(Self { pool })
    }
}

#[async_trait]
impl CacheStore for SqliteStore {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    async fn get(&self, key: &str) -> Result<Option<Bytes>, CacheError> {
        let row: Option<(Vec<u8>,)> = sqlx::query_as(
            "SELECT value FROM cache_entries \
             WHERE key = ? AND (expires_at IS NULL OR expires_at > ?)",
        )
        .bind(key)
        .bind(unix_millis(SystemTime::now()))
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| CacheError::Read {
            backend: "sqlite",
            source: Box::new(e),
        })?;

        Ok(row.map(|(value,)| Bytes::from(value)))
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<(), CacheError> {
        let expires_at = (!ttl.is_zero()).then(|| unix_millis(SystemTime::now() + ttl));

        sqlx::query(
            "INSERT INTO cache_entries (key, value, expires_at) VALUES (?, ?, ?) \
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, expires_at = excluded.expires_at",
        )
        .bind(key)
        .bind(value.as_ref())
        .bind(expires_at)
        .execute(&self.pool)
        .await
        .map_err(|e| CacheError::Write {
            backend: "sqlite",
            source: Box::new(e),
        })?;

        Ok(())
    }

    async fn purge_expired(&self) -> Result<u64, CacheError> {
        let result = sqlx::query(
            "DELETE FROM cache_entries WHERE expires_at IS NOT NULL AND expires_at <= ?",
        )
        .bind(unix_millis(SystemTime::now()))
        .execute(&self.pool)
        .await
        .map_err(|e| CacheError::Write {
            backend: "sqlite",
            source: Box::new(e),
        })?;

        Ok(result.rows_affected())
    }
}
