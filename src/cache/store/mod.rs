//! Key/value cache storage.
//!
//! [`CacheStore`] is the contract every backend satisfies: byte values
//! under string keys with an optional time-to-live. A store is built once
//! at startup by [`connect`] and shared as an [`Arc<dyn CacheStore>`];
//! every backend is safe for concurrent `get`/`set` without outside
//! locking.
//!
//! | Backend | Feature | Expiry |
//! |---------|---------|--------|
//! | [`memory::MemoryStore`] | always | per-entry deadline, checked on read |
//! | `redis_store::RedisStore` | `redis` | native `SET .. EX` |
//! | `sqlite::SqliteStore` | `sqlite` | `expires_at` column, checked on read |

pub mod memory;

#[cfg(feature = "redis")]
pub mod redis_store;

#[cfg(feature = "sqlite")]
pub mod sqlite;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use clap::ValueEnum;

use crate::error::{CacheError, CacheGateError};

// async_trait for the same reason as ConfigSource: stores are used as Arc<dyn CacheStore>.
#[async_trait]
pub trait CacheStore: Send + Sync {
    fn name(&self) -> &'static str;

    /// Returns `None` if the key is absent or its TTL has elapsed.
    async fn get(&self, key: &str) -> Result<Option<Bytes>, CacheError>;

    /// Store `value` under `key`. A zero `ttl` keeps the value until overwritten.
    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<(), CacheError>;

    /// Physically remove expired entries. Returns how many were removed.
    async fn purge_expired(&self) -> Result<u64, CacheError> {
        Ok(0)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum StoreBackend {
    #[default]
    Memory,
    Redis,
    Sqlite,
}

impl StoreBackend {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Redis => "redis",
            Self::Sqlite => "sqlite",
        }
    }
}

/// Connection parameters for [`connect`], supplied by CLI flags or the environment.
#[derive(Debug, Default)]
pub struct StoreOptions {
    pub backend: StoreBackend,
    pub redis_url: Option<String>,
    pub sqlite_path: Option<std::path::PathBuf>,
}

/// Build the configured backend. Any failure here is fatal to startup.
pub async fn connect(options: &StoreOptions) -> Result<Arc<dyn CacheStore>, CacheGateError> {
    match options.backend {
        StoreBackend::Memory => Ok(Arc::new(memory::MemoryStore::new())),

        #[cfg(feature = "redis")]
        StoreBackend::Redis => {
            let url = options
                .redis_url
                .as_deref()
                .ok_or_else(|| CacheGateError::StoreUnavailable {
                    backend: "redis",
                    hint: "--redis-url (or REDIS_URL) is required for the redis backend".into(),
                })?;
            Ok(Arc::new(redis_store::RedisStore::connect(url).await?))
        }

        #[cfg(feature = "sqlite")]
        StoreBackend::Sqlite => {
            let path = options
                .sqlite_path
                .as_deref()
                .ok_or_else(|| CacheGateError::StoreUnavailable {
                    backend: "sqlite",
                    hint: "--sqlite-path (or SQLITE_PATH) is required for the sqlite backend"
                        .into(),
                })?;
            Ok(Arc::new(sqlite::SqliteStore::open(path).await?))
        }

        #[cfg(not(feature = "redis"))]
        StoreBackend::Redis => Err(not_compiled(StoreBackend::Redis)),

        #[cfg(not(feature = "sqlite"))]
        StoreBackend::Sqlite => Err(not_compiled(StoreBackend::Sqlite)),
    }
}

#[allow(dead_code)]
fn not_compiled(backend: StoreBackend) -> CacheGateError {
    CacheGateError::StoreUnavailable {
        backend: backend.name(),
        hint: format!(
            "this build does not include the '{}' feature",
            backend.name()
        ),
    }
}
