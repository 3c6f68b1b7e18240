//! Redis-backed [`CacheStore`] with native per-key expiry.
//!
//! Values are written with `SET key value EX ttl`, so Redis itself makes
//! an entry unreadable once its TTL elapses. Keys are namespaced under
//! `cachegate:` to share a database with other tenants. The multiplexed
//! Tokio connection is cloned per call; clones share one socket.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use redis::AsyncCommands;

use super::CacheStore;
use crate::error::{CacheError, CacheGateError};

const KEY_PREFIX: &str = "cachegate:";

pub struct RedisStore {
    connection: redis::aio::MultiplexedConnection,
}

impl RedisStore {
    pub async fn connect(url: &str) -> Result<Self, CacheGateError> {
        let client = redis::Client::open(url).map_err(|e| CacheGateError::StoreUnavailable {
            backend: "redis",
            hint: e.to_string(),
        })?;

        let mut connection = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| CacheGateError::StoreUnavailable {
                backend: "redis",
                hint: e.to_string(),
            })?;

        // Fail startup now rather than on the first request
        let _: String = redis::cmd("PING")
            .query_async(&mut connection)
            .await
            .map_err(|e| CacheGateError::StoreUnavailable {
                backend: "redis",
                hint: e.to_string(),
            })?;

        Ok(Self { connection })
    }

    fn namespaced(key: &str) -> String {
        format!("{KEY_PREFIX}{key}")
    }
}

#[async_trait]
impl CacheStore for RedisStore {
    fn name(&self) -> &'static str {
        "redis"
    }

    async fn get(&self, key: &str) -> Result<Option<Bytes>, CacheError> {
        let mut conn = self.connection.clone();
        let value: Option<Vec<u8>> =
            conn.get(Self::namespaced(key))
                .await
                .map_err(|e| CacheError::Read {
                    backend: "redis",
                    source: Box::new(e),
                })?;
        Ok(value.map(Bytes::from))
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self.connection.clone();
        let key = Self::namespaced(key);
        let result: redis::RedisResult<()> = if ttl.is_zero() {
            conn.set(key, value.to_vec()).await
        } else {
            // EX has second granularity; never round a sub-second TTL down to "forever"
            conn.set_ex(key, value.to_vec(), ttl.as_secs().max(1)).await
        };
        result.map_err(|e| CacheError::Write {
            backend: "redis",
            source: Box::new(e),
        })
    }
}
