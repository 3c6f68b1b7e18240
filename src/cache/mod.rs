//! Response cache building blocks.
//!
//! - [`key`] -- request fingerprinting into a [`CacheKey`](key::CacheKey).
//! - [`entry`] -- the single-value envelope stored per key.
//! - [`store`] -- the [`CacheStore`](store::CacheStore) trait and its
//!   memory, Redis, and SQLite backends.
//!
//! The axum-facing wrapper that ties these together lives in
//! [`middleware::response_cache`](crate::middleware::response_cache).

pub mod entry;
pub mod key;
pub mod store;
