//! cachegate is a caching reverse proxy for a single upstream HTTP API.
//!
//! Each incoming request is matched against configured routes and forwarded
//! to the upstream with the headers it expects. Successful responses on
//! cacheable routes are stored under a fingerprint of the request path,
//! the caller's access token and a digest of the request body, then
//! replayed with a `Last-Modified` header until their TTL lapses.
//!
//! # Architecture
//!
//! - [`cache`] -- Fingerprinting ([`CacheKey`](cache::key::CacheKey)), the stored
//!   entry envelope, and the [`CacheStore`](cache::store::CacheStore) backends.
//! - [`cli`] -- Command-line argument parsing with clap derive macros.
//! - [`cmd`] -- Subcommand dispatch and execution (run, init, validate, health).
//! - [`config`] -- Configuration loading, validation, and hot-reloading via the
//!   [`ConfigSource`](config::ConfigSource) trait.
//! - [`error`] -- Unified error types using `thiserror`.
//! - [`health`] -- `GET /health` endpoint handler returning runtime diagnostics.
//! - [`logging`] -- Structured tracing setup with JSON and pretty-print output.
//! - [`middleware`] -- The response caching middleware.
//! - [`proxy`] -- Core HTTP forwarding: route matching, request checks, header
//!   construction, and the upstream call.
//! - [`server`] -- Axum server setup, shared application state, HTTP client, and
//!   graceful shutdown.
//!
//! # Feature Flags
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `yaml` | YAML config file support _(enabled by default)_ |
//! | `json` | JSON config file support |
//! | `toml` | TOML config file support |
//! | `redis` | Redis cache store |
//! | `sqlite` | SQLite cache store |
//! | `sentry-integration` | Sentry error tracking |
//! | `file-backends` | All file format backends |
//! | `store-backends` | All cache store backends |
//! | `full` | All features |

// Public items exist for the binary and the integration tests.
#![allow(clippy::missing_errors_doc)]

pub mod cache;
pub mod cli;
pub mod cmd;
pub mod config;
pub mod error;
pub mod health;
pub mod logging;
pub mod middleware;
pub mod proxy;
pub mod server;

#[cfg(feature = "sentry-integration")]
pub mod sentry_integration;
