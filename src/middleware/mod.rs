//! Request middleware.
//!
//! [`response_cache`] wraps any request-handling operation with the
//! fingerprint/store/replay cache. The proxy applies it per route in
//! [`proxy::forward_handler`](crate::proxy::forward_handler); it can also
//! be mounted on any axum router with
//! `axum::middleware::from_fn_with_state(cache, response_cache::middleware)`.

pub mod response_cache;
