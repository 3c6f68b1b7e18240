//! Response caching around an arbitrary request-handling operation.
//!
//! [`ResponseCache::run`] fingerprints the request (path and query,
//! identity token, body digest), looks the key up in the shared
//! [`CacheStore`], and either replays the stored response or runs the
//! operation and stores what it produced.
//!
//! Caching is best-effort. A store read error or an undecodable value is
//! a miss, a store write error is logged, and neither ever changes the
//! response the caller receives. Concurrent misses on the same key each
//! run the operation; the last write wins.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::header::LAST_MODIFIED;
use axum::http::uri::PathAndQuery;
use axum::http::{HeaderName, HeaderValue, Method, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use http_body_util::{BodyExt, LengthLimitError};
use serde::{Deserialize, Serialize};

use crate::cache::entry::{CacheEntry, X_CACHE};
use crate::cache::key::{body_digest, CacheKey};
use crate::cache::store::CacheStore;
use crate::config::model::{CacheMode, Config, DEFAULT_IDENTITY_HEADER};

/// How hits are served and how long entries live. Fixed at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachePolicy {
    pub ttl: Duration,
    pub mode: CacheMode,
    pub identity_header: HeaderName,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(300),
            mode: CacheMode::Replay,
            identity_header: HeaderName::from_static(DEFAULT_IDENTITY_HEADER),
        }
    }
}

impl CachePolicy {
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        let identity_header = config
            .upstream
            .identity_header
            .parse()
            .unwrap_or_else(|_| HeaderName::from_static(DEFAULT_IDENTITY_HEADER));
        Self {
            ttl: config.cache.ttl(),
            mode: config.cache.mode,
            identity_header,
        }
    }
}

#[derive(Debug, Default)]
pub struct CacheStats {
    pub hits: AtomicU64,
    pub misses: AtomicU64,
    pub errors: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStatsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub errors: u64,
}

impl CacheStats {
    #[must_use]
    pub fn snapshot(&self) -> CacheStatsSnapshot {
        CacheStatsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

pub struct ResponseCache {
    store: Arc<dyn CacheStore>,
    policy: CachePolicy,
    stats: CacheStats,
}

impl ResponseCache {
    /// `store` must already be connected; see [`crate::cache::store::connect`].
    #[must_use]
    pub fn new(store: Arc<dyn CacheStore>, policy: CachePolicy) -> Self {
        Self {
            store,
            policy,
            stats: CacheStats::default(),
        }
    }

    #[must_use]
    pub fn store_name(&self) -> &'static str {
        self.store.name()
    }

    #[must_use]
    pub const fn policy(&self) -> &CachePolicy {
        &self.policy
    }

    #[must_use]
    pub const fn stats(&self) -> &CacheStats {
        &self.stats
    }

    /// Fingerprint of a buffered request.
    #[must_use]
    pub fn key_for(&self, parts: &http::request::Parts, body: &[u8]) -> CacheKey {
        let path = parts
            .uri
            .path_and_query()
            .map_or_else(|| parts.uri.path(), PathAndQuery::as_str);
        let token = parts
            .headers
            .get(&self.policy.identity_header)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        CacheKey::compute(path, token, &body_digest(body))
    }

    /// Serve `request` from the cache, or run `operation` and cache its output.
    ///
    /// The request body is buffered before fingerprinting and handed to
    /// `operation` as a fresh body over the same bytes. Only 2xx responses
    /// are stored; anything else passes through untouched. `HEAD` requests
    /// bypass the cache entirely: their responses carry no body, and the
    /// key does not include the method.
    pub async fn run<F, Fut>(&self, request: Request, operation: F) -> Response
    where
        F: FnOnce(Request) -> Fut,
        Fut: Future<Output = Response>,
    {
        if request.method() == Method::HEAD {
            return operation(request).await;
        }

        let (parts, body) = request.into_parts();
        let body = match axum::body::to_bytes(body, usize::MAX).await {
            Ok(bytes) => bytes,
            Err(e) => return body_error_response(e),
        };

        let key = self.key_for(&parts, &body);
        let cached = self.lookup(&key).await;
        tracing::debug!(
            key = %key,
            path = %parts.uri.path(),
            hit = cached.is_some(),
            "cache lookup"
        );

        let request = Request::from_parts(parts, Body::from(body));

        match cached {
            Some(entry) => {
                self.stats.hits.fetch_add(1, Ordering::Relaxed);
                match self.policy.mode {
                    CacheMode::Replay => entry.into_response(),
                    CacheMode::Decorate => {
                        let mut response = operation(request).await;
                        if response.status().is_success() {
                            decorate(&mut response, &entry);
                        } else {
                            mark(&mut response, "MISS");
                        }
                        response
                    }
                }
            }
            None => {
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                self.invoke_and_store(&key, request, operation).await
            }
        }
    }

    async fn lookup(&self, key: &CacheKey) -> Option<CacheEntry> {
        let raw = match self.store.get(key.as_str()).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                self.stats.errors.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(key = %key, error = %e, "cache read failed, treating as miss");
                return None;
            }
        };

        match CacheEntry::decode(&raw) {
            Ok(entry) => Some(entry),
            Err(e) => {
                self.stats.errors.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(key = %key, error = %e, "discarding unreadable cache entry");
                None
            }
        }
    }

    async fn invoke_and_store<F, Fut>(
        &self,
        key: &CacheKey,
        request: Request,
        operation: F,
    ) -> Response
    where
        F: FnOnce(Request) -> Fut,
        Fut: Future<Output = Response>,
    {
        let mut response = operation(request).await;
        if !response.status().is_success() {
            mark(&mut response, "MISS");
            return response;
        }

        let (mut parts, body) = response.into_parts();
        let payload = match body.collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) => {
                tracing::error!(key = %key, error = %e, "response body failed, not caching");
                return StatusCode::BAD_GATEWAY.into_response();
            }
        };

        let entry = CacheEntry::capture(parts.status, &parts.headers, payload.clone());
        self.store_entry(key, &entry).await;

        parts
            .headers
            .insert(X_CACHE, HeaderValue::from_static("MISS"));
        Response::from_parts(parts, Body::from(payload))
    }

    async fn store_entry(&self, key: &CacheKey, entry: &CacheEntry) {
        let result = match entry.encode() {
            Ok(value) => self.store.set(key.as_str(), value, self.policy.ttl).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => {
                tracing::debug!(
                    key = %key,
                    bytes = entry.payload.len(),
                    ttl_secs = self.policy.ttl.as_secs(),
                    "response cached"
                );
            }
            Err(e) => {
                self.stats.errors.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(key = %key, error = %e, "cache write failed");
            }
        }
    }
}

/// `axum::middleware::from_fn_with_state` adapter around [`ResponseCache::run`].
///
/// The request body is buffered without a size cap of its own. Mount a
/// `tower_http::limit::RequestBodyLimitLayer` outside this middleware;
/// a body over the limit is then answered with 413.
pub async fn middleware(
    State(cache): State<Arc<ResponseCache>>,
    request: Request,
    next: Next,
) -> Response {
    cache.run(request, |request| next.run(request)).await
}

fn decorate(response: &mut Response, entry: &CacheEntry) {
    if let Some(value) = entry.last_modified() {
        response.headers_mut().insert(LAST_MODIFIED, value);
    } else {
        tracing::warn!(
            stored_at = %entry.stored_at,
            "invalid stored timestamp, omitting Last-Modified"
        );
    }
    mark(response, "HIT");
}

fn mark(response: &mut Response, outcome: &'static str) {
    response
        .headers_mut()
        .insert(X_CACHE, HeaderValue::from_static(outcome));
}

/// Map a failed request body read to 413 when the size limit tripped, else 400.
pub(crate) fn body_error_response(err: axum::Error) -> Response {
    let inner = err.into_inner();
    let mut source: Option<&(dyn std::error::Error + 'static)> = Some(&*inner);
    while let Some(e) = source {
        if e.is::<LengthLimitError>() {
            return StatusCode::PAYLOAD_TOO_LARGE.into_response();
        }
        source = e.source();
    }
    tracing::warn!(error = %inner, "failed to read request body");
    StatusCode::BAD_REQUEST.into_response()
}
