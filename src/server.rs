//! Shared application state, router assembly, and shutdown signalling.
//!
//! [`AppState`] is shared behind an `Arc` by the proxy handler, the health
//! endpoint and the background loops started by `cachegate run`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::routing::get;
use axum::Router;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use tokio::sync::RwLock;
use tower::ServiceBuilder;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::config::model::Config;
use crate::config::ConfigVersion;
use crate::health::health_handler;
use crate::middleware::response_cache::ResponseCache;
use crate::proxy;

/// The active configuration and where it came from.
#[derive(Debug)]
pub struct LoadedConfig {
    pub config: Arc<Config>,
    pub version: ConfigVersion,
    pub source_name: String,
    pub loaded_at: Instant,
}

impl LoadedConfig {
    #[must_use]
    pub fn new(config: Config, version: ConfigVersion, source_name: impl Into<String>) -> Self {
        Self {
            config: Arc::new(config),
            version,
            source_name: source_name.into(),
            loaded_at: Instant::now(),
        }
    }
}

/// Proxy-level counters. Cache counters live on [`ResponseCache`].
#[derive(Debug, Default)]
pub struct ProxyStats {
    forwarded: AtomicU64,
    failed: AtomicU64,
    config_reloads: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProxyStatsSnapshot {
    pub forwarded: u64,
    pub failed: u64,
    pub config_reloads: u64,
}

impl ProxyStats {
    pub fn record_forwarded(&self) {
        self.forwarded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_reload(&self) {
        self.config_reloads.fetch_add(1, Ordering::Relaxed);
    }

    #[must_use]
    pub fn snapshot(&self) -> ProxyStatsSnapshot {
        ProxyStatsSnapshot {
            forwarded: self.forwarded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            config_reloads: self.config_reloads.load(Ordering::Relaxed),
        }
    }
}

pub type HttpsConnector = hyper_rustls::HttpsConnector<HttpConnector>;
pub type HttpClient = Client<HttpsConnector, http_body_util::Full<bytes::Bytes>>;

pub struct AppState {
    pub config: RwLock<LoadedConfig>,
    pub http_client: HttpClient,
    pub cache: Arc<ResponseCache>,
    pub start_time: Instant,
    pub stats: ProxyStats,
}

impl AppState {
    #[must_use]
    pub fn new(loaded: LoadedConfig, http_client: HttpClient, cache: Arc<ResponseCache>) -> Self {
        Self {
            config: RwLock::new(loaded),
            http_client,
            cache,
            start_time: Instant::now(),
            stats: ProxyStats::default(),
        }
    }

    /// Snapshot of the current config without holding the lock.
    pub async fn config(&self) -> Arc<Config> {
        Arc::clone(&self.config.read().await.config)
    }
}

/// Pooled HTTP/1 client for the upstream, speaking both `http` and `https`.
#[must_use]
pub fn build_http_client() -> HttpClient {
    // sentry's transport can pull in a second rustls provider; pin ring
    let _ = rustls::crypto::ring::default_provider().install_default();

    let connector = hyper_rustls::HttpsConnectorBuilder::new()
        .with_webpki_roots()
        .https_or_http()
        .enable_http1()
        .build();

    Client::builder(TokioExecutor::new())
        .pool_idle_timeout(Duration::from_secs(30))
        .build(connector)
}

/// `/health` is served directly; every other path goes to the proxy.
pub fn build_router(state: Arc<AppState>, max_body: usize) -> Router {
    let layers = ServiceBuilder::new()
        .layer(TraceLayer::new_for_http())
        .layer(RequestBodyLimitLayer::new(max_body));

    Router::new()
        .route("/health", get(health_handler))
        .fallback(proxy::forward_handler)
        .layer(layers)
        .with_state(state)
}

/// Resolves on the first Ctrl+C or SIGTERM. A handler that fails to
/// install is logged and never fires.
pub async fn shutdown_signal() {
    let interrupt = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => "Ctrl+C",
            Err(e) => {
                tracing::error!(error = %e, "cannot listen for Ctrl+C");
                std::future::pending().await
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
                "SIGTERM"
            }
            Err(e) => {
                tracing::error!(error = %e, "cannot listen for SIGTERM");
                std::future::pending().await
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<&str>();

    let received = tokio::select! {
        name = interrupt => name,
        name = terminate => name,
    };
    tracing::info!(signal = received, "shutting down");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_snapshot_reflects_recorded_events() {
        let stats = ProxyStats::default();
        stats.record_forwarded();
        stats.record_forwarded();
        stats.record_failed();
        stats.record_reload();

        assert_eq!(
            stats.snapshot(),
            ProxyStatsSnapshot {
                forwarded: 2,
                failed: 1,
                config_reloads: 1,
            }
        );
    }
}
