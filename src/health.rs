//! `GET /health` endpoint handler.
//!
//! Returns a [`HealthResponse`] JSON payload containing the server
//! version, uptime, config source metadata, the cache policy and store
//! backend in use, and cumulative request and cache statistics.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::config::model::CacheMode;
use crate::server::AppState;

#[derive(Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub config: ConfigHealth,
    pub cache: CacheHealth,
    pub stats: StatsResponse,
}

#[derive(Serialize, Deserialize)]
pub struct ConfigHealth {
    pub source: String,
    pub version: String,
    pub loaded_ago_seconds: u64,
    pub upstream: String,
    pub routes: usize,
    pub cached_routes: usize,
}

#[derive(Serialize, Deserialize)]
pub struct CacheHealth {
    pub enabled: bool,
    pub backend: String,
    pub mode: CacheMode,
    pub ttl_seconds: u64,
}

#[derive(Serialize, Deserialize)]
pub struct StatsResponse {
    pub requests_forwarded: u64,
    pub requests_failed: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub cache_errors: u64,
    pub config_reloads: u64,
}

pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let (config, source_name, version_str, loaded_ago) = {
        let loaded = state.config.read().await;
        (
            Arc::clone(&loaded.config),
            loaded.source_name.clone(),
            loaded.version.short().to_string(),
            loaded.loaded_at.elapsed().as_secs(),
        )
    };

    let policy = state.cache.policy();
    let cache_stats = state.cache.stats().snapshot();
    let proxy_stats = state.stats.snapshot();

    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        config: ConfigHealth {
            source: source_name,
            version: version_str,
            loaded_ago_seconds: loaded_ago,
            upstream: config.upstream.base_url.clone(),
            routes: config.routes.len(),
            cached_routes: config.cached_routes(),
        },
        cache: CacheHealth {
            enabled: config.cache.enabled,
            backend: state.cache.store_name().to_string(),
            mode: policy.mode,
            ttl_seconds: policy.ttl.as_secs(),
        },
        stats: StatsResponse {
            requests_forwarded: proxy_stats.forwarded,
            requests_failed: proxy_stats.failed,
            cache_hits: cache_stats.hits,
            cache_misses: cache_stats.misses,
            cache_errors: cache_stats.errors,
            config_reloads: proxy_stats.config_reloads,
        },
    })
}
