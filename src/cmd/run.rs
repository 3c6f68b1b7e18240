//! `cachegate run`: start the caching proxy.
//!
//! Loads configuration from a file source, connects the cache store,
//! starts the Axum HTTP server with graceful shutdown, and spawns two
//! background loops: config refresh for hot-reloading and a sweep that
//! purges expired cache entries.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::watch;

use crate::cache::store::{self, CacheStore};
use crate::cli::RunArgs;
use crate::config::sources::file_source::FileSource;
use crate::config::ConfigSource;
use crate::error::CacheGateError;
use crate::logging;
use crate::middleware::response_cache::{CachePolicy, ResponseCache};
use crate::server::{self, AppState, LoadedConfig};

pub async fn execute(args: RunArgs) -> Result<(), CacheGateError> {
    let log_format = logging::resolve_format(args.pretty, args.json);
    logging::init(&args.log_level, log_format);

    #[cfg(feature = "sentry-integration")]
    let _sentry_guard = args.sentry_dsn.as_ref().map(|dsn| {
        crate::sentry_integration::init(
            dsn,
            args.sentry_environment.as_deref(),
            args.cache_backend.name(),
        )
    });

    let source = resolve_file_source(args.config.as_deref())
        .await?
        .ok_or_else(|| CacheGateError::NoConfigSource {
            hint: "Provide --config <file> or place cachegate.yaml in the working directory.\n  \
                   Run 'cachegate init' to create a config file."
                .into(),
        })?;
    let (mut config, version) = source.load().await?;

    if let Some(timeout) = args.timeout {
        config.upstream.timeout = timeout;
    }

    let store = store::connect(&args.store_options()).await?;
    let policy = CachePolicy::from_config(&config);
    let cache = Arc::new(ResponseCache::new(Arc::clone(&store), policy));

    let route_count = config.routes.len();
    let cached_routes = config.cached_routes();
    let cache_enabled = config.cache.enabled;
    let cache_mode = config.cache.mode;
    let cache_ttl = config.cache.ttl;
    let upstream = config.upstream.base_url.clone();

    let state = Arc::new(AppState::new(
        LoadedConfig::new(config, version, source.name()),
        server::build_http_client(),
        cache,
    ));

    // Shutdown signal: flipping the watch channel stops both background loops
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let refresh_state = state.clone();
    let poll_interval = args.poll_interval;
    let refresh_shutdown = shutdown_rx.clone();
    let cli_timeout = args.timeout;
    let refresh_handle = tokio::spawn(async move {
        config_refresh_loop(refresh_state, source, poll_interval, cli_timeout, refresh_shutdown)
            .await;
    });

    let sweep_handle = (args.sweep_interval > 0).then(|| {
        let interval = Duration::from_secs(args.sweep_interval);
        tokio::spawn(sweep_loop(store, interval, shutdown_rx))
    });

    let router = server::build_router(state, args.max_body);

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;

    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!(
        addr = %addr,
        upstream = %upstream,
        routes = route_count,
        cached_routes,
        cache_enabled,
        cache_backend = args.cache_backend.name(),
        cache_mode = %cache_mode,
        cache_ttl,
        "cachegate started"
    );

    // Wrap the shutdown signal to also stop the background loops immediately
    let graceful_shutdown = async move {
        server::shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    };

    axum::serve(listener, router)
        .with_graceful_shutdown(graceful_shutdown)
        .await?;

    // Wait for the background tasks to finish (catches panics)
    if let Err(e) = refresh_handle.await {
        tracing::error!(error = %e, "config refresh task failed");
    }
    if let Some(handle) = sweep_handle {
        if let Err(e) = handle.await {
            tracing::error!(error = %e, "cache sweep task failed");
        }
    }

    tracing::info!("cachegate stopped");
    Ok(())
}

async fn resolve_file_source(
    explicit: Option<&Path>,
) -> Result<Option<Box<dyn ConfigSource>>, CacheGateError> {
    if let Some(path) = explicit {
        return open_source(path).map(Some);
    }

    // Auto-detect in current directory
    let candidates = [
        "cachegate.yaml",
        "cachegate.yml",
        "cachegate.json",
        "cachegate.toml",
    ];

    for name in &candidates {
        let path = PathBuf::from(name);
        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            tracing::info!(path = %path.display(), "auto-detected config file");
            return open_source(&path).map(Some);
        }
    }

    Ok(None)
}

fn open_source(path: &Path) -> Result<Box<dyn ConfigSource>, CacheGateError> {
    let source = FileSource::open(path)?;
    tracing::debug!(path = %source.path().display(), format = source.name(), "config source");
    Ok(Box::new(source))
}

/// Poll the source and swap in a new config when it changes.
///
/// The cache policy is fixed at startup;
/// reloads change routes and upstream settings only.
async fn config_refresh_loop(
    state: Arc<AppState>,
    source: Box<dyn ConfigSource>,
    interval_secs: u64,
    cli_timeout: Option<u64>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
    interval.tick().await; // Skip first immediate tick

    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = shutdown.changed() => {
                tracing::debug!("config refresh loop shutting down");
                return;
            }
        }

        let current_version = {
            let config = state.config.read().await;
            config.version.clone()
        };

        match source.has_changed(&current_version).await {
            Ok(true) => {
                tracing::info!("config change detected, reloading");
                match source.load().await {
                    Ok((mut config, version)) => {
                        if let Some(timeout) = cli_timeout {
                            config.upstream.timeout = timeout;
                        }
                        if CachePolicy::from_config(&config) != *state.cache.policy() {
                            tracing::warn!(
                                "cache policy changed in config, restart to apply it"
                            );
                        }
                        let route_count = config.routes.len();
                        let short = version.short().to_string();
                        let mut loaded = state.config.write().await;
                        loaded.config = Arc::new(config);
                        loaded.version = version;
                        loaded.loaded_at = Instant::now();
                        drop(loaded);
                        state.stats.record_reload();
                        tracing::info!(routes = route_count, version = %short, "config reloaded");
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "config reload failed, keeping current config");
                    }
                }
            }
            Ok(false) => {}
            Err(e) => {
                tracing::warn!(error = %e, "config change check failed");
            }
        }
    }
}

async fn sweep_loop(
    store: Arc<dyn CacheStore>,
    every: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut interval = tokio::time::interval(every);
    interval.tick().await;

    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = shutdown.changed() => {
                tracing::debug!("cache sweep loop shutting down");
                return;
            }
        }

        match store.purge_expired().await {
            Ok(0) => {}
            Ok(purged) => {
                tracing::debug!(backend = store.name(), purged, "purged expired cache entries");
            }
            Err(e) => {
                tracing::warn!(backend = store.name(), error = %e, "cache sweep failed");
            }
        }
    }
}
