//! `cachegate health`: query `/health` on a running instance.

use std::fmt::Write;
use std::time::Duration;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;

use crate::cli::HealthArgs;
use crate::error::CacheGateError;
use crate::health::HealthResponse;

fn request_error(e: impl std::error::Error + Send + Sync + 'static) -> CacheGateError {
    CacheGateError::HttpRequest {
        source: Box::new(e),
    }
}

async fn fetch(base: &str, timeout: Duration) -> Result<Bytes, CacheGateError> {
    let uri: hyper::Uri = format!("{}/health", base.trim_end_matches('/'))
        .parse()
        .map_err(|e: hyper::http::uri::InvalidUri| CacheGateError::UriParse {
            source: Box::new(e),
        })?;

    let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
    let request = hyper::Request::get(uri)
        .body(Full::new(Bytes::new()))
        .map_err(request_error)?;

    let response = tokio::time::timeout(timeout, client.request(request))
        .await
        .map_err(|_| CacheGateError::HttpRequest {
            source: format!("no answer within {}s", timeout.as_secs()).into(),
        })?
        .map_err(request_error)?;

    let status = response.status();
    if !status.is_success() {
        return Err(CacheGateError::HealthCheckFailed(status));
    }

    Ok(response
        .into_body()
        .collect()
        .await
        .map_err(request_error)?
        .to_bytes())
}

pub async fn execute(args: HealthArgs) -> Result<(), CacheGateError> {
    let body = fetch(&args.url, Duration::from_secs(args.timeout.max(1))).await?;

    if args.json {
        println!("{}", String::from_utf8_lossy(&body));
        return Ok(());
    }

    match serde_json::from_slice::<HealthResponse>(&body) {
        Ok(health) => print!("{}", render(&args.url, &health)),
        Err(e) => {
            eprintln!("Failed to parse health response: {e}");
            println!("{}", String::from_utf8_lossy(&body));
        }
    }
    Ok(())
}

fn render(url: &str, health: &HealthResponse) -> String {
    let (config, cache, stats) = (&health.config, &health.cache, &health.stats);
    let cache_line = if cache.enabled {
        format!(
            "{} store, {} mode, ttl {}s",
            cache.backend, cache.mode, cache.ttl_seconds
        )
    } else {
        format!("disabled ({} store)", cache.backend)
    };

    let mut out = String::new();
    // Writing to a String cannot fail
    let _ = writeln!(out, "\u{2713} cachegate {} is healthy ({url})", health.version);
    let _ = writeln!(out, "  uptime:         {}", format_uptime(health.uptime_seconds));
    let _ = writeln!(out, "  upstream:       {}", config.upstream);
    let _ = writeln!(
        out,
        "  config:         {} {} (loaded {}s ago, {} reloads)",
        config.source, config.version, config.loaded_ago_seconds, stats.config_reloads
    );
    let _ = writeln!(
        out,
        "  routes:         {} routes, {} cached",
        config.routes, config.cached_routes
    );
    let _ = writeln!(out, "  cache:          {cache_line}");
    let _ = writeln!(
        out,
        "  cache lookups:  {} hits, {} misses, {} store errors",
        stats.cache_hits, stats.cache_misses, stats.cache_errors
    );
    let _ = writeln!(
        out,
        "  requests:       {} forwarded, {} failed",
        stats.requests_forwarded, stats.requests_failed
    );
    out
}

fn format_uptime(seconds: u64) -> String {
    match (seconds / 3600, (seconds % 3600) / 60, seconds % 60) {
        (0, 0, s) => format!("{s}s"),
        (0, m, s) => format!("{m}m {s}s"),
        (h, m, s) => format!("{h}h {m}m {s}s"),
    }
}
