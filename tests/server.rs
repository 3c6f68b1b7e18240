//! Integration tests for the proxy server: caching behavior end to end
//! against a mock upstream, upstream request shaping, error mapping, the
//! health endpoint, and graceful shutdown.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use serde_json::{json, Value};

use cachegate::cache::store::memory::MemoryStore;
use cachegate::config::model::Config;
use cachegate::config::ConfigVersion;
use cachegate::health::HealthResponse;
use cachegate::middleware::response_cache::{CachePolicy, ResponseCache};
use cachegate::proxy::ErrorBody;
use cachegate::server::{self, AppState, LoadedConfig};

const TOKEN_HEADER: &str = "x-jike-access-token";

#[derive(Clone, Default)]
struct Upstream {
    calls: Arc<AtomicUsize>,
}

impl Upstream {
    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

async fn echo(
    State(upstream): State<Upstream>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let n = upstream.calls.fetch_add(1, Ordering::SeqCst) + 1;
    match uri.path() {
        "/v1/fail" => return (StatusCode::INTERNAL_SERVER_ERROR, "boom").into_response(),
        "/v1/slow" => tokio::time::sleep(Duration::from_secs(2)).await,
        _ => {}
    }
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(String::from)
    };
    Json(json!({
        "call": n,
        "method": method.as_str(),
        "uri": uri.to_string(),
        "token": header(TOKEN_HEADER),
        "local_time": header("local-time"),
        "cookie": header("cookie"),
        "body": String::from_utf8_lossy(&body),
    }))
    .into_response()
}

async fn start_upstream() -> (SocketAddr, Upstream) {
    let upstream = Upstream::default();
    let router = Router::new()
        .fallback(echo)
        .with_state(upstream.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    (addr, upstream)
}

fn config(base_url: &str, mode: &str) -> Config {
    serde_json::from_value(json!({
        "upstream": {
            "base_url": base_url,
            "timeout": 500,
            "headers": { "add": { "Local-Time": "${local_time}" } }
        },
        "cache": { "ttl": 60, "mode": mode },
        "routes": [
            { "path": "/v1/episode/get", "methods": ["GET"], "required": ["eid"] },
            {
                "path": "/v1/episode/list",
                "methods": ["GET", "POST"],
                "upstream_method": "POST",
                "body_defaults": { "limit": 20 }
            },
            { "path": "/episode/:eid", "upstream_path": "/v1/episode/get?eid=:eid" },
            { "path": "/v1/playback-progress/update", "methods": ["POST"], "cache": false },
            { "path": "/v1/fail" },
            { "path": "/v1/slow" }
        ]
    }))
    .unwrap()
}

struct TestServer {
    addr: SocketAddr,
    state: Arc<AppState>,
    shutdown: tokio::sync::oneshot::Sender<()>,
}

impl TestServer {
    fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }
}

async fn start_server(config: Config) -> TestServer {
    let cache = Arc::new(ResponseCache::new(
        Arc::new(MemoryStore::new()),
        CachePolicy::from_config(&config),
    ));
    let state = Arc::new(AppState::new(
        LoadedConfig::new(config, ConfigVersion::Hash("test-hash".into()), "test"),
        server::build_http_client(),
        cache,
    ));

    let router = server::build_router(state.clone(), 1_048_576);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let (shutdown, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
            .unwrap();
    });

    TestServer {
        addr,
        state,
        shutdown,
    }
}

async fn start(mode: &str) -> (TestServer, Upstream) {
    let (upstream_addr, upstream) = start_upstream().await;
    let server = start_server(config(&format!("http://{upstream_addr}"), mode)).await;
    (server, upstream)
}

async fn get(url: &str, token: &str) -> reqwest::Response {
    reqwest::Client::new()
        .get(url)
        .header(TOKEN_HEADER, token)
        .send()
        .await
        .unwrap()
}

fn header(resp: &reqwest::Response, name: &str) -> Option<String> {
    resp.headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(String::from)
}

#[tokio::test]
async fn second_identical_request_is_served_from_cache() {
    let (server, upstream) = start("replay").await;
    let url = server.url("/v1/episode/get?eid=1");

    let first = get(&url, "tok").await;
    assert_eq!(first.status(), 200);
    assert_eq!(header(&first, "x-cache").as_deref(), Some("MISS"));
    assert!(header(&first, "last-modified").is_none());
    let first_body: Value = first.json().await.unwrap();

    let second = get(&url, "tok").await;
    assert_eq!(second.status(), 200);
    assert_eq!(header(&second, "x-cache").as_deref(), Some("HIT"));
    assert_eq!(
        header(&second, "content-type").as_deref(),
        Some("application/json")
    );
    let last_modified = header(&second, "last-modified").unwrap();
    assert!(httpdate::parse_http_date(&last_modified).is_ok());
    let second_body: Value = second.json().await.unwrap();

    assert_eq!(first_body, second_body);
    assert_eq!(upstream.calls(), 1);

    // Replays keep reporting the original storage time
    let third = get(&url, "tok").await;
    assert_eq!(header(&third, "last-modified").unwrap(), last_modified);
    assert_eq!(upstream.calls(), 1);

    let stats = server.state.cache.stats().snapshot();
    assert_eq!((stats.hits, stats.misses, stats.errors), (2, 1, 0));

    let _ = server.shutdown.send(());
}

#[tokio::test]
async fn head_request_does_not_poison_the_cache() {
    let (server, upstream) = start("replay").await;
    let url = server.url("/episode/1");

    let head = reqwest::Client::new()
        .head(&url)
        .header(TOKEN_HEADER, "tok")
        .send()
        .await
        .unwrap();
    assert_eq!(head.status(), 200);
    assert!(header(&head, "x-cache").is_none());

    let first = get(&url, "tok").await;
    assert_eq!(header(&first, "x-cache").as_deref(), Some("MISS"));
    let body: Value = first.json().await.unwrap();
    assert_eq!(body["method"], "GET");

    let second = get(&url, "tok").await;
    assert_eq!(header(&second, "x-cache").as_deref(), Some("HIT"));
    let replayed: Value = second.json().await.unwrap();
    assert_eq!(replayed, body);
    assert_eq!(upstream.calls(), 2);

    let _ = server.shutdown.send(());
}

#[tokio::test]
async fn query_and_token_are_part_of_the_fingerprint() {
    let (server, upstream) = start("replay").await;

    get(&server.url("/v1/episode/get?eid=1"), "tok").await;
    let other_query = get(&server.url("/v1/episode/get?eid=2"), "tok").await;
    assert_eq!(header(&other_query, "x-cache").as_deref(), Some("MISS"));

    let other_caller = get(&server.url("/v1/episode/get?eid=1"), "someone-else").await;
    assert_eq!(header(&other_caller, "x-cache").as_deref(), Some("MISS"));
    let body: Value = other_caller.json().await.unwrap();
    assert_eq!(body["token"], "someone-else");

    assert_eq!(upstream.calls(), 3);
    let _ = server.shutdown.send(());
}

#[tokio::test]
async fn request_body_is_part_of_the_fingerprint() {
    let (server, upstream) = start("replay").await;
    let client = reqwest::Client::new();
    let post = |pid: &'static str| {
        client
            .post(server.url("/v1/episode/list"))
            .header(TOKEN_HEADER, "tok")
            .header("content-type", "application/json")
            .body(format!(r#"{{"pid":"{pid}"}}"#))
            .send()
    };

    let a = post("a").await.unwrap();
    assert_eq!(header(&a, "x-cache").as_deref(), Some("MISS"));
    let b = post("b").await.unwrap();
    assert_eq!(header(&b, "x-cache").as_deref(), Some("MISS"));
    let a_again = post("a").await.unwrap();
    assert_eq!(header(&a_again, "x-cache").as_deref(), Some("HIT"));

    // The upstream saw the caller's body merged with the route defaults
    let body: Value = a_again.json().await.unwrap();
    let sent: Value = serde_json::from_str(body["body"].as_str().unwrap()).unwrap();
    assert_eq!(sent, json!({ "pid": "a", "limit": 20 }));

    assert_eq!(upstream.calls(), 2);
    let _ = server.shutdown.send(());
}

#[tokio::test]
async fn upstream_request_is_shaped_per_route() {
    let (server, _upstream) = start("replay").await;

    let resp = reqwest::Client::new()
        .get(server.url("/v1/episode/list"))
        .header(TOKEN_HEADER, "tok")
        .header("cookie", "session=secret")
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();

    assert_eq!(body["method"], "POST");
    assert_eq!(body["body"], r#"{"limit":20}"#);
    assert_eq!(body["token"], "tok");
    assert!(body["cookie"].is_null());
    let local_time = body["local_time"].as_str().unwrap();
    assert!(chrono::DateTime::parse_from_rfc3339(local_time).is_ok());

    let resp = get(&server.url("/episode/42?lang=en"), "tok").await;
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["uri"], "/v1/episode/get?eid=42&lang=en");

    let _ = server.shutdown.send(());
}

#[tokio::test]
async fn uncached_route_always_reaches_upstream() {
    let (server, upstream) = start("replay").await;
    let client = reqwest::Client::new();

    for _ in 0..2 {
        let resp = client
            .post(server.url("/v1/playback-progress/update"))
            .header(TOKEN_HEADER, "tok")
            .body(r#"{"eid":"1","progress":30}"#)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        assert!(header(&resp, "x-cache").is_none());
    }

    assert_eq!(upstream.calls(), 2);
    let _ = server.shutdown.send(());
}

#[tokio::test]
async fn upstream_errors_are_not_cached() {
    let (server, upstream) = start("replay").await;

    for _ in 0..2 {
        let resp = get(&server.url("/v1/fail"), "tok").await;
        assert_eq!(resp.status(), 500);
        assert_eq!(header(&resp, "x-cache").as_deref(), Some("MISS"));
        assert_eq!(resp.text().await.unwrap(), "boom");
    }

    assert_eq!(upstream.calls(), 2);
    let _ = server.shutdown.send(());
}

#[tokio::test]
async fn missing_required_field_is_rejected_before_upstream() {
    let (server, upstream) = start("replay").await;

    let resp = get(&server.url("/v1/episode/get"), "tok").await;
    assert_eq!(resp.status(), 400);
    let body: ErrorBody = resp.json().await.unwrap();
    assert_eq!(body.code, 400);
    assert_eq!(body.msg, "Bad Request");
    assert!(body.data.contains("eid"));

    assert_eq!(upstream.calls(), 0);
    let _ = server.shutdown.send(());
}

#[tokio::test]
async fn decorate_mode_calls_upstream_and_adds_last_modified() {
    let (server, upstream) = start("decorate").await;
    let url = server.url("/v1/episode/get?eid=1");

    let first = get(&url, "tok").await;
    assert_eq!(header(&first, "x-cache").as_deref(), Some("MISS"));

    let second = get(&url, "tok").await;
    assert_eq!(header(&second, "x-cache").as_deref(), Some("HIT"));
    let last_modified = header(&second, "last-modified").unwrap();
    let body: Value = second.json().await.unwrap();
    assert_eq!(body["call"], 2);

    let third = get(&url, "tok").await;
    assert_eq!(header(&third, "last-modified").unwrap(), last_modified);

    assert_eq!(upstream.calls(), 3);
    let _ = server.shutdown.send(());
}

#[tokio::test]
async fn concurrent_misses_all_succeed() {
    let (server, upstream) = start("replay").await;
    let url = server.url("/v1/episode/get?eid=7");

    let handles: Vec<_> = (0..5)
        .map(|_| {
            let url = url.clone();
            tokio::spawn(async move { get(&url, "tok").await.status() })
        })
        .collect();
    for handle in handles {
        assert_eq!(handle.await.unwrap(), 200);
    }
    let calls = upstream.calls();
    assert!((1..=5).contains(&calls));

    let after = get(&url, "tok").await;
    assert_eq!(header(&after, "x-cache").as_deref(), Some("HIT"));
    assert_eq!(upstream.calls(), calls);

    let _ = server.shutdown.send(());
}

#[tokio::test]
async fn unreachable_upstream_returns_502() {
    // Nothing listens on port 1
    let server = start_server(config("http://127.0.0.1:1", "replay")).await;

    let resp = get(&server.url("/v1/episode/get?eid=1"), "tok").await;
    assert_eq!(resp.status(), 502);
    assert!(header(&resp, "x-correlation-id").is_some());
    let body: ErrorBody = resp.json().await.unwrap();
    assert_eq!(body.code, 502);

    assert_eq!(server.state.stats.snapshot().failed, 1);
    let _ = server.shutdown.send(());
}

#[tokio::test]
async fn slow_upstream_returns_504() {
    let (server, _upstream) = start("replay").await;

    let resp = get(&server.url("/v1/slow"), "tok").await;
    assert_eq!(resp.status(), 504);

    let _ = server.shutdown.send(());
}

#[tokio::test]
async fn correlation_id_is_echoed() {
    let (server, _upstream) = start("replay").await;

    let resp = reqwest::Client::new()
        .get(server.url("/v1/episode/get?eid=1"))
        .header("x-correlation-id", "abc-123")
        .send()
        .await
        .unwrap();
    assert_eq!(header(&resp, "x-correlation-id").as_deref(), Some("abc-123"));

    let _ = server.shutdown.send(());
}

#[tokio::test]
async fn health_endpoint_reports_cache() {
    let (server, _upstream) = start("replay").await;

    get(&server.url("/v1/episode/get?eid=1"), "tok").await;
    get(&server.url("/v1/episode/get?eid=1"), "tok").await;

    let health: HealthResponse = reqwest::get(server.url("/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health.status, "healthy");
    assert_eq!(health.version, env!("CARGO_PKG_VERSION"));
    assert_eq!(health.config.source, "test");
    assert_eq!(health.config.routes, 6);
    assert_eq!(health.config.cached_routes, 5);
    assert_eq!(health.cache.backend, "memory");
    assert_eq!(health.cache.ttl_seconds, 60);
    assert_eq!(health.stats.requests_forwarded, 1);
    assert_eq!(health.stats.cache_hits, 1);
    assert_eq!(health.stats.cache_misses, 1);

    let _ = server.shutdown.send(());
}

#[tokio::test]
async fn unmatched_route_returns_404() {
    let (server, upstream) = start("replay").await;

    let resp = reqwest::get(server.url("/nonexistent")).await.unwrap();
    assert_eq!(resp.status(), 404);
    let body: ErrorBody = resp.json().await.unwrap();
    assert_eq!(body.code, 404);
    assert_eq!(upstream.calls(), 0);

    let _ = server.shutdown.send(());
}

#[tokio::test]
async fn graceful_shutdown_works() {
    let (server, _upstream) = start("replay").await;

    let url = server.url("/health");
    assert!(reqwest::get(&url).await.is_ok());

    let _ = server.shutdown.send(());

    tokio::time::sleep(Duration::from_millis(100)).await;

    let result = reqwest::get(&url).await;
    assert!(result.is_err());
}
