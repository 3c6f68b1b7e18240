//! Integration tests for route matching and upstream URL resolution.

use axum::http::Uri;
use cachegate::config::model::{CacheMode, Config, Route, Upstream};
use cachegate::proxy::routing::match_route;
use cachegate::proxy::upstream::upstream_url;

fn make_route(path: &str, methods: &[&str]) -> Route {
    let mut route = Route::new(path);
    route.methods = methods.iter().map(|s| (*s).to_string()).collect();
    route
}

fn upstream() -> Upstream {
    serde_json::from_str(r#"{ "base_url": "https://api.example.com" }"#).unwrap()
}

#[test]
fn specificity_ordering_comprehensive() {
    let routes = vec![
        make_route("/*", &["*"]),                   // catch-all
        make_route("/v1/*", &["*"]),                // prefix wildcard
        make_route("/v1/episode/:eid", &["*"]),     // parameterized
        make_route("/v1/episode/list", &["*"]),     // exact
    ];

    // Exact match wins
    let idx = match_route(&routes, "/v1/episode/list", "GET").unwrap().index;
    assert_eq!(idx, 3);

    // Parameterized beats wildcard
    let m = match_route(&routes, "/v1/episode/42", "GET").unwrap();
    assert_eq!(m.index, 2);
    assert_eq!(m.params.get("eid").unwrap(), "42");

    // Wildcard prefix matches deep paths
    let idx = match_route(&routes, "/v1/other/deep/path", "GET").unwrap().index;
    assert_eq!(idx, 1);

    // Catch-all matches anything else
    let idx = match_route(&routes, "/something/else", "GET").unwrap().index;
    assert_eq!(idx, 0);
}

#[test]
fn method_filtering_restricts_matches() {
    let routes = vec![
        make_route("/v1/episode/get", &["GET"]),
        make_route("/v1/episode/get", &["POST"]),
    ];

    let idx = match_route(&routes, "/v1/episode/get", "GET").unwrap().index;
    assert_eq!(idx, 0);

    let idx = match_route(&routes, "/v1/episode/get", "POST").unwrap().index;
    assert_eq!(idx, 1);

    assert!(match_route(&routes, "/v1/episode/get", "DELETE").is_none());
}

#[test]
fn query_string_does_not_affect_matching() {
    let routes = vec![make_route("/v1/episode/get", &["GET"])];
    let uri: Uri = "/v1/episode/get?eid=1".parse().unwrap();

    let m = match_route(&routes, uri.path(), "GET").unwrap();
    let url = upstream_url(&upstream(), &routes[m.index], &uri, &m.params).unwrap();

    assert_eq!(url.as_str(), "https://api.example.com/v1/episode/get?eid=1");
}

#[test]
fn matched_params_flow_into_upstream_path() {
    let mut route = make_route("/podcast/:pid/episodes/:eid", &["*"]);
    route.upstream_path = Some("/v1/podcast/:pid/episode/:eid".into());
    let routes = vec![route];
    let uri: Uri = "/podcast/p1/episodes/e2".parse().unwrap();

    let m = match_route(&routes, uri.path(), "GET").unwrap();
    assert_eq!(m.params.len(), 2);

    let url = upstream_url(&upstream(), &routes[m.index], &uri, &m.params).unwrap();
    assert_eq!(
        url.as_str(),
        "https://api.example.com/v1/podcast/p1/episode/e2"
    );
}

#[test]
fn empty_routes_returns_none() {
    let routes: Vec<Route> = vec![];
    assert!(match_route(&routes, "/anything", "GET").is_none());
}

#[test]
fn defaults_are_sensible() {
    let config: Config = serde_json::from_str(
        r#"{ "upstream": { "base_url": "https://api.example.com" }, "routes": [{ "path": "/x" }] }"#,
    )
    .unwrap();

    assert_eq!(config.upstream.timeout, 5000);
    assert_eq!(config.upstream.identity_header, "x-jike-access-token");
    assert!(!config.upstream.forward_headers);
    assert!(config.upstream.strip_hop_by_hop);
    assert!(config.cache.enabled);
    assert_eq!(config.cache.ttl, 300);
    assert_eq!(config.cache.mode, CacheMode::Replay);
    assert_eq!(config.routes[0].methods, vec!["*"]);
    assert!(config.routes[0].cache);
}
