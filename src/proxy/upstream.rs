//! A single call to the upstream API.
//!
//! Resolves the upstream URL for a matched route, builds the outbound
//! headers, sends the request through the pooled client under the route's
//! timeout and collects the response body.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use axum::http::{HeaderMap, Method, Uri};
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::StatusCode;

use crate::config::model::{Route, Upstream};
use crate::error::ProxyError;
use crate::server::HttpClient;

use super::headers::{build_upstream_headers, HeaderContext};

#[derive(Debug)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub latency_ms: u64,
}

pub struct UpstreamRequest<'a> {
    pub client: &'a HttpClient,
    pub upstream: &'a Upstream,
    pub route: &'a Route,
    pub method: &'a Method,
    pub uri: &'a Uri,
    pub original_headers: &'a HeaderMap,
    pub body: Bytes,
    pub params: &'a HashMap<String, String>,
    pub correlation_id: &'a str,
}

#[allow(clippy::cast_possible_truncation)]
pub async fn send(req: UpstreamRequest<'_>) -> Result<UpstreamResponse, ProxyError> {
    let target = upstream_url(req.upstream, req.route, req.uri, req.params)?;
    let method = upstream_method(req.route, req.method);
    let timeout_ms = req.route.timeout.unwrap_or(req.upstream.timeout);

    let headers = build_upstream_headers(&HeaderContext {
        original: req.original_headers,
        upstream: req.upstream,
        route: req.route,
        target_url: &target,
        correlation_id: req.correlation_id,
        now: chrono::Local::now(),
    });

    let mut builder = hyper::Request::builder()
        .method(method.clone())
        .uri(target.as_str());
    for (key, value) in &headers {
        builder = builder.header(key, value);
    }
    let request = builder.body(Full::new(req.body))?;

    let start = Instant::now();
    let response = tokio::time::timeout(
        Duration::from_millis(timeout_ms),
        req.client.request(request),
    )
    .await
    .map_err(|_| ProxyError::Timeout(timeout_ms))??;

    let status = response.status();
    let headers = response.headers().clone();
    let body = response.into_body().collect().await?.to_bytes();
    let latency_ms = start.elapsed().as_millis() as u64;

    tracing::info!(
        correlation_id = %req.correlation_id,
        method = %method,
        target = %target,
        status = status.as_u16(),
        latency_ms,
        "upstream responded"
    );

    Ok(UpstreamResponse {
        status,
        headers,
        body,
        latency_ms,
    })
}

/// Build the full upstream URL: base URL, the route's upstream path (or the
/// inbound path) with `:param` values substituted, then the inbound query.
pub fn upstream_url(
    upstream: &Upstream,
    route: &Route,
    uri: &Uri,
    params: &HashMap<String, String>,
) -> Result<url::Url, ProxyError> {
    let path = route
        .upstream_path
        .as_deref()
        .map_or_else(|| uri.path().to_string(), |t| substitute_params(t, params));

    let mut joined = format!("{}{}", upstream.base_url.trim_end_matches('/'), path);
    if let Some(query) = uri.query().filter(|q| !q.is_empty()) {
        joined.push(if joined.contains('?') { '&' } else { '?' });
        joined.push_str(query);
    }

    url::Url::parse(&joined).map_err(|e| ProxyError::InvalidUrl {
        url: joined,
        reason: e.to_string(),
    })
}

fn upstream_method(route: &Route, inbound: &Method) -> Method {
    route
        .upstream_method
        .as_deref()
        .and_then(|m| Method::from_bytes(m.to_uppercase().as_bytes()).ok())
        .unwrap_or_else(|| inbound.clone())
}

/// Substitute `:param` placeholders in a path template.
/// Sorts params by key length descending to prevent partial replacement
/// (e.g., `:userId` is replaced before `:user`).
fn substitute_params(template: &str, params: &HashMap<String, String>) -> String {
    let mut result = template.to_string();
    let mut sorted_entries: Vec<(&str, &str)> = params
        .iter()
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .collect();
    sorted_entries.sort_by_key(|(k, _)| std::cmp::Reverse(k.len()));

    for (key, value) in sorted_entries {
        result = result.replace(&format!(":{key}"), value);
    }
    result
}
