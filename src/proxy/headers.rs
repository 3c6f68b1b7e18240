//! Upstream header construction and hop-by-hop stripping.
//!
//! [`build_upstream_headers`] produces the header set the upstream API
//! expects: optionally the client's own headers (minus hop-by-hop), the
//! caller's identity token and content type, a correlation id, then the
//! fixed upstream and per-route header rules. Rule values may contain
//! `${local_time}`, replaced with the current local time in RFC 3339.

use std::sync::LazyLock;

use axum::http::{HeaderMap, HeaderName, HeaderValue};
use chrono::{DateTime, Local, SecondsFormat};

use crate::config::model::{HeaderRules, Route, Upstream};

pub const LOCAL_TIME_PLACEHOLDER: &str = "${local_time}";

static HOP_BY_HOP: LazyLock<Vec<HeaderName>> = LazyLock::new(|| {
    [
        "connection",
        "keep-alive",
        "transfer-encoding",
        "te",
        "trailer",
        "upgrade",
        "proxy-authorization",
        "proxy-authenticate",
    ]
    .iter()
    .filter_map(|name| name.parse::<HeaderName>().ok())
    .collect()
});

#[must_use]
pub fn is_hop_by_hop(name: &HeaderName) -> bool {
    HOP_BY_HOP.contains(name)
}

/// Strip hop-by-hop headers and `content-length` from an upstream response.
///
/// The body has already been fully collected, so `transfer-encoding` and
/// `content-length` from the origin are no longer accurate. Axum sets the
/// correct `content-length` from the actual body bytes.
pub fn strip_response_hop_by_hop(headers: &mut HeaderMap) {
    for name in HOP_BY_HOP.iter() {
        headers.remove(name);
    }
    headers.remove(hyper::header::CONTENT_LENGTH);
}

pub struct HeaderContext<'a> {
    pub original: &'a HeaderMap,
    pub upstream: &'a Upstream,
    pub route: &'a Route,
    pub target_url: &'a url::Url,
    pub correlation_id: &'a str,
    pub now: DateTime<Local>,
}

#[must_use]
pub fn build_upstream_headers(ctx: &HeaderContext<'_>) -> HeaderMap {
    let upstream = ctx.upstream;
    let mut headers = if upstream.forward_headers {
        ctx.original.clone()
    } else {
        HeaderMap::new()
    };

    if upstream.strip_hop_by_hop {
        for header_name in HOP_BY_HOP.iter() {
            headers.remove(header_name);
        }
    }
    // The body may be rewritten; hyper sets the length of what is actually sent
    headers.remove(hyper::header::CONTENT_LENGTH);

    if let Some(host) = ctx.target_url.host_str() {
        let host_value = ctx
            .target_url
            .port()
            .map_or_else(|| host.to_string(), |port| format!("{host}:{port}"));
        if let Ok(val) = HeaderValue::from_str(&host_value) {
            headers.insert(hyper::header::HOST, val);
        }
    }

    if let Ok(identity) = upstream.identity_header.parse::<HeaderName>() {
        if let Some(token) = ctx.original.get(&identity) {
            headers.insert(identity, token.clone());
        }
    }

    if let Some(content_type) = ctx.original.get(hyper::header::CONTENT_TYPE) {
        headers.insert(hyper::header::CONTENT_TYPE, content_type.clone());
    }

    if let Ok(val) = HeaderValue::from_str(ctx.correlation_id) {
        headers.insert("x-correlation-id", val);
    }

    let local_time = ctx.now.to_rfc3339_opts(SecondsFormat::Secs, true);
    apply_rules(&mut headers, &upstream.headers, &local_time, "upstream.headers");
    apply_rules(&mut headers, &ctx.route.headers, &local_time, "route.headers");

    headers
}

fn apply_rules(headers: &mut HeaderMap, rules: &HeaderRules, local_time: &str, origin: &str) {
    for (key, value) in &rules.add {
        let value = if value.contains(LOCAL_TIME_PLACEHOLDER) {
            value.replace(LOCAL_TIME_PLACEHOLDER, local_time)
        } else {
            value.clone()
        };
        match (key.parse::<HeaderName>(), HeaderValue::from_str(&value)) {
            (Ok(name), Ok(val)) => {
                headers.insert(name, val);
            }
            _ => {
                tracing::warn!(header = %key, origin, "invalid header name or value, skipping");
            }
        }
    }

    for key in &rules.strip {
        if let Ok(name) = key.parse::<HeaderName>() {
            headers.remove(&name);
        }
    }
}
