//! Core HTTP request forwarding handler.
//!
//! The [`forward_handler`] function is the Axum fallback that receives
//! every non-`/health` request, matches it against configured routes,
//! and forwards it to the upstream API, through the response cache when
//! the route is cacheable. Submodules handle route matching ([`routing`]),
//! request checks ([`checks`]), header construction ([`headers`]) and the
//! upstream call itself ([`upstream`]).

pub mod checks;
pub mod headers;
pub mod routing;
pub mod upstream;

use std::collections::HashMap;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::config::model::{Config, Route};
use crate::middleware::response_cache::body_error_response;
use crate::server::AppState;

/// JSON body of every error the proxy produces itself.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: u16,
    pub msg: String,
    pub data: String,
}

#[must_use]
pub fn error_response(status: StatusCode, detail: impl Into<String>) -> Response {
    let body = ErrorBody {
        code: status.as_u16(),
        msg: status.canonical_reason().unwrap_or_default().to_string(),
        data: detail.into(),
    };
    (status, Json(body)).into_response()
}

pub async fn forward_handler(State(state): State<Arc<AppState>>, request: Request) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let correlation_id = request
        .headers()
        .get("x-correlation-id")
        .and_then(|v| v.to_str().ok())
        .map_or_else(|| uuid::Uuid::new_v4().to_string(), String::from);

    let config = state.config().await;
    let Some(matched) = routing::match_route(&config.routes, &path, method.as_str()) else {
        tracing::warn!(
            correlation_id = %correlation_id,
            method = %method,
            path = %path,
            "no route matched"
        );
        let mut response = error_response(StatusCode::NOT_FOUND, format!("no route for {path}"));
        set_correlation_id(&mut response, &correlation_id);
        return response;
    };

    let route = &config.routes[matched.index];
    let cached = config.cache.enabled && route.cache;

    tracing::info!(
        correlation_id = %correlation_id,
        method = %method,
        path = %path,
        cached,
        "request received"
    );

    let call = Call {
        state: &state,
        config: &config,
        route,
        params: &matched.params,
        correlation_id: &correlation_id,
    };

    let mut response = if cached {
        state.cache.run(request, |request| call.forward(request)).await
    } else {
        call.forward(request).await
    };
    set_correlation_id(&mut response, &correlation_id);
    response
}

struct Call<'a> {
    state: &'a AppState,
    config: &'a Config,
    route: &'a Route,
    params: &'a HashMap<String, String>,
    correlation_id: &'a str,
}

impl Call<'_> {
    async fn forward(&self, request: Request) -> Response {
        let (parts, body) = request.into_parts();
        let body = match axum::body::to_bytes(body, usize::MAX).await {
            Ok(bytes) => bytes,
            Err(e) => return body_error_response(e),
        };

        if let Some(field) =
            checks::missing_required(self.route, parts.uri.query(), &parts.headers, &body)
        {
            tracing::info!(
                correlation_id = %self.correlation_id,
                path = %parts.uri.path(),
                field,
                "missing required field"
            );
            return error_response(
                StatusCode::BAD_REQUEST,
                format!("missing required field '{field}'"),
            );
        }
        let body = checks::apply_body_defaults(self.route, &parts.method, body);

        let request = upstream::UpstreamRequest {
            client: &self.state.http_client,
            upstream: &self.config.upstream,
            route: self.route,
            method: &parts.method,
            uri: &parts.uri,
            original_headers: &parts.headers,
            body,
            params: self.params,
            correlation_id: self.correlation_id,
        };

        match upstream::send(request).await {
            Ok(upstream) => {
                self.state.stats.record_forwarded();
                let mut resp_headers = upstream.headers;
                headers::strip_response_hop_by_hop(&mut resp_headers);
                let mut response = Response::new(Body::from(upstream.body));
                *response.status_mut() = upstream.status;
                *response.headers_mut() = resp_headers;
                response
            }
            Err(e) => {
                tracing::error!(
                    correlation_id = %self.correlation_id,
                    path = %parts.uri.path(),
                    error = %e,
                    "upstream call failed"
                );
                self.state.stats.record_failed();
                error_response(e.status(), e.to_string())
            }
        }
    }
}

fn set_correlation_id(response: &mut Response, correlation_id: &str) {
    if let Ok(value) = HeaderValue::from_str(correlation_id) {
        response.headers_mut().insert("x-correlation-id", value);
    }
}
