//! Per-route request checks applied before the upstream call.
//!
//! [`missing_required`] looks for each required field in the query string,
//! a JSON object body or a form-encoded body. [`apply_body_defaults`]
//! merges a route's constant fields into the outgoing JSON body.

use axum::http::{HeaderMap, Method};
use bytes::Bytes;
use serde_json::{Map, Value};

use crate::config::model::Route;

/// The first required field absent from the request, if any.
///
/// A field counts as present when it has a non-empty value: `null` and
/// `""` in JSON, or an empty query/form value, do not satisfy it.
#[must_use]
pub fn missing_required<'r>(
    route: &'r Route,
    query: Option<&str>,
    headers: &HeaderMap,
    body: &[u8],
) -> Option<&'r str> {
    if route.required.is_empty() {
        return None;
    }

    let query_pairs: Vec<(String, String)> = query
        .map(|q| url::form_urlencoded::parse(q.as_bytes()).into_owned().collect())
        .unwrap_or_default();
    let json = json_object(body);
    let form_pairs: Vec<(String, String)> = if is_form(headers) {
        url::form_urlencoded::parse(body).into_owned().collect()
    } else {
        Vec::new()
    };

    route
        .required
        .iter()
        .find(|field| {
            let in_pairs = |pairs: &[(String, String)]| {
                pairs.iter().any(|(k, v)| k == *field && !v.is_empty())
            };
            let in_json = json
                .as_ref()
                .and_then(|obj| obj.get(field.as_str()))
                .is_some_and(is_filled);
            !(in_pairs(&query_pairs) || in_pairs(&form_pairs) || in_json)
        })
        .map(String::as_str)
}

/// Merge `body_defaults` into the body, leaving fields the caller set alone.
///
/// An empty body becomes a JSON object of the defaults unless the method
/// carries no body. Non-object bodies are forwarded unchanged.
#[must_use]
pub fn apply_body_defaults(route: &Route, method: &Method, body: Bytes) -> Bytes {
    if route.body_defaults.is_empty() {
        return body;
    }

    let mut object = if body.is_empty() {
        if *method == Method::GET || *method == Method::HEAD {
            return body;
        }
        Map::new()
    } else {
        match json_object(&body) {
            Some(object) => object,
            None => return body,
        }
    };

    for (key, value) in &route.body_defaults {
        object.entry(key.clone()).or_insert_with(|| value.clone());
    }

    match serde_json::to_vec(&Value::Object(object)) {
        Ok(encoded) => Bytes::from(encoded),
        Err(e) => {
            tracing::warn!(error = %e, "failed to encode body defaults, forwarding original body");
            body
        }
    }
}

fn json_object(body: &[u8]) -> Option<Map<String, Value>> {
    if body.is_empty() {
        return None;
    }
    match serde_json::from_slice(body) {
        Ok(Value::Object(object)) => Some(object),
        _ => None,
    }
}

fn is_form(headers: &HeaderMap) -> bool {
    headers
        .get(hyper::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/x-www-form-urlencoded"))
}

fn is_filled(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.is_empty(),
        _ => true,
    }
}
