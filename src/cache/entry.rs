//! Stored form of a captured response.
//!
//! A [`CacheEntry`] is written as one value so its payload and its
//! storage timestamp can never be observed apart. The layout is a single
//! JSON line of metadata, a `\n`, then the raw payload bytes:
//!
//! ```text
//! {"status":200,"stored_at":"Sun, 19 Oct 2026 08:00:00 GMT","headers":[["content-type","application/json"]]}
//! {"id":1}
//! ```
//!
//! Header values that are not UTF-8 are stored as an array of bytes.

use std::time::SystemTime;

use axum::body::Body;
use axum::http::header::{CONTENT_LENGTH, DATE, LAST_MODIFIED};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::Response;
use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use crate::error::CacheError;
use crate::proxy::headers::is_hop_by_hop;

pub const X_CACHE: HeaderName = HeaderName::from_static("x-cache");

/// Headers that describe a single exchange and must not be replayed.
const PER_RESPONSE: &[&str] = &["x-cache", "x-correlation-id"];

#[derive(Serialize, Deserialize)]
struct Meta {
    status: u16,
    stored_at: String,
    #[serde(default)]
    headers: Vec<(String, StoredValue)>,
}

/// Header value as stored: a string when it is valid UTF-8, raw bytes otherwise.
#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum StoredValue {
    Text(String),
    Raw(Vec<u8>),
}

impl From<&HeaderValue> for StoredValue {
    fn from(value: &HeaderValue) -> Self {
        value.to_str().map_or_else(
            |_| Self::Raw(value.as_bytes().to_vec()),
            |text| Self::Text(text.to_string()),
        )
    }
}

impl StoredValue {
    fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Text(text) => text.as_bytes(),
            Self::Raw(bytes) => bytes,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub payload: Bytes,
    /// IMF-fixdate (`Sun, 06 Nov 1994 08:49:37 GMT`) of the moment of storage.
    pub stored_at: String,
}

impl CacheEntry {
    /// Capture a response for storage, stamped with the current time.
    #[must_use]
    pub fn capture(status: StatusCode, headers: &HeaderMap, payload: Bytes) -> Self {
        Self::capture_at(status, headers, payload, SystemTime::now())
    }

    #[must_use]
    pub fn capture_at(
        status: StatusCode,
        headers: &HeaderMap,
        payload: Bytes,
        now: SystemTime,
    ) -> Self {
        let mut kept = HeaderMap::with_capacity(headers.len());
        for (name, value) in headers {
            if is_replayable(name) {
                kept.append(name.clone(), value.clone());
            }
        }
        Self {
            status,
            headers: kept,
            payload,
            stored_at: httpdate::fmt_http_date(now),
        }
    }

    pub fn encode(&self) -> Result<Bytes, CacheError> {
        let meta = Meta {
            status: self.status.as_u16(),
            stored_at: self.stored_at.clone(),
            headers: self
                .headers
                .iter()
                .map(|(name, value)| (name.as_str().to_string(), StoredValue::from(value)))
                .collect(),
        };
        let line = serde_json::to_vec(&meta).map_err(|e| CacheError::Encode(e.to_string()))?;

        let mut buf = BytesMut::with_capacity(line.len() + 1 + self.payload.len());
        buf.put_slice(&line);
        buf.put_u8(b'\n');
        buf.put_slice(&self.payload);
        Ok(buf.freeze())
    }

    pub fn decode(raw: &Bytes) -> Result<Self, CacheError> {
        let split = raw
            .iter()
            .position(|b| *b == b'\n')
            .ok_or_else(|| CacheError::Decode("missing metadata line".into()))?;
        let meta: Meta = serde_json::from_slice(&raw[..split])
            .map_err(|e| CacheError::Decode(e.to_string()))?;
        let status =
            StatusCode::from_u16(meta.status).map_err(|e| CacheError::Decode(e.to_string()))?;

        let mut headers = HeaderMap::with_capacity(meta.headers.len());
        for (name, value) in meta.headers {
            match (name.parse::<HeaderName>(), HeaderValue::from_bytes(value.as_bytes())) {
                (Ok(name), Ok(value)) => {
                    headers.append(name, value);
                }
                _ => return Err(CacheError::Decode(format!("invalid header '{name}'"))),
            }
        }

        Ok(Self {
            status,
            headers,
            payload: raw.slice(split + 1..),
            stored_at: meta.stored_at,
        })
    }

    /// Parsed storage time, only if `stored_at` is a well-formed IMF-fixdate.
    #[must_use]
    pub fn stored_at(&self) -> Option<SystemTime> {
        let parsed = httpdate::parse_http_date(&self.stored_at).ok()?;
        // parse_http_date also accepts RFC 850 and asctime; only the fixed format is valid here
        (httpdate::fmt_http_date(parsed) == self.stored_at).then_some(parsed)
    }

    #[must_use]
    pub fn last_modified(&self) -> Option<HeaderValue> {
        self.stored_at()?;
        HeaderValue::from_str(&self.stored_at).ok()
    }

    /// Rebuild the stored response for replay.
    #[must_use]
    pub fn into_response(self) -> Response {
        let last_modified = self.last_modified();
        if last_modified.is_none() {
            tracing::warn!(stored_at = %self.stored_at, "invalid stored timestamp, omitting Last-Modified");
        }

        let mut response = Response::new(Body::from(self.payload));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        if let Some(value) = last_modified {
            response.headers_mut().insert(LAST_MODIFIED, value);
        }
        response
            .headers_mut()
            .insert(X_CACHE, HeaderValue::from_static("HIT"));
        response
    }
}

fn is_replayable(name: &HeaderName) -> bool {
    !(is_hop_by_hop(name)
        || name == CONTENT_LENGTH
        || name == DATE
        || name == LAST_MODIFIED
        || PER_RESPONSE.contains(&name.as_str()))
}
