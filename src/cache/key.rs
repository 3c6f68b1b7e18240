//! Request fingerprinting.
//!
//! A [`CacheKey`] is the lowercase hex SHA-256 of
//! `path ":" token ":" body_digest`. The path carries the query string,
//! the token is the caller's identity header value, and the body digest
//! is [`body_digest`] of the raw request body. Computing a key never fails.

use std::fmt;

use sha2::{Digest, Sha256};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    #[must_use]
    pub fn compute(path: &str, token: &str, body_digest: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(path.as_bytes());
        hasher.update(b":");
        hasher.update(token.as_bytes());
        hasher.update(b":");
        hasher.update(body_digest.as_bytes());
        Self(format!("{:x}", hasher.finalize()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// SHA-256 of the request body as lowercase hex, or `""` for an empty body.
#[must_use]
pub fn body_digest(body: &[u8]) -> String {
    if body.is_empty() {
        String::new()
    } else {
        format!("{:x}", Sha256::digest(body))
    }
}
