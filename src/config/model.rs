//! Serde data structures for the cachegate configuration file.
//!
//! Contains [`Config`] (the root), [`Upstream`], [`CacheSettings`],
//! [`Route`], and [`HeaderRules`]. All types derive `Serialize` and
//! `Deserialize` with `deny_unknown_fields` for strict parsing.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const DEFAULT_IDENTITY_HEADER: &str = "x-jike-access-token";

const fn default_timeout() -> u64 {
    5000
}

const fn default_ttl() -> u64 {
    300
}

const fn default_true() -> bool {
    true
}

fn default_methods() -> Vec<String> {
    vec!["*".to_string()]
}

fn default_identity_header() -> String {
    DEFAULT_IDENTITY_HEADER.to_string()
}

fn is_default_timeout(v: &u64) -> bool {
    *v == default_timeout()
}

fn is_default_ttl(v: &u64) -> bool {
    *v == default_ttl()
}

fn is_default_identity_header(v: &str) -> bool {
    v == DEFAULT_IDENTITY_HEADER
}

fn is_true(v: &bool) -> bool {
    *v
}

fn is_false(v: &bool) -> bool {
    !*v
}

fn is_default_methods(v: &[String]) -> bool {
    v.len() == 1 && v[0] == "*"
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub upstream: Upstream,

    #[serde(default, skip_serializing_if = "CacheSettings::is_default")]
    pub cache: CacheSettings,

    pub routes: Vec<Route>,
}

impl Config {
    #[must_use]
    pub fn cached_routes(&self) -> usize {
        self.routes.iter().filter(|r| r.cache).count()
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Upstream {
    pub base_url: String,

    #[serde(
        default = "default_timeout",
        skip_serializing_if = "is_default_timeout"
    )]
    pub timeout: u64,

    /// Header carrying the caller's access token. Always forwarded upstream
    /// and part of every cache fingerprint.
    #[serde(
        default = "default_identity_header",
        skip_serializing_if = "is_default_identity_header"
    )]
    pub identity_header: String,

    #[serde(default, skip_serializing_if = "is_false")]
    pub forward_headers: bool,

    #[serde(default = "default_true", skip_serializing_if = "is_true")]
    pub strip_hop_by_hop: bool,

    #[serde(default, skip_serializing_if = "HeaderRules::is_default")]
    pub headers: HeaderRules,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheMode {
    /// Serve the stored response without invoking the upstream call.
    #[default]
    Replay,
    /// Always invoke the upstream call; a hit only adds `Last-Modified`.
    Decorate,
}

impl std::fmt::Display for CacheMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Replay => f.write_str("replay"),
            Self::Decorate => f.write_str("decorate"),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CacheSettings {
    #[serde(default = "default_true", skip_serializing_if = "is_true")]
    pub enabled: bool,

    /// Entry lifetime in seconds.
    #[serde(default = "default_ttl", skip_serializing_if = "is_default_ttl")]
    pub ttl: u64,

    #[serde(default)]
    pub mode: CacheMode,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            ttl: default_ttl(),
            mode: CacheMode::default(),
        }
    }
}

impl CacheSettings {
    fn is_default(&self) -> bool {
        self.enabled && self.ttl == default_ttl() && self.mode == CacheMode::Replay
    }

    #[must_use]
    pub const fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Route {
    pub path: String,

    #[serde(
        default = "default_methods",
        skip_serializing_if = "is_default_methods"
    )]
    pub methods: Vec<String>,

    /// Upstream path template; `:param` segments captured from `path` are
    /// substituted. Defaults to the inbound request path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upstream_path: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upstream_method: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,

    #[serde(default = "default_true", skip_serializing_if = "is_true")]
    pub cache: bool,

    /// Fields that must be present and non-empty in the query string or
    /// the request body (JSON object or urlencoded form).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required: Vec<String>,

    /// Constant fields merged into a JSON object body when absent.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub body_defaults: BTreeMap<String, serde_json::Value>,

    #[serde(default, skip_serializing_if = "HeaderRules::is_default")]
    pub headers: HeaderRules,
}

impl Route {
    #[must_use]
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            methods: default_methods(),
            upstream_path: None,
            upstream_method: None,
            timeout: None,
            cache: true,
            required: Vec::new(),
            body_defaults: BTreeMap::new(),
            headers: HeaderRules::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct HeaderRules {
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub add: HashMap<String, String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub strip: Vec<String>,
}

impl HeaderRules {
    fn is_default(&self) -> bool {
        self.add.is_empty() && self.strip.is_empty()
    }
}
