//! `cachegate init`: write a starter configuration file.
//!
//! Creates a YAML, JSON, or TOML config file with either minimal
//! or fully documented templates.

use std::path::PathBuf;

use crate::cli::{ConfigFormat, InitArgs};
use crate::error::CacheGateError;

pub fn execute(args: &InitArgs) -> Result<(), CacheGateError> {
    let output = args
        .output
        .clone()
        .unwrap_or_else(|| PathBuf::from(format!("cachegate.{}", args.format.extension())));

    if output.exists() && !args.force {
        return Err(CacheGateError::FileExists { path: output });
    }

    std::fs::write(&output, template(&args.format, args.full))?;
    println!("Created {}", output.display());
    Ok(())
}

#[must_use]
pub const fn template(format: &ConfigFormat, full: bool) -> &'static str {
    match (format, full) {
        (ConfigFormat::Yaml, false) => YAML_MINIMAL,
        (ConfigFormat::Yaml, true) => YAML_FULL,
        (ConfigFormat::Json, false) => JSON_MINIMAL,
        (ConfigFormat::Json, true) => JSON_FULL,
        (ConfigFormat::Toml, false) => TOML_MINIMAL,
        (ConfigFormat::Toml, true) => TOML_FULL,
    }
}

const YAML_MINIMAL: &str = r#"# cachegate config

upstream:
  base_url: "http://localhost:8080"

routes:
  - path: "/v1/episode/get"
    methods: ["GET"]
"#;

const YAML_FULL: &str = r#"# cachegate config
#
# Commented values are defaults. Uncomment and modify as needed.

upstream:
  base_url: "http://localhost:8080"
  # timeout: 5000                        # Upstream timeout in ms
  # identity_header: "x-jike-access-token"  # Caller token, forwarded and part of the cache key
  # forward_headers: false               # Forward all client headers upstream
  # strip_hop_by_hop: true               # Strip Connection, TE, etc.
  headers:
    add:
      Content-Type: "application/json"
      Local-Time: "${local_time}"        # Replaced with the current RFC 3339 local time
    # strip: []

cache:
  enabled: true
  ttl: 300                               # Seconds an entry stays valid
  mode: replay                           # replay: serve hits without calling upstream
                                         # decorate: always call upstream, add Last-Modified on hits

routes:
  # Cached lookup, query string is part of the cache key
  - path: "/v1/episode/get"
    methods: ["GET"]
    required: ["eid"]

  # Path parameters are substituted into the upstream path
  - path: "/episode/:eid"
    methods: ["GET"]
    upstream_path: "/v1/episode/get?eid=:eid"

  # Inbound GET mapped to an upstream POST with constant body fields
  - path: "/v1/episode/list"
    methods: ["GET", "POST"]
    upstream_method: "POST"
    body_defaults:
      limit: 20
    headers:
      add:
        abtest-info: '{"old_user_discovery_feed":"enable"}'

  # Writes should not be cached
  - path: "/v1/playback-progress/update"
    methods: ["POST"]
    cache: false
    required: ["eid", "progress"]
    # timeout: 10000                     # Override the upstream timeout for this route
"#;

const JSON_MINIMAL: &str = r#"{
  "upstream": {
    "base_url": "http://localhost:8080"
  },
  "routes": [
    { "path": "/v1/episode/get", "methods": ["GET"] }
  ]
}
"#;

const JSON_FULL: &str = r#"{
  "upstream": {
    "base_url": "http://localhost:8080",
    "timeout": 5000,
    "identity_header": "x-jike-access-token",
    "forward_headers": false,
    "strip_hop_by_hop": true,
    "headers": {
      "add": {
        "Content-Type": "application/json",
        "Local-Time": "${local_time}"
      },
      "strip": []
    }
  },
  "cache": {
    "enabled": true,
    "ttl": 300,
    "mode": "replay"
  },
  "routes": [
    {
      "path": "/v1/episode/get",
      "methods": ["GET"],
      "required": ["eid"]
    },
    {
      "path": "/episode/:eid",
      "methods": ["GET"],
      "upstream_path": "/v1/episode/get?eid=:eid"
    },
    {
      "path": "/v1/episode/list",
      "methods": ["GET", "POST"],
      "upstream_method": "POST",
      "body_defaults": { "limit": 20 }
    },
    {
      "path": "/v1/playback-progress/update",
      "methods": ["POST"],
      "cache": false,
      "required": ["eid", "progress"],
      "timeout": 10000
    }
  ]
}
"#;

const TOML_MINIMAL: &str = r#"# cachegate config

[upstream]
base_url = "http://localhost:8080"

[[routes]]
path = "/v1/episode/get"
methods = ["GET"]
"#;

const TOML_FULL: &str = r#"# cachegate config
#
# Commented values are defaults. Uncomment and modify as needed.

[upstream]
base_url = "http://localhost:8080"
# timeout = 5000
# identity_header = "x-jike-access-token"
# forward_headers = false
# strip_hop_by_hop = true

[upstream.headers.add]
Content-Type = "application/json"
Local-Time = "${local_time}"

[cache]
# enabled = true
# ttl = 300
# mode = "replay"      # or "decorate"

[[routes]]
path = "/v1/episode/get"
methods = ["GET"]
required = ["eid"]

[[routes]]
path = "/episode/:eid"
methods = ["GET"]
upstream_path = "/v1/episode/get?eid=:eid"

[[routes]]
path = "/v1/episode/list"
methods = ["GET", "POST"]
upstream_method = "POST"

[routes.body_defaults]
limit = 20

[[routes]]
path = "/v1/playback-progress/update"
methods = ["POST"]
cache = false
required = ["eid", "progress"]
# timeout = 10000
"#;
