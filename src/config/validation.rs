//! Configuration validation.
//!
//! [`validate`] walks a parsed [`Config`] and collects every problem it
//! finds instead of stopping at the first one, so `cachegate validate`
//! can report them all at once.

use std::collections::HashSet;

use axum::http::{HeaderName, Method};
use url::Url;

use super::model::{Config, HeaderRules, Route};
use crate::error::ValidationError;

const ROOT: &str = "(root)";

/// Accumulates problems under the scope they belong to.
#[derive(Default)]
struct Problems {
    errors: Vec<ValidationError>,
}

impl Problems {
    fn push(&mut self, scope: &str, field: &str, message: impl Into<String>) -> &mut ValidationError {
        self.errors.push(ValidationError {
            route: scope.to_string(),
            field: field.to_string(),
            message: message.into(),
            suggestion: None,
        });
        let last = self.errors.len() - 1;
        &mut self.errors[last]
    }

    fn hint(&mut self, scope: &str, field: &str, message: impl Into<String>, hint: impl Into<String>) {
        self.push(scope, field, message).suggestion = Some(hint.into());
    }

    fn finish(self) -> Result<(), Vec<ValidationError>> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(self.errors)
        }
    }
}

fn base_url_problem(url: &str) -> Option<String> {
    let Ok(parsed) = Url::parse(url) else {
        return Some(format!("'{url}' is not a valid URL"));
    };
    match parsed.scheme() {
        "http" | "https" if parsed.query().is_some() => {
            Some("base URL cannot carry a query string".into())
        }
        "http" | "https" => None,
        other => Some(format!("unsupported scheme '{other}' (expected http or https)")),
    }
}

fn is_route_method(method: &str) -> bool {
    method == "*" || is_concrete_method(method)
}

fn is_concrete_method(method: &str) -> bool {
    matches!(
        Method::from_bytes(method.to_ascii_uppercase().as_bytes()),
        Ok(m) if [
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::PATCH,
            Method::HEAD,
            Method::OPTIONS,
        ]
        .contains(&m)
    )
}

fn check_header_rules(problems: &mut Problems, scope: &str, field: &str, rules: &HeaderRules) {
    let names = rules.add.keys().chain(rules.strip.iter());
    for name in names {
        if name.parse::<HeaderName>().is_err() {
            problems.push(scope, field, format!("'{name}' is not a valid header name"));
        }
    }
}

fn check_route(problems: &mut Problems, index: usize, route: &Route) {
    let scope = if route.path.is_empty() {
        format!("routes[{index}]")
    } else {
        format!("route {}", route.path)
    };

    if route.path.is_empty() {
        problems.push(&scope, "path", "path cannot be empty");
    } else if !route.path.starts_with('/') && route.path != "*" {
        problems.hint(
            &scope,
            "path",
            "path must start with '/' or be '*'",
            format!("did you mean '/{}'?", route.path),
        );
    }

    for method in route.methods.iter().filter(|m| !is_route_method(m)) {
        problems.push(&scope, "methods", format!("'{method}' is not a valid HTTP method"));
    }

    if let Some(method) = route.upstream_method.as_deref() {
        if !is_concrete_method(method) {
            problems.push(
                &scope,
                "upstream_method",
                format!("'{method}' is not a concrete HTTP method"),
            );
        }
    }

    if let Some(upstream_path) = route.upstream_path.as_deref() {
        if !upstream_path.starts_with('/') {
            problems.hint(
                &scope,
                "upstream_path",
                "upstream path must start with '/'",
                format!("did you mean '/{upstream_path}'?"),
            );
        }
    }

    if route.timeout == Some(0) {
        problems.push(&scope, "timeout", "timeout must be greater than zero");
    }

    if route.required.iter().any(String::is_empty) {
        problems.push(&scope, "required", "required field names cannot be empty");
    }

    check_header_rules(problems, &scope, "headers", &route.headers);
}

pub fn validate(config: &Config) -> Result<(), Vec<ValidationError>> {
    let mut problems = Problems::default();
    let upstream = &config.upstream;

    if let Some(message) = base_url_problem(&upstream.base_url) {
        problems.push(ROOT, "upstream.base_url", message);
    }
    if upstream.identity_header.parse::<HeaderName>().is_err() {
        problems.push(
            ROOT,
            "upstream.identity_header",
            format!("'{}' is not a valid header name", upstream.identity_header),
        );
    }
    if upstream.timeout == 0 {
        problems.hint(
            ROOT,
            "upstream.timeout",
            "timeout must be greater than zero",
            "the default is 5000ms",
        );
    }
    check_header_rules(&mut problems, ROOT, "upstream.headers", &upstream.headers);

    if config.cache.enabled && config.cache.ttl == 0 {
        problems.hint(
            ROOT,
            "cache.ttl",
            "ttl must be greater than zero when caching is enabled",
            "set 'enabled: false' to turn caching off",
        );
    }

    if config.routes.is_empty() {
        problems.push(ROOT, "routes", "at least one route must be defined");
        return problems.finish();
    }

    let mut seen = HashSet::new();
    for (index, route) in config.routes.iter().enumerate() {
        check_route(&mut problems, index, route);
        if !seen.insert((route.path.as_str(), route.methods.as_slice())) {
            problems.push(&format!("route {}", route.path), "path", "duplicate route path");
        }
    }

    problems.finish()
}

/// Human-readable summary printed by `cachegate validate` on success.
#[must_use]
pub fn format_validation_report(path: &str, config: &Config) -> String {
    use std::fmt::Write;

    let cache = if config.cache.enabled {
        format!("{} mode, ttl {}s", config.cache.mode, config.cache.ttl)
    } else {
        "disabled".to_string()
    };

    let mut out = format!(
        "{path} is valid\n  upstream: {}\n  cache:    {cache}\n  {} routes, {} cached\n",
        config.upstream.base_url,
        config.routes.len(),
        config.cached_routes()
    );

    // Writing to a String cannot fail
    for route in &config.routes {
        let timeout = route.timeout.map_or_else(
            || format!("{}ms (default)", config.upstream.timeout),
            |t| format!("{t}ms"),
        );
        let _ = write!(
            out,
            "\n  {}  -> {}\n    methods: {}\n    timeout: {timeout}\n    cached:  {}",
            route.path,
            route.upstream_path.as_deref().unwrap_or(&route.path),
            route.methods.join(", "),
            if route.cache { "yes" } else { "no" },
        );
        if !route.required.is_empty() {
            let _ = write!(out, "\n    requires: {}", route.required.join(", "));
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::model::{CacheSettings, Config, Route, Upstream};

    fn upstream() -> Upstream {
        serde_json::from_str(r#"{ "base_url": "https://api.example.com" }"#).unwrap()
    }

    fn minimal_config() -> Config {
        Config {
            upstream: upstream(),
            cache: CacheSettings::default(),
            routes: vec![Route::new("/v1/episode/get")],
        }
    }

    #[test]
    fn valid_config_passes() {
        assert!(validate(&minimal_config()).is_ok());
    }

    #[test]
    fn empty_routes_fails() {
        let mut config = minimal_config();
        config.routes.clear();
        let errors = validate(&config).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("at least one route"));
    }

    #[test]
    fn invalid_base_url_fails() {
        let mut config = minimal_config();
        config.upstream.base_url = "not a url".into();
        let errors = validate(&config).unwrap_err();
        assert!(errors.iter().any(|e| e.message.contains("not a valid URL")));
    }

    #[test]
    fn non_http_scheme_fails() {
        let mut config = minimal_config();
        config.upstream.base_url = "ftp://api.example.com".into();
        let errors = validate(&config).unwrap_err();
        assert!(errors.iter().any(|e| e.message.contains("unsupported scheme")));
    }

    #[test]
    fn zero_ttl_fails_only_when_enabled() {
        let mut config = minimal_config();
        config.cache.ttl = 0;
        assert!(validate(&config).is_err());

        config.cache.enabled = false;
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn duplicate_path_fails() {
        let mut config = minimal_config();
        config.routes.push(Route::new("/v1/episode/get"));
        let errors = validate(&config).unwrap_err();
        assert!(errors.iter().any(|e| e.message == "duplicate route path"));
    }

    #[test]
    fn path_without_slash_fails() {
        let mut config = minimal_config();
        config.routes[0].path = "test".into();
        let errors = validate(&config).unwrap_err();
        assert!(errors
            .iter()
            .any(|e| e.suggestion.as_deref() == Some("did you mean '/test'?")));
    }

    #[test]
    fn invalid_method_fails() {
        let mut config = minimal_config();
        config.routes[0].methods = vec!["INVALID".into()];
        let errors = validate(&config).unwrap_err();
        assert!(errors
            .iter()
            .any(|e| e.message.contains("not a valid HTTP method")));
    }

    #[test]
    fn wildcard_upstream_method_fails() {
        let mut config = minimal_config();
        config.routes[0].upstream_method = Some("*".into());
        let errors = validate(&config).unwrap_err();
        assert!(errors.iter().any(|e| e.field == "upstream_method"));
    }

    #[test]
    fn invalid_identity_header_fails() {
        let mut config = minimal_config();
        config.upstream.identity_header = "bad header".into();
        let errors = validate(&config).unwrap_err();
        assert!(errors.iter().any(|e| e.field == "upstream.identity_header"));
    }

    #[test]
    fn same_path_with_other_methods_is_allowed() {
        let mut config = minimal_config();
        config.routes[0].methods = vec!["GET".into()];
        let mut post = Route::new("/v1/episode/get");
        post.methods = vec!["POST".into()];
        config.routes.push(post);
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn invalid_header_rule_name_fails() {
        let mut config = minimal_config();
        config.routes[0].headers.strip = vec!["bad header".into()];
        let errors = validate(&config).unwrap_err();
        assert!(errors.iter().any(|e| e.field == "headers"));
    }

    #[test]
    fn every_problem_is_reported() {
        let mut config = minimal_config();
        config.upstream.timeout = 0;
        config.routes[0].timeout = Some(0);
        config.routes[0].required = vec![String::new()];
        let errors = validate(&config).unwrap_err();
        assert_eq!(errors.len(), 3);
    }

    #[test]
    fn report_lists_routes() {
        let report = format_validation_report("cachegate.yaml", &minimal_config());
        assert!(report.starts_with("cachegate.yaml is valid"));
        assert!(report.contains("/v1/episode/get"));
        assert!(report.contains("replay mode, ttl 300s"));
    }
}
