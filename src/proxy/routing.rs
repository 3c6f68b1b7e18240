//! Specificity-based route matching for incoming HTTP requests.
//!
//! [`match_route`] scores each configured route against the request
//! path and method: exact segments score highest, parameterized segments
//! (`:param`) lower, and wildcard prefixes (`/prefix/*`) and the
//! catch-all (`/*`) lowest. The highest-scoring route wins; on a tie the
//! earlier route in the config wins. Captured parameters are returned
//! for substitution into the route's upstream path.

use std::collections::HashMap;

use crate::config::model::Route;

const EXACT_SEGMENT: u32 = 10;
const PARAM_SEGMENT: u32 = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteMatch {
    pub index: usize,
    pub params: HashMap<String, String>,
    specificity: u32,
}

#[must_use]
pub fn match_route(routes: &[Route], path: &str, method: &str) -> Option<RouteMatch> {
    let request: Vec<&str> = segments(path).collect();

    routes
        .iter()
        .enumerate()
        .filter(|(_, route)| method_matches(&route.methods, method))
        .filter_map(|(index, route)| score(&route.path, &request, index))
        // max_by_key keeps the last maximum; reversing makes the first route win ties
        .rev()
        .max_by_key(|m| m.specificity)
}

fn score(route_path: &str, request: &[&str], index: usize) -> Option<RouteMatch> {
    let found = |specificity, params| {
        Some(RouteMatch {
            index,
            params,
            specificity,
        })
    };

    if route_path == "/*" || route_path == "*" {
        return found(0, HashMap::new());
    }

    if let Some(prefix) = route_path.strip_suffix("/*") {
        let prefix: Vec<&str> = segments(prefix).collect();
        let matched = request.len() >= prefix.len()
            && prefix.iter().zip(request).all(|(r, q)| r == q);
        return if matched {
            found(segment_count(prefix.len()) * EXACT_SEGMENT, HashMap::new())
        } else {
            None
        };
    }

    let pattern: Vec<&str> = segments(route_path).collect();
    if pattern.len() != request.len() {
        return None;
    }

    // Offset by one so a fully parameterized route still outranks the catch-all
    let mut specificity = 1;
    let mut params = HashMap::new();
    for (segment, actual) in pattern.iter().zip(request) {
        if let Some(name) = segment.strip_prefix(':') {
            params.insert(name.to_string(), (*actual).to_string());
            specificity += PARAM_SEGMENT;
        } else if segment == actual {
            specificity += EXACT_SEGMENT;
        } else {
            return None;
        }
    }
    found(specificity, params)
}

fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

#[allow(clippy::cast_possible_truncation)]
const fn segment_count(n: usize) -> u32 {
    n as u32
}

fn method_matches(methods: &[String], method: &str) -> bool {
    methods
        .iter()
        .any(|m| m == "*" || m.eq_ignore_ascii_case(method))
}
