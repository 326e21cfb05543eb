//! Segment-by-segment matching of locations against patterns

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::errors::RouteError;
use crate::pattern::{RoutePattern, Segment, Token};

/// Placeholder side table, e.g. `orgId -> 42` known at runtime.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RouteParams(HashMap<String, String>);

impl RouteParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.0.insert(name.into(), value.into());
        self
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn as_map(&self) -> &HashMap<String, String> {
        &self.0
    }
}

impl<K, V> FromIterator<(K, V)> for RouteParams
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// Matches live locations against step routes with a placeholder table.
#[derive(Debug, Clone, Default)]
pub struct RouteMatcher {
    params: RouteParams,
}

impl RouteMatcher {
    pub fn new(params: RouteParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &RouteParams {
        &self.params
    }

    pub fn set_params(&mut self, params: RouteParams) {
        self.params = params;
    }

    /// `matches(currentUrl, pattern)`. Unparseable input never matches.
    pub fn matches(&self, current_url: &str, pattern: &str) -> bool {
        match self.try_matches(current_url, pattern) {
            Ok(matched) => matched,
            Err(err) => {
                debug!(target: "route-matcher", %err, "route comparison skipped");
                false
            }
        }
    }

    pub fn try_matches(&self, current_url: &str, pattern: &str) -> Result<bool, RouteError> {
        let location = parse_location(current_url)?;
        let pattern = RoutePattern::parse(pattern)?.substitute(self.params.as_map());
        let matched = pattern.matches(&location);
        debug!(
            target: "route-matcher",
            url = current_url,
            pattern = %pattern,
            matched,
            "route compared"
        );
        Ok(matched)
    }
}

impl RoutePattern {
    /// True when `location` satisfies this pattern segment by segment.
    pub fn matches(&self, location: &RoutePattern) -> bool {
        self.segments()
            .into_iter()
            .zip(location.segments())
            .all(|(pattern, actual)| segment_matches(pattern, actual))
    }

    /// Pattern-to-pattern comparison used to detect duplicate routes.
    pub fn overlaps(&self, other: &RoutePattern) -> bool {
        self.matches(other)
    }
}

/// Parses a concrete location; absolute URLs are normalised by the URL parser
/// before their path, query and fragment are tokenised.
pub fn parse_location(current_url: &str) -> Result<RoutePattern, RouteError> {
    let trimmed = current_url.trim();
    if !trimmed.contains("://") {
        return RoutePattern::parse(trimmed);
    }
    let url = Url::parse(trimmed).map_err(|err| RouteError::InvalidUrl {
        url: trimmed.to_string(),
        reason: err.to_string(),
    })?;
    let mut remainder = url.path().to_string();
    if let Some(query) = url.query() {
        remainder.push('?');
        remainder.push_str(query);
    }
    if let Some(fragment) = url.fragment() {
        remainder.push('#');
        remainder.push_str(fragment);
    }
    RoutePattern::parse(&remainder)
}

fn segment_matches(pattern: Option<&Segment>, actual: Option<&Segment>) -> bool {
    match (pattern, actual) {
        (None, None) => true,
        (Some(pattern), Some(actual)) => {
            pattern.len() == actual.len()
                && pattern
                    .tokens
                    .iter()
                    .zip(&actual.tokens)
                    .all(|(p, a)| token_matches(p, a))
        }
        _ => false,
    }
}

fn token_matches(pattern: &Token, actual: &Token) -> bool {
    match (pattern, actual) {
        (
            Token::Pair { key, value },
            Token::Pair {
                key: actual_key,
                value: actual_value,
            },
        ) => key == actual_key && token_matches(value, actual_value),
        (pattern, actual) if pattern.is_marker() => !actual.is_empty(),
        (pattern, actual) if actual.is_marker() => !pattern.is_empty(),
        (Token::Literal(expected), Token::Literal(found)) => expected == found,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matcher() -> RouteMatcher {
        RouteMatcher::new(RouteParams::new().with("orgId", "42"))
    }

    #[test]
    fn literal_routes_need_every_token_equal() {
        let m = RouteMatcher::default();
        assert!(m.matches("/a/b/c", "/a/b/c"));
        assert!(!m.matches("/a/b/d", "/a/b/c"));
        assert!(!m.matches("/A/b/c", "/a/b/c"));
        assert!(m.matches("/a/b/c/", "/a/b/c"));
    }

    #[test]
    fn wildcard_needs_one_non_empty_token() {
        let m = RouteMatcher::default();
        assert!(m.matches("/users/17/edit", "/users/*/edit"));
        assert!(!m.matches("/users//edit", "/users/*/edit"));
        assert!(!m.matches("/users/17", "/users/17/*"));
        assert!(!m.matches("/users/17/edit/more", "/users/17/*"));
    }

    #[test]
    fn placeholder_scenario() {
        let m = matcher();
        assert!(m.matches("/orgs/42/settings", "/orgs/{{orgId}}/settings"));
        assert!(!m.matches("/orgs/42/settings/extra", "/orgs/{{orgId}}/settings"));
        assert!(!m.matches("/orgs//settings", "/orgs/{{orgId}}/settings"));
        assert!(!m.matches("/orgs/7/settings", "/orgs/{{orgId}}/settings"));
    }

    #[test]
    fn empty_binding_is_treated_as_unbound() {
        let m = RouteMatcher::new(RouteParams::new().with("orgId", ""));
        assert!(!m.matches("/orgs//settings", "/orgs/{{orgId}}/settings"));
        assert!(m.matches("/orgs/42/settings", "/orgs/{{orgId}}/settings"));
    }

    #[test]
    fn unbound_placeholder_acts_as_wildcard() {
        let m = matcher();
        assert!(m.matches("/teams/abc", "/teams/{{teamId}}"));
        assert!(!m.matches("/teams/", "/teams/{{teamId}}"));
    }

    #[test]
    fn segments_must_be_present_on_both_sides() {
        let m = RouteMatcher::default();
        assert!(!m.matches("/list?page=2", "/list"));
        assert!(!m.matches("/list", "/list?page=2"));
        assert!(!m.matches("/app#/inbox", "/app"));
        assert!(!m.matches("/docs#top", "/docs"));
        assert!(m.matches("/docs#top", "/docs#*"));
    }

    #[test]
    fn query_pairs_match_by_key_then_value() {
        let m = RouteMatcher::default();
        assert!(m.matches("/list?page=2&sort=asc", "/list?page=*&sort=asc"));
        assert!(!m.matches("/list?page=&sort=asc", "/list?page=*&sort=asc"));
        assert!(!m.matches("/list?size=2&sort=asc", "/list?page=*&sort=asc"));
        assert!(!m.matches("/list?sort=asc&page=2", "/list?page=*&sort=asc"));
        assert!(m.matches("/list?flag", "/list?*"));
    }

    #[test]
    fn hash_routes_and_hash_queries() {
        let m = RouteMatcher::default();
        assert!(m.matches("/app#/inbox/9?tab=open", "/app#/inbox/*?tab=*"));
        assert!(!m.matches("/app#/inbox/9", "/app#/inbox/*?tab=*"));
        assert!(m.matches("/app#!/inbox/9#reply", "/app#/inbox/{{id}}#reply"));
    }

    #[test]
    fn empty_pattern_only_matches_empty_remainder() {
        let m = RouteMatcher::default();
        assert!(m.matches("https://example.com", ""));
        assert!(m.matches("https://example.com/", ""));
        assert!(!m.matches("https://example.com/a", ""));
        assert!(!m.matches("https://example.com/?q=1", ""));
    }

    #[test]
    fn absolute_locations_are_normalised() {
        let m = matcher();
        assert!(m.matches(
            "https://app.example.com/orgs/42/settings?tab=billing",
            "/orgs/{{orgId}}/settings?tab=*"
        ));
        assert!(m.matches(
            "HTTPS://APP.example.com:443/orgs/42/./settings",
            "https://other.host/orgs/{{orgId}}/settings"
        ));
        assert!(!m.matches("http://[bad", "/"));
        assert!(m.try_matches("http://[bad", "/").is_err());
    }

    #[test]
    fn patterns_overlap_through_markers() {
        let a = RoutePattern::parse("/orgs/*/settings").unwrap();
        let b = RoutePattern::parse("/orgs/{{orgId}}/settings").unwrap();
        let c = RoutePattern::parse("/orgs/{{orgId}}/billing").unwrap();
        assert!(a.overlaps(&b));
        assert!(b.overlaps(&a));
        assert!(!b.overlaps(&c));
    }

    #[test]
    fn route_params_deserialize_from_a_map() {
        let params: RouteParams = serde_json::from_str(r#"{"orgId": "42"}"#).unwrap();
        assert_eq!(params.get("orgId"), Some("42"));
    }
}
