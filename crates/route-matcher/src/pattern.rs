//! Route pattern parsing

use std::collections::HashMap;
use std::fmt;

use crate::errors::RouteError;

/// One position inside a segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Literal(String),
    /// `*`
    Wildcard,
    /// `{{name}}`
    Placeholder(String),
    /// `key=value` query pair; the value is itself a token.
    Pair { key: String, value: Box<Token> },
}

impl Token {
    fn parse(raw: &str) -> Result<Self, RouteError> {
        if raw == "*" {
            return Ok(Token::Wildcard);
        }
        if let Some(inner) = raw
            .strip_prefix("{{")
            .and_then(|rest| rest.strip_suffix("}}"))
        {
            let name = inner.trim();
            if name.is_empty() {
                return Err(RouteError::InvalidPlaceholder(raw.to_string()));
            }
            return Ok(Token::Placeholder(name.to_string()));
        }
        Ok(Token::Literal(raw.to_string()))
    }

    fn parse_query(raw: &str) -> Result<Self, RouteError> {
        match raw.split_once('=') {
            Some((key, value)) if !key.is_empty() => Ok(Token::Pair {
                key: key.to_string(),
                value: Box::new(Token::parse(value)?),
            }),
            _ => Token::parse(raw),
        }
    }

    /// True for tokens that stand for "any one token".
    pub fn is_marker(&self) -> bool {
        matches!(self, Token::Wildcard | Token::Placeholder(_))
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Token::Literal(text) if text.is_empty())
    }

    fn substitute(&self, params: &HashMap<String, String>) -> Token {
        match self {
            // An empty value leaves the placeholder unresolved.
            Token::Placeholder(name) => match params.get(name) {
                Some(value) if !value.is_empty() => Token::Literal(value.clone()),
                _ => self.clone(),
            },
            Token::Pair { key, value } => Token::Pair {
                key: key.clone(),
                value: Box::new(value.substitute(params)),
            },
            other => other.clone(),
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Literal(text) => f.write_str(text),
            Token::Wildcard => f.write_str("*"),
            Token::Placeholder(name) => write!(f, "{{{{{}}}}}", name),
            Token::Pair { key, value } => write!(f, "{}={}", key, value),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Segment {
    pub tokens: Vec<Token>,
}

impl Segment {
    fn path(raw: &str) -> Result<Self, RouteError> {
        let trimmed = raw.strip_prefix('/').unwrap_or(raw);
        let trimmed = trimmed.strip_suffix('/').unwrap_or(trimmed);
        if trimmed.is_empty() {
            return Ok(Segment::default());
        }
        let tokens = trimmed
            .split('/')
            .map(Token::parse)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Segment { tokens })
    }

    fn query(parts: &[&str]) -> Result<Self, RouteError> {
        let mut tokens = Vec::new();
        for part in parts {
            for raw in part.split('&') {
                tokens.push(Token::parse_query(raw)?);
            }
        }
        Ok(Segment { tokens })
    }

    fn single(raw: &str) -> Result<Self, RouteError> {
        Ok(Segment {
            tokens: vec![Token::parse(raw)?],
        })
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    fn substitute(&self, params: &HashMap<String, String>) -> Segment {
        Segment {
            tokens: self.tokens.iter().map(|t| t.substitute(params)).collect(),
        }
    }
}

/// A location or route template split into its four segments.
///
/// The same type represents concrete locations; a concrete location simply
/// has no wildcard or placeholder tokens (unless it is another pattern being
/// compared for overlap).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutePattern {
    raw: String,
    pub path: Segment,
    pub hash_path: Option<Segment>,
    pub query: Option<Segment>,
    pub fragment: Option<Segment>,
}

impl RoutePattern {
    /// Parses a relative route (`/a/b?x=1#/hash/path?y=2#frag`) or an
    /// absolute one, whose scheme and host are ignored.
    pub fn parse(raw: &str) -> Result<Self, RouteError> {
        let remainder = strip_origin(raw.trim());

        let (before_hash, hash) = match remainder.split_once('#') {
            Some((before, after)) => (before, Some(after)),
            None => (remainder, None),
        };
        let (path_raw, main_query) = split_query(before_hash);

        let mut hash_path = None;
        let mut hash_query = None;
        let mut fragment = None;
        if let Some(hash) = hash.filter(|h| !h.is_empty()) {
            let routed = hash.strip_prefix("!/").or_else(|| hash.strip_prefix('/'));
            match routed {
                Some(rest) => {
                    let (routed_part, frag) = match rest.split_once('#') {
                        Some((routed_part, frag)) => (routed_part, Some(frag)),
                        None => (rest, None),
                    };
                    let (hash_path_raw, query) = split_query(routed_part);
                    hash_path = Some(Segment::path(hash_path_raw)?);
                    hash_query = query;
                    fragment = frag.filter(|f| !f.is_empty());
                }
                None => fragment = Some(hash),
            }
        }

        let query_parts: Vec<&str> = [main_query, hash_query].into_iter().flatten().collect();
        let query = if query_parts.is_empty() {
            None
        } else {
            Some(Segment::query(&query_parts)?)
        };

        Ok(Self {
            raw: raw.to_string(),
            path: Segment::path(path_raw)?,
            hash_path,
            query,
            fragment: fragment.map(Segment::single).transpose()?,
        })
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// True when the pattern has no tokens in any segment.
    pub fn is_blank(&self) -> bool {
        self.path.is_empty()
            && self.hash_path.is_none()
            && self.query.is_none()
            && self.fragment.is_none()
    }

    /// Names of every placeholder in the pattern, in order of appearance.
    pub fn placeholders(&self) -> Vec<&str> {
        fn collect<'a>(token: &'a Token, out: &mut Vec<&'a str>) {
            match token {
                Token::Placeholder(name) => out.push(name),
                Token::Pair { value, .. } => collect(value, out),
                _ => {}
            }
        }
        let mut names = Vec::new();
        for segment in self.segments().into_iter().flatten() {
            for token in &segment.tokens {
                collect(token, &mut names);
            }
        }
        names
    }

    /// Replaces every placeholder that has a value in `params`; unknown
    /// placeholders stay as one-token wildcards.
    pub fn substitute(&self, params: &HashMap<String, String>) -> RoutePattern {
        if params.is_empty() {
            return self.clone();
        }
        RoutePattern {
            raw: self.raw.clone(),
            path: self.path.substitute(params),
            hash_path: self.hash_path.as_ref().map(|s| s.substitute(params)),
            query: self.query.as_ref().map(|s| s.substitute(params)),
            fragment: self.fragment.as_ref().map(|s| s.substitute(params)),
        }
    }

    pub(crate) fn segments(&self) -> [Option<&Segment>; 4] {
        [
            Some(&self.path),
            self.hash_path.as_ref(),
            self.query.as_ref(),
            self.fragment.as_ref(),
        ]
    }
}

impl fmt::Display for RoutePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Drops `scheme://authority` so only the routed remainder is parsed.
fn strip_origin(raw: &str) -> &str {
    match raw.find("://") {
        Some(idx) => {
            let rest = &raw[idx + 3..];
            match rest.find(['/', '?', '#']) {
                Some(pos) => &rest[pos..],
                None => "",
            }
        }
        None => raw,
    }
}

fn split_query(raw: &str) -> (&str, Option<&str>) {
    match raw.split_once('?') {
        Some((path, query)) if !query.is_empty() => (path, Some(query)),
        Some((path, _)) => (path, None),
        None => (raw, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lit(text: &str) -> Token {
        Token::Literal(text.to_string())
    }

    #[test]
    fn parses_all_four_segments() {
        let pattern = RoutePattern::parse("/app/{{ws}}/list?page=*&sort=asc#/inbox/*?tab=open#top")
            .unwrap();
        assert_eq!(
            pattern.path.tokens,
            vec![lit("app"), Token::Placeholder("ws".into()), lit("list")]
        );
        assert_eq!(pattern.hash_path.as_ref().unwrap().tokens, vec![lit("inbox"), Token::Wildcard]);
        let query = pattern.query.as_ref().unwrap();
        assert_eq!(query.len(), 3);
        assert_eq!(
            query.tokens[0],
            Token::Pair {
                key: "page".into(),
                value: Box::new(Token::Wildcard)
            }
        );
        assert_eq!(pattern.fragment.as_ref().unwrap().tokens, vec![lit("top")]);
    }

    #[test]
    fn plain_hash_is_a_fragment() {
        let pattern = RoutePattern::parse("/docs#install").unwrap();
        assert!(pattern.hash_path.is_none());
        assert_eq!(pattern.fragment.unwrap().tokens, vec![lit("install")]);
    }

    #[test]
    fn hashbang_routes_are_hash_paths() {
        let pattern = RoutePattern::parse("/#!/users/7").unwrap();
        assert!(pattern.path.is_empty());
        assert_eq!(pattern.hash_path.unwrap().tokens, vec![lit("users"), lit("7")]);
    }

    #[test]
    fn keeps_interior_empty_tokens_and_drops_trailing_slash() {
        let pattern = RoutePattern::parse("/orgs//settings/").unwrap();
        assert_eq!(pattern.path.tokens, vec![lit("orgs"), lit(""), lit("settings")]);
    }

    #[test]
    fn absolute_urls_drop_origin_but_keep_placeholders() {
        let pattern = RoutePattern::parse("https://app.example.com/orgs/{{orgId}}").unwrap();
        assert_eq!(pattern.path.tokens, vec![lit("orgs"), Token::Placeholder("orgId".into())]);
        assert!(RoutePattern::parse("https://app.example.com").unwrap().is_blank());
    }

    #[test]
    fn empty_placeholder_is_rejected() {
        assert_eq!(
            RoutePattern::parse("/a/{{}}").unwrap_err(),
            RouteError::InvalidPlaceholder("{{}}".into())
        );
    }

    #[test]
    fn substitute_binds_known_placeholders_only() {
        let pattern = RoutePattern::parse("/orgs/{{orgId}}/teams/{{teamId}}?view={{view}}").unwrap();
        let params = HashMap::from([
            ("orgId".to_string(), "42".to_string()),
            ("view".to_string(), "grid".to_string()),
        ]);
        let bound = pattern.substitute(&params);
        assert_eq!(bound.path.tokens[1], lit("42"));
        assert_eq!(bound.path.tokens[3], Token::Placeholder("teamId".into()));
        assert_eq!(
            bound.query.unwrap().tokens[0],
            Token::Pair {
                key: "view".into(),
                value: Box::new(lit("grid"))
            }
        );
        assert_eq!(pattern.placeholders(), vec!["orgId", "teamId", "view"]);
    }

    #[test]
    fn empty_values_do_not_bind() {
        let pattern = RoutePattern::parse("/orgs/{{orgId}}/settings").unwrap();
        let params = HashMap::from([("orgId".to_string(), String::new())]);
        let bound = pattern.substitute(&params);
        assert_eq!(bound.path.tokens[1], Token::Placeholder("orgId".into()));
    }

    #[test]
    fn display_round_trips_tokens() {
        assert_eq!(Token::Placeholder("id".into()).to_string(), "{{id}}");
        assert_eq!(
            Token::Pair {
                key: "a".into(),
                value: Box::new(Token::Wildcard)
            }
            .to_string(),
            "a=*"
        );
    }
}
