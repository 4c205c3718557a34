//! Declarative request-match specifications.
//!
//! A [`RequestMatch`] describes which outgoing requests a rule applies to.
//! It is a pure value: compared structurally (remove-by-match relies on this)
//! and compiled once at registration time into a [`CompiledRequestMatch`],
//! which is where invalid patterns are rejected.

mod compiled;
mod regex_matcher;

pub use compiled::CompiledRequestMatch;
pub use regex_matcher::RegexMatcher;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;

/// A single query-string condition.
///
/// On the wire this is the legacy string encoding where a leading `!` negates
/// the term; in the API it is an explicit `{ pattern, negate }` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryTerm {
    pub pattern: String,
    pub negate: bool,
}

impl QueryTerm {
    /// A term that must match somewhere in the query string.
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            negate: false,
        }
    }

    /// A term that must NOT match anywhere in the query string.
    pub fn negated(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            negate: true,
        }
    }

    /// Parse the wire encoding, where a leading `!` marks negation.
    pub fn parse(raw: &str) -> Self {
        match raw.strip_prefix('!') {
            Some(pattern) => Self::negated(pattern),
            None => Self::new(raw),
        }
    }

    /// The wire encoding of this term.
    pub fn encode(&self) -> String {
        if self.negate {
            format!("!{}", self.pattern)
        } else {
            self.pattern.clone()
        }
    }
}

impl Serialize for QueryTerm {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.encode())
    }
}

impl<'de> Deserialize<'de> for QueryTerm {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(QueryTerm::parse(&raw))
    }
}

/// Matching specification evaluated against a request/response pair.
///
/// All fields are optional and ANDed together; a specification with every
/// field empty matches every request (used for catch-all monitors).
/// `response_headers` can only be evaluated once a response is available and
/// is ignored during pre-send stub lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RequestMatch {
    /// Regex matched (unanchored, case-insensitive) against the absolute URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Per-term regexes ANDed against the query string (GET/DELETE) or the
    /// body text (POST/PUT/PATCH).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<Vec<QueryTerm>>,
    /// Exact, case-sensitive HTTP method.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    /// Regex matched against the decoded request body.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    /// Header-name regex -> header-value regex, every entry must be satisfied.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_headers: Option<BTreeMap<String, String>>,
    /// Same as `request_headers`, evaluated post-hoc against the response.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_headers: Option<BTreeMap<String, String>>,
}

impl RequestMatch {
    /// Catch-all specification.
    pub fn any() -> Self {
        Self::default()
    }

    /// Specification matching on URL regex only.
    pub fn url(pattern: impl Into<String>) -> Self {
        Self {
            url: Some(pattern.into()),
            ..Self::default()
        }
    }

    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    pub fn with_query(mut self, terms: Vec<QueryTerm>) -> Self {
        self.query = Some(terms);
        self
    }

    pub fn with_body(mut self, pattern: impl Into<String>) -> Self {
        self.body = Some(pattern.into());
        self
    }

    pub fn with_request_headers(mut self, headers: BTreeMap<String, String>) -> Self {
        self.request_headers = Some(headers);
        self
    }

    pub fn with_response_headers(mut self, headers: BTreeMap<String, String>) -> Self {
        self.response_headers = Some(headers);
        self
    }
}
