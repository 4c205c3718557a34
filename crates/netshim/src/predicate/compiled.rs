//! Compiled request matcher - regex validation happens here, once, at
//! registration time.

use super::regex_matcher::RegexMatcher;
use super::RequestMatch;
use crate::error::RegistrationError;
use crate::http::HttpRequest;
use regex::{Regex, RegexBuilder};
use std::collections::HashMap;

/// A header condition: the name regex must match some header name whose value
/// matches the value regex.
#[derive(Debug, Clone)]
struct HeaderMatcher {
    name: RegexMatcher,
    value: RegexMatcher,
}

impl HeaderMatcher {
    fn is_satisfied(&self, headers: &HashMap<String, String>) -> bool {
        headers
            .iter()
            .any(|(k, v)| self.name.is_match(k) && self.value.is_match(v))
    }
}

/// Compiled form of a [`RequestMatch`], ready for repeated evaluation.
///
/// Evaluation is a pure function of the specification and the message pair:
/// no state, deterministic results.
#[derive(Debug, Clone)]
pub struct CompiledRequestMatch {
    url: Option<Regex>,
    query: Vec<RegexMatcher>,
    method: Option<String>,
    body: Option<RegexMatcher>,
    request_headers: Vec<HeaderMatcher>,
    response_headers: Vec<HeaderMatcher>,
}

impl CompiledRequestMatch {
    pub fn compile(spec: &RequestMatch) -> Result<Self, RegistrationError> {
        let url = spec
            .url
            .as_deref()
            .map(|pattern| {
                RegexBuilder::new(pattern)
                    .case_insensitive(true)
                    .build()
                    .map_err(|source| RegistrationError::InvalidRegex {
                        pattern: pattern.to_string(),
                        source,
                    })
            })
            .transpose()?;

        let query = spec
            .query
            .as_deref()
            .unwrap_or_default()
            .iter()
            .map(|term| RegexMatcher::new(&term.pattern, term.negate))
            .collect::<Result<Vec<_>, _>>()?;

        let body = spec
            .body
            .as_deref()
            .map(RegexMatcher::from_wire)
            .transpose()?;

        Ok(Self {
            url,
            query,
            method: spec.method.clone(),
            body,
            request_headers: compile_header_map(spec.request_headers.iter().flatten())?,
            response_headers: compile_header_map(spec.response_headers.iter().flatten())?,
        })
    }

    /// Evaluate the request-side conditions. Response-header conditions are
    /// deliberately not consulted here; see [`Self::matches_response_headers`].
    pub fn matches_request(&self, request: &HttpRequest) -> bool {
        if let Some(method) = &self.method {
            if request.method != *method {
                return false;
            }
        }

        if let Some(url) = &self.url {
            if !url.is_match(&request.url) {
                return false;
            }
        }

        if !self.query.is_empty() {
            // Prepend `&` so patterns can uniformly anchor on `&name=value`.
            let subject = match request.method.as_str() {
                "POST" | "PUT" | "PATCH" => format!("&{}", request.body_text()),
                _ => format!("&{}", request.query().unwrap_or_default()),
            };
            if !self.query.iter().all(|term| term.is_match(&subject)) {
                return false;
            }
        }

        if let Some(body) = &self.body {
            if !body.is_match(&request.body_text()) {
                return false;
            }
        }

        self.request_headers
            .iter()
            .all(|h| h.is_satisfied(&request.headers))
    }

    /// Post-hoc evaluation of the response-header conditions.
    ///
    /// `None` means no response was observed (e.g. a simulated transport
    /// failure); that only satisfies a specification with no response-header
    /// conditions.
    pub fn matches_response_headers(&self, headers: Option<&HashMap<String, String>>) -> bool {
        if self.response_headers.is_empty() {
            return true;
        }
        match headers {
            Some(headers) => self
                .response_headers
                .iter()
                .all(|h| h.is_satisfied(headers)),
            None => false,
        }
    }

    /// Whether any response-side condition is declared.
    pub fn has_response_conditions(&self) -> bool {
        !self.response_headers.is_empty()
    }
}

fn compile_header_map<'a>(
    entries: impl Iterator<Item = (&'a String, &'a String)>,
) -> Result<Vec<HeaderMatcher>, RegistrationError> {
    entries
        .map(|(name, value)| {
            Ok(HeaderMatcher {
                name: RegexMatcher::from_wire(name)?,
                value: RegexMatcher::from_wire(value)?,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predicate::QueryTerm;
    use std::collections::BTreeMap;

    fn compile(spec: &RequestMatch) -> CompiledRequestMatch {
        CompiledRequestMatch::compile(spec).unwrap()
    }

    #[test]
    fn test_empty_spec_matches_everything() {
        let m = compile(&RequestMatch::any());
        assert!(m.matches_request(&HttpRequest::new("GET", "https://example.com/a")));
        assert!(m.matches_request(&HttpRequest::new("POST", "https://other.org/b")));
    }

    #[test]
    fn test_url_regex_unanchored_case_insensitive() {
        let m = compile(&RequestMatch::url(r"example\.com/api"));
        assert!(m.matches_request(&HttpRequest::new("GET", "https://EXAMPLE.com/api/v1")));
        assert!(!m.matches_request(&HttpRequest::new("GET", "https://example.org/api")));
    }

    #[test]
    fn test_method_exact_case_sensitive() {
        let m = compile(&RequestMatch::any().with_method("POST"));
        assert!(m.matches_request(&HttpRequest::new("POST", "https://x/a")));
        assert!(!m.matches_request(&HttpRequest::new("post", "https://x/a")));
        assert!(!m.matches_request(&HttpRequest::new("GET", "https://x/a")));
    }

    #[test]
    fn test_query_terms_against_get_query_string() {
        let m = compile(
            &RequestMatch::any().with_query(vec![QueryTerm::new("&a=1"), QueryTerm::new("b=2")]),
        );
        assert!(m.matches_request(&HttpRequest::new("GET", "https://x/p?a=1&b=2")));
        assert!(!m.matches_request(&HttpRequest::new("GET", "https://x/p?a=1")));
    }

    #[test]
    fn test_query_terms_against_post_body() {
        let m = compile(&RequestMatch::any().with_query(vec![QueryTerm::new("&user=bob")]));
        let req = HttpRequest::new("POST", "https://x/p").with_body(b"user=bob&pw=1".to_vec());
        assert!(m.matches_request(&req));

        let req = HttpRequest::new("POST", "https://x/p?user=bob");
        assert!(!m.matches_request(&req));
    }

    #[test]
    fn test_negated_query_term() {
        let m = compile(&RequestMatch::any().with_query(vec![QueryTerm::negated("foo=bar")]));
        assert!(m.matches_request(&HttpRequest::new("GET", "https://x/p?baz=1")));
        assert!(!m.matches_request(&HttpRequest::new("GET", "https://x/p?foo=bar")));
    }

    #[test]
    fn test_body_regex() {
        let m = compile(&RequestMatch::any().with_body(r#""id":\s*\d+"#));
        let req = HttpRequest::new("POST", "https://x/p").with_body(br#"{"id": 42}"#.to_vec());
        assert!(m.matches_request(&req));

        let empty = HttpRequest::new("POST", "https://x/p");
        assert!(!m.matches_request(&empty));
    }

    #[test]
    fn test_request_header_conditions() {
        let mut headers = BTreeMap::new();
        headers.insert("Authorization".to_string(), "Bearer .*".to_string());
        let m = compile(&RequestMatch::any().with_request_headers(headers));

        let req = HttpRequest::new("GET", "https://x/p").with_header("Authorization", "Bearer abc");
        assert!(m.matches_request(&req));

        let req = HttpRequest::new("GET", "https://x/p").with_header("Authorization", "Basic abc");
        assert!(!m.matches_request(&req));

        let req = HttpRequest::new("GET", "https://x/p");
        assert!(!m.matches_request(&req));
    }

    #[test]
    fn test_response_headers_ignored_for_request_matching() {
        let mut headers = BTreeMap::new();
        headers.insert("Content-Type".to_string(), "application/json".to_string());
        let m = compile(&RequestMatch::any().with_response_headers(headers));

        // Pre-send evaluation ignores response conditions entirely.
        assert!(m.matches_request(&HttpRequest::new("GET", "https://x/p")));
        assert!(m.has_response_conditions());

        let mut actual = HashMap::new();
        actual.insert("Content-Type".to_string(), "application/json".to_string());
        assert!(m.matches_response_headers(Some(&actual)));

        actual.insert("Content-Type".to_string(), "text/html".to_string());
        assert!(!m.matches_response_headers(Some(&actual)));
        assert!(!m.matches_response_headers(None));
    }

    #[test]
    fn test_match_determinism() {
        let m = compile(&RequestMatch::url(r"/login$").with_method("POST"));
        let req = HttpRequest::new("POST", "https://x/login");
        let first = m.matches_request(&req);
        for _ in 0..100 {
            assert_eq!(m.matches_request(&req), first);
        }
    }

    #[test]
    fn test_invalid_url_pattern_fails_compile() {
        let err = CompiledRequestMatch::compile(&RequestMatch::url("[")).unwrap_err();
        assert!(matches!(err, RegistrationError::InvalidRegex { .. }));
    }
}
