//! Request/response rewriting - ordered find/replace transformations plus
//! header add/replace/remove and status-code override.

use crate::error::RegistrationError;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// One find/replace step. `find` is a regex; `replace` may use `$N`
/// backreferences.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewriteReplacement {
    pub find: String,
    pub replace: String,
}

impl RewriteReplacement {
    pub fn new(find: impl Into<String>, replace: impl Into<String>) -> Self {
        Self {
            find: find.into(),
            replace: replace.into(),
        }
    }
}

/// A full rewrite payload.
///
/// Replacement lists compose sequentially: each step operates on the output
/// of the previous one. Header maps add absent keys, overwrite present ones,
/// and an empty value removes the key. A status code of `None` passes the
/// real status through.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Rewrite {
    pub url_replacements: Vec<RewriteReplacement>,
    pub request_body_replacements: Vec<RewriteReplacement>,
    pub response_body_replacements: Vec<RewriteReplacement>,
    pub request_headers: BTreeMap<String, String>,
    pub response_headers: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_status_code: Option<u16>,
    /// Number of matches this rewrite stays active for; absent or zero means
    /// unlimited (legacy wire encoding).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_iterations: Option<u64>,
}

#[derive(Debug, Clone)]
struct CompiledReplacement {
    regex: Regex,
    replace: String,
}

/// Compiled form of a [`Rewrite`] - every `find` pattern validated up front.
#[derive(Debug, Clone)]
pub struct CompiledRewrite {
    spec: Rewrite,
    url: Vec<CompiledReplacement>,
    request_body: Vec<CompiledReplacement>,
    response_body: Vec<CompiledReplacement>,
}

impl CompiledRewrite {
    pub fn compile(spec: &Rewrite) -> Result<Self, RegistrationError> {
        Ok(Self {
            url: compile_replacements(&spec.url_replacements)?,
            request_body: compile_replacements(&spec.request_body_replacements)?,
            response_body: compile_replacements(&spec.response_body_replacements)?,
            spec: spec.clone(),
        })
    }

    /// The declarative payload this was compiled from.
    pub fn spec(&self) -> &Rewrite {
        &self.spec
    }

    pub fn rewrite_url(&self, url: &str) -> String {
        apply_replacements(&self.url, url.to_string())
    }

    pub fn rewrite_request_body(&self, body: &[u8]) -> Vec<u8> {
        rewrite_body(&self.request_body, body)
    }

    pub fn rewrite_response_body(&self, body: &[u8]) -> Vec<u8> {
        rewrite_body(&self.response_body, body)
    }

    pub fn rewrite_request_headers(
        &self,
        headers: &HashMap<String, String>,
    ) -> HashMap<String, String> {
        apply_header_replacements(&self.spec.request_headers, headers)
    }

    pub fn rewrite_response_headers(
        &self,
        headers: &HashMap<String, String>,
    ) -> HashMap<String, String> {
        apply_header_replacements(&self.spec.response_headers, headers)
    }

    pub fn rewrite_status_code(&self, status: u16) -> u16 {
        self.spec.response_status_code.unwrap_or(status)
    }

    /// Whether anything on the response side would change.
    pub fn rewrites_response(&self) -> bool {
        !self.response_body.is_empty()
            || !self.spec.response_headers.is_empty()
            || self.spec.response_status_code.is_some()
    }

    /// Whether anything on the request side would change.
    pub fn rewrites_request(&self) -> bool {
        !self.url.is_empty()
            || !self.request_body.is_empty()
            || !self.spec.request_headers.is_empty()
    }
}

fn compile_replacements(
    replacements: &[RewriteReplacement],
) -> Result<Vec<CompiledReplacement>, RegistrationError> {
    replacements
        .iter()
        .map(|r| {
            let regex = RegexBuilder::new(&r.find)
                .case_insensitive(true)
                .build()
                .map_err(|source| RegistrationError::InvalidRegex {
                    pattern: r.find.clone(),
                    source,
                })?;
            Ok(CompiledReplacement {
                regex,
                replace: r.replace.clone(),
            })
        })
        .collect()
}

fn apply_replacements(replacements: &[CompiledReplacement], mut text: String) -> String {
    for r in replacements {
        text = r.regex.replace_all(&text, r.replace.as_str()).into_owned();
    }
    text
}

fn rewrite_body(replacements: &[CompiledReplacement], body: &[u8]) -> Vec<u8> {
    if replacements.is_empty() {
        return body.to_vec();
    }
    let text = String::from_utf8_lossy(body).into_owned();
    apply_replacements(replacements, text).into_bytes()
}

fn apply_header_replacements(
    replacements: &BTreeMap<String, String>,
    headers: &HashMap<String, String>,
) -> HashMap<String, String> {
    let mut headers = headers.clone();
    for (key, value) in replacements {
        if value.is_empty() {
            headers.retain(|k, _| !k.eq_ignore_ascii_case(key));
        } else {
            // Preserve the casing of an already-present key.
            let existing = headers
                .keys()
                .find(|k| k.eq_ignore_ascii_case(key))
                .cloned()
                .unwrap_or_else(|| key.clone());
            headers.insert(existing, value.clone());
        }
    }
    headers
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compile(spec: Rewrite) -> CompiledRewrite {
        CompiledRewrite::compile(&spec).unwrap()
    }

    #[test]
    fn test_replacements_compose_sequentially() {
        let rw = compile(Rewrite {
            response_body_replacements: vec![
                RewriteReplacement::new("a", "b"),
                RewriteReplacement::new("b", "c"),
            ],
            ..Rewrite::default()
        });
        // "a" -> "b" -> "c": each step sees the previous step's output.
        assert_eq!(rw.rewrite_response_body(b"a"), b"c");
    }

    #[test]
    fn test_backreferences() {
        let rw = compile(Rewrite {
            url_replacements: vec![RewriteReplacement::new(r"/v(\d+)/", "/version/$1/")],
            ..Rewrite::default()
        });
        assert_eq!(
            rw.rewrite_url("https://x/v2/users"),
            "https://x/version/2/users"
        );
    }

    #[test]
    fn test_header_add_replace_remove() {
        let mut replacements = BTreeMap::new();
        replacements.insert("X-Added".to_string(), "new".to_string());
        replacements.insert("X-Present".to_string(), "overwritten".to_string());
        replacements.insert("X-Foo".to_string(), String::new());
        let rw = compile(Rewrite {
            response_headers: replacements,
            ..Rewrite::default()
        });

        let mut headers = HashMap::new();
        headers.insert("X-Present".to_string(), "old".to_string());
        headers.insert("X-Foo".to_string(), "1".to_string());
        headers.insert("X-Untouched".to_string(), "keep".to_string());

        let rewritten = rw.rewrite_response_headers(&headers);
        assert_eq!(rewritten.get("X-Added").unwrap(), "new");
        assert_eq!(rewritten.get("X-Present").unwrap(), "overwritten");
        assert_eq!(rewritten.get("X-Untouched").unwrap(), "keep");
        assert!(!rewritten.contains_key("X-Foo"));

        // Removing an absent key is a no-op.
        let rewritten = rw.rewrite_response_headers(&HashMap::new());
        assert!(!rewritten.contains_key("X-Foo"));
    }

    #[test]
    fn test_status_code_override() {
        let rw = compile(Rewrite {
            response_status_code: Some(503),
            ..Rewrite::default()
        });
        assert_eq!(rw.rewrite_status_code(200), 503);

        let passthrough = compile(Rewrite::default());
        assert_eq!(passthrough.rewrite_status_code(200), 200);
    }

    #[test]
    fn test_find_is_case_insensitive() {
        let rw = compile(Rewrite {
            request_body_replacements: vec![RewriteReplacement::new("hello", "bye")],
            ..Rewrite::default()
        });
        assert_eq!(rw.rewrite_request_body(b"HELLO world"), b"bye world");
    }

    #[test]
    fn test_invalid_find_pattern_fails_compile() {
        let err = CompiledRewrite::compile(&Rewrite {
            url_replacements: vec![RewriteReplacement::new("(", "x")],
            ..Rewrite::default()
        })
        .unwrap_err();
        assert!(matches!(err, RegistrationError::InvalidRegex { .. }));
    }

    #[test]
    fn test_change_detection() {
        let rw = compile(Rewrite {
            response_status_code: Some(500),
            ..Rewrite::default()
        });
        assert!(rw.rewrites_response());
        assert!(!rw.rewrites_request());

        let rw = compile(Rewrite {
            url_replacements: vec![RewriteReplacement::new("a", "b")],
            ..Rewrite::default()
        });
        assert!(rw.rewrites_request());
        assert!(!rw.rewrites_response());
    }
}
