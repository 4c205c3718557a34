//! Regex wrapper with optional inverted matching.

use crate::error::RegistrationError;
use regex::Regex;

/// A compiled regex plus an invert flag.
///
/// Built from either the typed `{ pattern, negate }` form or the wire form
/// where a leading `!` in the pattern string negates the match.
#[derive(Debug, Clone)]
pub struct RegexMatcher {
    regex: Regex,
    invert: bool,
}

impl RegexMatcher {
    pub fn new(pattern: &str, invert: bool) -> Result<Self, RegistrationError> {
        let regex = Regex::new(pattern).map_err(|source| RegistrationError::InvalidRegex {
            pattern: pattern.to_string(),
            source,
        })?;
        Ok(Self { regex, invert })
    }

    /// Parse the wire encoding, stripping a leading `!` as negation.
    pub fn from_wire(pattern: &str) -> Result<Self, RegistrationError> {
        match pattern.strip_prefix('!') {
            Some(stripped) => Self::new(stripped, true),
            None => Self::new(pattern, false),
        }
    }

    /// Unanchored match, inverted when the matcher is negated.
    pub fn is_match(&self, text: &str) -> bool {
        self.regex.is_match(text) != self.invert
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_match() {
        let m = RegexMatcher::new(r"foo=\d+", false).unwrap();
        assert!(m.is_match("&foo=42&bar=1"));
        assert!(!m.is_match("&bar=1"));
    }

    #[test]
    fn test_inverted_match() {
        let m = RegexMatcher::from_wire("!foo=bar").unwrap();
        assert!(m.is_match("&baz=1"));
        assert!(!m.is_match("&foo=bar"));
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        let err = RegexMatcher::new("(", false).unwrap_err();
        assert!(matches!(err, RegistrationError::InvalidRegex { .. }));
    }
}
