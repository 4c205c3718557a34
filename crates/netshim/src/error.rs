//! Error types for rule registration and dispatch.

/// Errors rejected synchronously at rule-registration time.
///
/// Nothing that fails registration is ever stored: an invalid pattern or a
/// missing stub file is reported to the caller before the rule becomes active.
#[derive(Debug, thiserror::Error)]
pub enum RegistrationError {
    #[error("invalid regex pattern `{pattern}`: {source}")]
    InvalidRegex {
        pattern: String,
        #[source]
        source: regex::Error,
    },
    #[error("failed to read stub file {path}: {source}")]
    FileRead {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid payload: {0}")]
    InvalidPayload(String),
}

/// Transport-level failures delivered to the intercepted caller.
///
/// `Simulated` is a designed feature (a `failure_code` stub), distinct from an
/// HTTP error status: the caller observes a connection-level error instead of
/// a response.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("simulated transport failure (code {0})")]
    Simulated(i64),
    #[error("upstream request failed: {0}")]
    Upstream(String),
}
