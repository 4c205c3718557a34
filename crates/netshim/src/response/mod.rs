//! Stub response payloads and their construction rules.

mod synthesizer;

pub use synthesizer::{delay_for, synthesize, SyntheticDelivery};

use crate::error::RegistrationError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// High-level stub body accepted from callers, resolved to bytes plus a
/// content type at construction time rather than at send time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ResponseBody {
    Json(serde_json::Value),
    #[serde(with = "crate::http::base64_bytes")]
    Bytes(Vec<u8>),
    Text(String),
}

/// Process-wide defaults applied when a stub omits a field.
///
/// Passed explicitly into builders instead of living in ambient static state;
/// `reset` restores the initial values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StubDefaults {
    pub response_time: f64,
    pub return_code: u16,
    pub json_content_type: String,
    pub data_content_type: String,
    pub text_content_type: String,
}

impl Default for StubDefaults {
    fn default() -> Self {
        Self {
            response_time: 0.0,
            return_code: 200,
            json_content_type: "application/json".to_string(),
            data_content_type: "application/octet-stream".to_string(),
            text_content_type: "text/plain".to_string(),
        }
    }
}

impl StubDefaults {
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// A fully-resolved stub payload.
///
/// `response_time >= 0` is a fixed latency in seconds; `response_time < 0`
/// simulates a delivery rate of `|response_time|` KB/s. A set `failure_code`
/// turns the stub into a simulated transport-level failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StubResponse {
    #[serde(with = "crate::http::base64_bytes")]
    pub data: Vec<u8>,
    pub content_type: String,
    pub headers: HashMap<String, String>,
    pub return_code: u16,
    pub response_time: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_code: Option<i64>,
    /// Number of matches the stub stays active for; absent or zero means
    /// unlimited (legacy wire encoding).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_iterations: Option<u64>,
}

impl Default for StubResponse {
    fn default() -> Self {
        let defaults = StubDefaults::default();
        Self {
            data: Vec::new(),
            content_type: defaults.data_content_type.clone(),
            headers: HashMap::new(),
            return_code: defaults.return_code,
            response_time: defaults.response_time,
            failure_code: None,
            active_iterations: None,
        }
    }
}

impl StubResponse {
    /// Build from a high-level body value.
    ///
    /// Content-type precedence: explicit `content_type` argument, then a
    /// `Content-Type` key inside `headers`, then the per-kind default from
    /// `defaults`.
    pub fn from_body(
        body: ResponseBody,
        headers: Option<HashMap<String, String>>,
        content_type: Option<&str>,
        return_code: Option<u16>,
        response_time: Option<f64>,
        defaults: &StubDefaults,
    ) -> Result<Self, RegistrationError> {
        let headers = headers.unwrap_or_default();
        let header_content_type = headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case("content-type"))
            .map(|(_, v)| v.clone());

        let (data, kind_default) = match body {
            ResponseBody::Json(value) => {
                let data = serde_json::to_vec(&value).map_err(|e| {
                    RegistrationError::InvalidPayload(format!("unserializable JSON body: {e}"))
                })?;
                (data, defaults.json_content_type.clone())
            }
            ResponseBody::Bytes(data) => (data, defaults.data_content_type.clone()),
            ResponseBody::Text(text) => (text.into_bytes(), defaults.text_content_type.clone()),
        };

        let content_type = content_type
            .map(str::to_string)
            .or(header_content_type)
            .unwrap_or(kind_default);

        Ok(Self {
            data,
            content_type,
            headers,
            return_code: return_code.unwrap_or(defaults.return_code),
            response_time: response_time.unwrap_or(defaults.response_time),
            failure_code: None,
            active_iterations: None,
        })
    }

    /// Build from a bundled file, read eagerly so a missing file fails at
    /// registration time. Content type is inferred from the file extension.
    pub fn from_file(
        path: impl AsRef<Path>,
        headers: Option<HashMap<String, String>>,
        return_code: Option<u16>,
        response_time: Option<f64>,
        defaults: &StubDefaults,
    ) -> Result<Self, RegistrationError> {
        let path = path.as_ref();
        let data = std::fs::read(path).map_err(|source| RegistrationError::FileRead {
            path: path.display().to_string(),
            source,
        })?;

        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();

        Ok(Self {
            data,
            content_type: content_type_for_extension(&extension).to_string(),
            headers: headers.unwrap_or_default(),
            return_code: return_code.unwrap_or(defaults.return_code),
            response_time: response_time.unwrap_or(defaults.response_time),
            failure_code: None,
            active_iterations: None,
        })
    }

    /// A simulated transport-level failure with the given error code.
    pub fn failure(code: i64) -> Self {
        Self {
            failure_code: Some(code),
            ..Self::default()
        }
    }

    pub fn with_response_time(mut self, response_time: f64) -> Self {
        self.response_time = response_time;
        self
    }

    pub fn with_active_iterations(mut self, iterations: u64) -> Self {
        self.active_iterations = Some(iterations);
        self
    }
}

fn content_type_for_extension(extension: &str) -> &'static str {
    match extension {
        "json" => "application/json",
        "xml" => "application/xml",
        "txt" => "text/plain",
        "pdf" => "application/pdf",
        ext if ext.starts_with("htm") => "text/html",
        _ => "application/octet-stream",
    }
}
