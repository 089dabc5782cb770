//! Conversion Service wire types and parsers.
//!
//! The service answers with a handful of small JSON shapes:
//! `{"job_id": ...}` when a conversion is queued, `{"status", "progress",
//! "error"}` from the progress endpoint, and `{"detail": ...}` on errors.

use serde::Deserialize;

/// Message used when an error body carries no usable detail.
pub const UNEXPECTED_RESPONSE: &str = "Unexpected response from the conversion service";

/// Body of a successful asynchronous `POST /api/convert`.
#[derive(Debug, Clone, Deserialize)]
pub struct JobAccepted {
    /// Missing or empty means the service broke the contract.
    #[serde(default)]
    pub job_id: Option<String>,
}

/// Error body returned with non-2xx statuses.
///
/// `detail` is usually a string but validation failures may carry a
/// structured value, which is rendered as JSON text.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub detail: Option<serde_json::Value>,
}

impl ErrorBody {
    pub fn message(&self) -> String {
        match &self.detail {
            Some(serde_json::Value::String(s)) if !s.is_empty() => s.clone(),
            Some(other) if !other.is_null() && !other.is_string() => other.to_string(),
            _ => UNEXPECTED_RESPONSE.to_string(),
        }
    }
}

/// Remote job state reported by `GET /api/progress/{job_id}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemoteStatus {
    /// Still rendering. The reference service reports this as `processing`.
    #[serde(alias = "processing")]
    Pending,
    Done,
    Error,
}

/// One progress poll result.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ProgressReport {
    pub status: RemoteStatus,
    /// Completion fraction in `0.0..=1.0`.
    #[serde(default)]
    pub progress: f64,
    /// Server-provided failure description, when `status` is `error`.
    #[serde(default)]
    pub error: Option<String>,
}

impl ProgressReport {
    /// Failure message with a fallback for empty server errors.
    pub fn error_message(&self) -> String {
        match self.error.as_deref() {
            Some(msg) if !msg.trim().is_empty() => msg.to_string(),
            _ => "Conversion failed on the server".to_string(),
        }
    }
}

/// `true` for `application/json` (with or without parameters).
pub fn is_json(content_type: &str) -> bool {
    content_type.contains("application/json")
}

/// `true` for an MP4 video body.
pub fn is_mp4(content_type: &str) -> bool {
    content_type.contains("video/mp4")
}

/// Parse a progress endpoint body.
pub fn parse_progress(text: &str) -> Result<ProgressReport, serde_json::Error> {
    serde_json::from_str(text)
}

/// Extract the job id from an accepted-submission body.
///
/// Returns `None` when the body is valid JSON but carries no usable id.
pub fn parse_job_id(text: &str) -> Result<Option<String>, serde_json::Error> {
    let accepted: JobAccepted = serde_json::from_str(text)?;
    Ok(accepted.job_id.filter(|id| !id.trim().is_empty()))
}

/// Turn an error response body into a message, verbatim for plain text.
pub fn error_message(content_type: &str, body: &str) -> String {
    if is_json(content_type) {
        return serde_json::from_str::<ErrorBody>(body)
            .map(|b| b.message())
            .unwrap_or_else(|_| UNEXPECTED_RESPONSE.to_string());
    }
    body.to_string()
}
