//! REST client for the Conversion Service HTTP endpoints.
//!
//! Wraps conversion submission, progress polling and artifact download
//! using [`reqwest`]. Submission has two success shapes (an MP4 body, or a
//! JSON job handle to poll); both are folded into [`SubmitOutcome`].

use std::sync::Arc;
use std::time::Duration;

use kenburns_core::job::Job;
use reqwest::multipart::{Form, Part};

use crate::messages::{self, ProgressReport};

/// Upload payload for one conversion.
#[derive(Debug, Clone)]
pub struct SubmitRequest {
    pub file_name: String,
    pub mime_type: String,
    pub data: Arc<[u8]>,
    pub duration: f64,
    pub effect_id: String,
    pub stage: u8,
}

impl SubmitRequest {
    /// Snapshot the fields of a job that the service needs.
    pub fn from_job(job: &Job) -> Self {
        Self {
            file_name: job.source.name.clone(),
            mime_type: job.source.mime_type.clone(),
            data: Arc::clone(&job.source.data),
            duration: job.duration,
            effect_id: job.effect_id.clone(),
            stage: job.stage,
        }
    }
}

/// Successful answer to `POST /api/convert`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// The service rendered synchronously and returned the MP4 bytes.
    Immediate(Vec<u8>),
    /// The service queued the render; poll this handle for progress.
    Deferred(String),
}

/// Errors from the Conversion Service client layer.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConversionError {
    /// The request never got a response (network, DNS, TLS, timeout).
    #[error("Request failed: {0}")]
    Transport(String),

    /// The response matched none of the expected shapes.
    #[error("Unexpected response: {0}")]
    Protocol(String),

    /// The service rejected the request or reported a failed render.
    /// The message is the server's text, verbatim.
    #[error("{message}")]
    Service {
        /// HTTP status, absent when the failure came from a progress report.
        status: Option<u16>,
        message: String,
    },

    /// The operation was abandoned during shutdown.
    #[error("Cancelled")]
    Cancelled,
}

impl ConversionError {
    /// Only transport failures are worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(self, ConversionError::Transport(_))
    }
}

impl From<reqwest::Error> for ConversionError {
    fn from(e: reqwest::Error) -> Self {
        ConversionError::Transport(e.to_string())
    }
}

/// HTTP client for one Conversion Service.
#[derive(Debug, Clone)]
pub struct ConversionApi {
    client: reqwest::Client,
    api_url: String,
}

impl ConversionApi {
    /// Create a new API client.
    ///
    /// * `api_url` - Base HTTP URL, e.g. `http://host:8000`.
    pub fn new(api_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), api_url)
    }

    /// Create a client whose every request is bounded by `timeout`.
    pub fn with_timeout(
        api_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ConversionError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, api_url))
    }

    /// Create an API client reusing an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client, api_url: impl Into<String>) -> Self {
        let api_url = api_url.into().trim_end_matches('/').to_string();
        Self { client, api_url }
    }

    /// Submit an image for conversion.
    ///
    /// Sends a multipart `POST /api/convert` with `file`, `duration`,
    /// `effect` and `stage`.
    pub async fn submit(&self, request: &SubmitRequest) -> Result<SubmitOutcome, ConversionError> {
        let part = Part::bytes(request.data.to_vec())
            .file_name(request.file_name.clone())
            .mime_str(&request.mime_type)
            .map_err(|e| {
                ConversionError::Protocol(format!(
                    "Invalid content type '{}': {e}",
                    request.mime_type
                ))
            })?;

        let form = Form::new()
            .part("file", part)
            .text("duration", request.duration.to_string())
            .text("effect", request.effect_id.clone())
            .text("stage", request.stage.to_string());

        tracing::debug!(
            file = %request.file_name,
            effect_id = %request.effect_id,
            duration = request.duration,
            stage = request.stage,
            "Submitting conversion",
        );

        let response = self
            .client
            .post(format!("{}/api/convert", self.api_url))
            .multipart(form)
            .send()
            .await?;

        let response = Self::ensure_success(response).await?;
        let content_type = Self::content_type(&response);
        let body = response.bytes().await?;

        classify_submit(&content_type, body.to_vec())
    }

    /// Fetch the progress of a deferred conversion.
    ///
    /// Sends a `GET /api/progress/{job_id}` request.
    pub async fn progress(&self, job_id: &str) -> Result<ProgressReport, ConversionError> {
        let response = self
            .client
            .get(format!("{}/api/progress/{}", self.api_url, job_id))
            .send()
            .await?;

        let response = Self::ensure_success(response).await?;
        let text = response.text().await?;
        messages::parse_progress(&text)
            .map_err(|e| ConversionError::Protocol(format!("Malformed progress report: {e}")))
    }

    /// Download the finished artifact of a deferred conversion.
    ///
    /// Sends a `GET /api/download/{job_id}` request.
    pub async fn download(&self, job_id: &str) -> Result<Vec<u8>, ConversionError> {
        let response = self.client.get(self.download_url(job_id)).send().await?;

        let response = Self::ensure_success(response).await?;
        Ok(response.bytes().await?.to_vec())
    }

    /// Absolute URL of a deferred job's artifact.
    pub fn download_url(&self, job_id: &str) -> String {
        format!("{}/api/download/{}", self.api_url, job_id)
    }

    // ---- private helpers ----

    /// Return the response unchanged on success, or a
    /// [`ConversionError::Service`] carrying the server's message.
    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, ConversionError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let content_type = Self::content_type(&response);
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<unreadable body>".to_string());
        let mut message = messages::error_message(&content_type, &body);
        if message.trim().is_empty() {
            message = format!("HTTP {status}");
        }

        Err(ConversionError::Service {
            status: Some(status.as_u16()),
            message,
        })
    }

    fn content_type(response: &reqwest::Response) -> String {
        response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_ascii_lowercase()
    }
}

/// Decide which success branch a `POST /api/convert` body belongs to.
pub fn classify_submit(content_type: &str, body: Vec<u8>) -> Result<SubmitOutcome, ConversionError> {
    if messages::is_json(content_type) {
        let text = String::from_utf8(body)
            .map_err(|_| ConversionError::Protocol("Response body is not UTF-8".to_string()))?;
        return match messages::parse_job_id(&text) {
            Ok(Some(job_id)) => Ok(SubmitOutcome::Deferred(job_id)),
            Ok(None) => Err(ConversionError::Protocol(
                "No job id in the conversion response".to_string(),
            )),
            Err(e) => Err(ConversionError::Protocol(format!(
                "Malformed conversion response: {e}"
            ))),
        };
    }

    if messages::is_mp4(content_type) {
        return Ok(SubmitOutcome::Immediate(body));
    }

    Err(ConversionError::Protocol(format!(
        "Unknown response format '{content_type}'"
    )))
}
