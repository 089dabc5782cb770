//! Seams between the scheduler and the outside world.
//!
//! [`ConversionPort`] submits jobs and reports progress; it is implemented
//! for the HTTP [`ConversionApi`] and by scripted fakes in tests.
//! [`CompletionSink`] receives finished artifacts (write to disk, trigger
//! a download, ...). The scheduler never performs either itself.

use std::future::Future;

use kenburns_client::{ConversionApi, ConversionError, ProgressReport, SubmitOutcome, SubmitRequest};
use kenburns_core::job::Job;

/// Submission and progress access to a Conversion Service.
pub trait ConversionPort: Send + Sync + 'static {
    /// Submit one conversion. Either branch of [`SubmitOutcome`] may come
    /// back from any deployment.
    fn submit(
        &self,
        request: &SubmitRequest,
    ) -> impl Future<Output = Result<SubmitOutcome, ConversionError>> + Send;

    /// Poll a deferred conversion.
    fn progress(
        &self,
        handle: &str,
    ) -> impl Future<Output = Result<ProgressReport, ConversionError>> + Send;
}

impl ConversionPort for ConversionApi {
    async fn submit(&self, request: &SubmitRequest) -> Result<SubmitOutcome, ConversionError> {
        ConversionApi::submit(self, request).await
    }

    async fn progress(&self, handle: &str) -> Result<ProgressReport, ConversionError> {
        ConversionApi::progress(self, handle).await
    }
}

/// A finished conversion, ready to hand over.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Artifact {
    /// The service returned the clip synchronously.
    Inline { filename: String, bytes: Vec<u8> },
    /// The clip waits on the service under `handle`.
    Remote { handle: String, filename: String },
}

impl Artifact {
    /// Suggested download name.
    pub fn filename(&self) -> &str {
        match self {
            Artifact::Inline { filename, .. } | Artifact::Remote { filename, .. } => filename,
        }
    }
}

/// Errors raised while handing an artifact over.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Download failed: {0}")]
    Download(#[from] ConversionError),
}

/// Consumer of finished artifacts.
pub trait CompletionSink: Send + Sync + 'static {
    fn deliver(
        &self,
        job: &Job,
        artifact: Artifact,
    ) -> impl Future<Output = Result<(), DeliveryError>> + Send;
}
