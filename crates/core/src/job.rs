//! Conversion jobs and their lifecycle state machine.
//!
//! A [`Job`] is one image's request to be rendered into a clip. Its
//! status only ever moves forward: `Pending -> Processing -> {Done | Error}`.
//! Terminal states reject every further transition.

use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;

use crate::effects::Effect;
use crate::error::CoreError;
use crate::types::{JobId, Timestamp};

/// Content type reported for inputs whose format cannot be detected.
pub const UNKNOWN_MIME_TYPE: &str = "application/octet-stream";

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Lifecycle status of a conversion job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Done,
    Error,
}

impl JobStatus {
    /// Statuses reachable from `self`. Terminal statuses return an empty slice.
    pub fn valid_transitions(self) -> &'static [JobStatus] {
        match self {
            JobStatus::Pending => &[JobStatus::Processing],
            JobStatus::Processing => &[JobStatus::Done, JobStatus::Error],
            JobStatus::Done | JobStatus::Error => &[],
        }
    }

    pub fn can_transition(self, to: JobStatus) -> bool {
        self.valid_transitions().contains(&to)
    }

    /// `true` for `Pending` and `Processing`.
    pub fn is_active(self) -> bool {
        matches!(self, JobStatus::Pending | JobStatus::Processing)
    }

    pub fn is_terminal(self) -> bool {
        !self.is_active()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Done => "done",
            JobStatus::Error => "error",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Source file
// ---------------------------------------------------------------------------

/// Raw input handed to the queue by the caller.
///
/// The bytes are shared, so cloning a `SourceFile` (or a [`Job`]) never
/// copies the image payload.
#[derive(Clone)]
pub struct SourceFile {
    pub name: String,
    pub mime_type: String,
    pub data: Arc<[u8]>,
}

impl SourceFile {
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            data: Arc::from(data),
        }
    }

    /// Build a source file, detecting the content type from the leading
    /// magic bytes. Falls back to the file extension, then to
    /// [`UNKNOWN_MIME_TYPE`].
    pub fn sniff(name: impl Into<String>, data: Vec<u8>) -> Self {
        let name = name.into();
        let mime_type = image::guess_format(&data)
            .or_else(|_| image::ImageFormat::from_path(&name))
            .map(|format| format.to_mime_type())
            .unwrap_or(UNKNOWN_MIME_TYPE);
        Self::new(name, mime_type, data)
    }

    pub fn is_image(&self) -> bool {
        self.mime_type.starts_with("image/")
    }
}

impl fmt::Debug for SourceFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceFile")
            .field("name", &self.name)
            .field("mime_type", &self.mime_type)
            .field("len", &self.data.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Job
// ---------------------------------------------------------------------------

/// One queued image-to-video conversion request.
#[derive(Debug, Clone, Serialize)]
pub struct Job {
    pub id: JobId,
    #[serde(skip)]
    pub source: SourceFile,
    pub status: JobStatus,
    pub effect_id: String,
    /// Display label of the effect; never used for logic.
    pub label: String,
    /// Clip length in seconds.
    pub duration: f64,
    /// Effect intensity preset, 1-3.
    pub stage: u8,
    /// Identifier assigned by the Conversion Service for deferred jobs.
    pub remote_handle: Option<String>,
    /// Last reported progress fraction (0.0-1.0).
    pub progress: f64,
    /// Failure message, set only when `status` is `Error`.
    pub error: Option<String>,
    pub created_at: Timestamp,
    pub started_at: Option<Timestamp>,
    pub finished_at: Option<Timestamp>,
}

impl Job {
    pub fn new(id: JobId, source: SourceFile, effect: &Effect, duration: f64, stage: u8) -> Self {
        Self {
            id,
            source,
            status: JobStatus::Pending,
            effect_id: effect.id.clone(),
            label: effect.label.clone(),
            duration,
            stage,
            remote_handle: None,
            progress: 0.0,
            error: None,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    /// `Pending -> Processing`.
    pub fn start(&mut self) -> Result<(), CoreError> {
        self.transition(JobStatus::Processing)?;
        self.started_at = Some(Utc::now());
        Ok(())
    }

    /// `Processing -> Done`.
    pub fn complete(&mut self) -> Result<(), CoreError> {
        self.transition(JobStatus::Done)?;
        self.progress = 1.0;
        self.finished_at = Some(Utc::now());
        Ok(())
    }

    /// `Processing -> Error`, keeping the failure message.
    pub fn fail(&mut self, message: impl Into<String>) -> Result<(), CoreError> {
        self.transition(JobStatus::Error)?;
        self.error = Some(message.into());
        self.finished_at = Some(Utc::now());
        Ok(())
    }

    /// Swap the effect, e.g. when the batch is being randomized.
    pub fn assign_effect(&mut self, effect: &Effect) {
        self.effect_id = effect.id.clone();
        self.label = effect.label.clone();
    }

    fn transition(&mut self, to: JobStatus) -> Result<(), CoreError> {
        if !self.status.can_transition(to) {
            return Err(CoreError::Conflict(format!(
                "Job {} cannot move from {} to {}",
                self.id, self.status, to
            )));
        }
        self.status = to;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    const PNG_HEADER: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];

    fn effect() -> Effect {
        Effect::new("zoom_in_center", "Zoom in (center)")
    }

    fn job() -> Job {
        Job::new(1, SourceFile::new("a.png", "image/png", vec![1, 2, 3]), &effect(), 5.0, 1)
    }

    // -- status machine -------------------------------------------------------

    #[test]
    fn terminal_statuses_have_no_transitions() {
        assert!(JobStatus::Done.valid_transitions().is_empty());
        assert!(JobStatus::Error.valid_transitions().is_empty());
    }

    #[test]
    fn pending_cannot_skip_processing() {
        assert!(!JobStatus::Pending.can_transition(JobStatus::Done));
        assert!(!JobStatus::Pending.can_transition(JobStatus::Error));
    }

    #[test]
    fn status_serializes_lowercase() {
        let json = serde_json::to_string(&JobStatus::Processing).unwrap();
        assert_eq!(json, "\"processing\"");
    }

    // -- job lifecycle --------------------------------------------------------

    #[test]
    fn new_job_is_pending_with_explicit_effect() {
        let job = job();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.effect_id, "zoom_in_center");
        assert_eq!(job.label, "Zoom in (center)");
        assert!(job.remote_handle.is_none());
    }

    #[test]
    fn happy_path_sets_timestamps() {
        let mut job = job();
        job.start().unwrap();
        assert!(job.started_at.is_some());
        job.complete().unwrap();
        assert_eq!(job.status, JobStatus::Done);
        assert_eq!(job.progress, 1.0);
        assert!(job.finished_at.is_some());
    }

    #[test]
    fn fail_keeps_message() {
        let mut job = job();
        job.start().unwrap();
        job.fail("boom").unwrap();
        assert_eq!(job.status, JobStatus::Error);
        assert_eq!(job.error.as_deref(), Some("boom"));
    }

    #[test]
    fn done_never_regresses() {
        let mut job = job();
        job.start().unwrap();
        job.complete().unwrap();

        assert_matches!(job.start(), Err(CoreError::Conflict(_)));
        assert_matches!(job.fail("late"), Err(CoreError::Conflict(_)));
        assert_eq!(job.status, JobStatus::Done);
        assert!(job.error.is_none());
    }

    #[test]
    fn error_never_regresses() {
        let mut job = job();
        job.start().unwrap();
        job.fail("first").unwrap();

        assert_matches!(job.complete(), Err(CoreError::Conflict(_)));
        assert_eq!(job.status, JobStatus::Error);
        assert_eq!(job.error.as_deref(), Some("first"));
    }

    // -- source sniffing ------------------------------------------------------

    #[test]
    fn sniff_detects_png_from_magic_bytes() {
        let file = SourceFile::sniff("upload.bin", PNG_HEADER.to_vec());
        assert_eq!(file.mime_type, "image/png");
        assert!(file.is_image());
    }

    #[test]
    fn sniff_falls_back_to_extension() {
        let file = SourceFile::sniff("photo.jpg", vec![0, 0, 0]);
        assert_eq!(file.mime_type, "image/jpeg");
    }

    #[test]
    fn sniff_rejects_text() {
        let file = SourceFile::sniff("notes.txt", b"hello world".to_vec());
        assert_eq!(file.mime_type, UNKNOWN_MIME_TYPE);
        assert!(!file.is_image());
    }

    #[test]
    fn debug_omits_payload() {
        let file = SourceFile::new("a.png", "image/png", vec![7; 64]);
        let debug = format!("{file:?}");
        assert!(debug.contains("len: 64"));
        assert!(!debug.contains("7, 7"));
    }
}
