//! Queue lifecycle events.
//!
//! Emitted by the [`Scheduler`](crate::Scheduler) on a
//! [`tokio::sync::broadcast`] channel. The caller-facing layer turns them
//! into log lines, progress bars, or notifications.

use kenburns_core::types::JobId;
use serde::Serialize;

/// A state change of the conversion queue or one of its jobs.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QueueEvent {
    /// A file was admitted as a pending job.
    JobQueued { job_id: JobId, file: String },

    /// The current batch switched to random effects.
    EffectsRandomized,

    /// A job was dequeued and is being submitted.
    JobStarted {
        job_id: JobId,
        effect_id: String,
        label: String,
        duration: f64,
        stage: u8,
    },

    /// The service queued the job remotely; progress polling begins.
    JobDeferred { job_id: JobId, remote_handle: String },

    /// A progress poll reported completion percentage (0-100).
    JobProgress { job_id: JobId, percent: u8 },

    /// The job finished and its artifact is being delivered.
    JobCompleted { job_id: JobId, filename: String },

    /// The job ended in error.
    JobFailed { job_id: JobId, error: String },

    /// The job finished but handing its artifact over failed.
    DeliveryFailed { job_id: JobId, error: String },

    /// Nothing is pending or processing any more.
    QueueIdle,
}

impl QueueEvent {
    /// The job this event is about, if any.
    pub fn job_id(&self) -> Option<JobId> {
        match self {
            QueueEvent::JobQueued { job_id, .. }
            | QueueEvent::JobStarted { job_id, .. }
            | QueueEvent::JobDeferred { job_id, .. }
            | QueueEvent::JobProgress { job_id, .. }
            | QueueEvent::JobCompleted { job_id, .. }
            | QueueEvent::JobFailed { job_id, .. }
            | QueueEvent::DeliveryFailed { job_id, .. } => Some(*job_id),
            QueueEvent::EffectsRandomized | QueueEvent::QueueIdle => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_type_tag() {
        let json = serde_json::to_value(QueueEvent::JobProgress {
            job_id: 3,
            percent: 40,
        })
        .unwrap();
        assert_eq!(json["type"], "job_progress");
        assert_eq!(json["job_id"], 3);
        assert_eq!(json["percent"], 40);
    }

    #[test]
    fn unit_variants_serialize_tag_only() {
        let json = serde_json::to_value(QueueEvent::QueueIdle).unwrap();
        assert_eq!(json, serde_json::json!({ "type": "queue_idle" }));
    }

    #[test]
    fn job_id_accessor() {
        assert_eq!(
            QueueEvent::JobFailed {
                job_id: 9,
                error: "x".into()
            }
            .job_id(),
            Some(9)
        );
        assert_eq!(QueueEvent::EffectsRandomized.job_id(), None);
    }
}
