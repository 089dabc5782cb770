//! Bounded, insertion-ordered conversion queue.
//!
//! Jobs are appended at enqueue time and never reordered; the only
//! mutations afterwards are status changes driven by the scheduler.
//! The queue also owns the [`EffectPolicy`], since the randomization
//! threshold is evaluated against the queue's active-job count.

use serde::Serialize;

use crate::effects::{Effect, EffectPolicy};
use crate::error::CoreError;
use crate::job::{Job, JobStatus, SourceFile};
use crate::params::{normalize_duration, normalize_stage};
use crate::types::JobId;

/// Maximum number of jobs a queue holds at once.
pub const MAX_CAPACITY: usize = 20;

/// User-chosen parameters applied to every file of one enqueue call.
#[derive(Debug, Clone)]
pub struct JobSelection {
    pub effect: Effect,
    pub duration: f64,
    pub stage: u8,
}

/// Outcome of an enqueue call, for caller-facing feedback.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AdmissionResult {
    pub admitted: usize,
    /// Inputs that were not recognized as images.
    pub rejected_by_type: usize,
    /// Images dropped because the queue was full.
    pub rejected_by_capacity: usize,
    /// `true` when this call switched the batch to random effects.
    pub randomized: bool,
    pub job_ids: Vec<JobId>,
}

impl AdmissionResult {
    pub fn rejected(&self) -> usize {
        self.rejected_by_type + self.rejected_by_capacity
    }
}

/// Ordered holder of [`Job`]s with bounded capacity.
#[derive(Debug)]
pub struct JobQueue {
    jobs: Vec<Job>,
    capacity: usize,
    next_id: JobId,
    policy: EffectPolicy,
}

impl JobQueue {
    pub fn new(policy: EffectPolicy) -> Self {
        Self::with_capacity(policy, MAX_CAPACITY)
    }

    pub fn with_capacity(policy: EffectPolicy, capacity: usize) -> Self {
        Self {
            jobs: Vec::new(),
            capacity,
            next_id: 1,
            policy,
        }
    }

    // ---- admission ----

    /// Admit image files as pending jobs carrying the explicit selection.
    ///
    /// Duration and stage are normalized first: unusable durations become
    /// 5 s (longer ones are capped at 60 s) and stages outside 1-3 become 1.
    ///
    /// Non-images are counted in `rejected_by_type`; images beyond the
    /// remaining capacity are counted in `rejected_by_capacity`. Both leave
    /// the queue untouched.
    pub fn enqueue(&mut self, files: Vec<SourceFile>, selection: &JobSelection) -> AdmissionResult {
        let total = files.len();
        let images: Vec<SourceFile> = files.into_iter().filter(SourceFile::is_image).collect();

        let mut result = AdmissionResult {
            rejected_by_type: total - images.len(),
            ..Default::default()
        };

        let available = self.remaining_capacity();
        result.rejected_by_capacity = images.len().saturating_sub(available);

        for source in images.into_iter().take(available) {
            let id = self.next_id;
            self.next_id += 1;
            self.jobs.push(Job::new(
                id,
                source,
                &selection.effect,
                normalize_duration(selection.duration),
                normalize_stage(selection.stage),
            ));
            result.job_ids.push(id);
        }
        result.admitted = result.job_ids.len();

        if result.admitted > 0 {
            result.randomized = self.policy.observe_enqueue(self.active_count());
        }

        result
    }

    // ---- scheduling ----

    /// Start the earliest pending job.
    ///
    /// Returns `None` when a job is already processing or nothing is
    /// pending. The effect re-roll happens here, not at enqueue time.
    pub fn start_next(&mut self) -> Option<&Job> {
        if self.processing().is_some() {
            return None;
        }
        let index = self
            .jobs
            .iter()
            .position(|j| j.status == JobStatus::Pending)?;

        let job = &mut self.jobs[index];
        // Pending -> Processing is always valid here.
        job.start().ok()?;
        self.policy.assign_on_dequeue(job);
        Some(&self.jobs[index])
    }

    /// The job currently being processed, if any.
    pub fn processing(&self) -> Option<&Job> {
        self.jobs
            .iter()
            .find(|j| j.status == JobStatus::Processing)
    }

    /// Store the Conversion Service's handle on a processing job.
    pub fn attach_handle(&mut self, id: JobId, handle: impl Into<String>) -> Result<(), CoreError> {
        let job = self.processing_mut(id)?;
        job.remote_handle = Some(handle.into());
        Ok(())
    }

    /// Record the latest progress fraction of a processing job.
    pub fn record_progress(&mut self, id: JobId, fraction: f64) -> Result<(), CoreError> {
        let job = self.processing_mut(id)?;
        if fraction.is_finite() {
            job.progress = fraction.clamp(0.0, 1.0);
        }
        Ok(())
    }

    pub fn complete(&mut self, id: JobId) -> Result<&Job, CoreError> {
        let job = self.get_mut(id)?;
        job.complete()?;
        Ok(job)
    }

    pub fn fail(&mut self, id: JobId, message: impl Into<String>) -> Result<&Job, CoreError> {
        let job = self.get_mut(id)?;
        job.fail(message)?;
        Ok(job)
    }

    /// End the batch if nothing is pending or processing.
    ///
    /// Resets the effect policy and returns `true` when drained.
    pub fn finish_batch_if_drained(&mut self) -> bool {
        if !self.is_drained() {
            return false;
        }
        self.policy.reset();
        true
    }

    /// Remove and return every terminal job, keeping the order of the rest.
    pub fn take_finished(&mut self) -> Vec<Job> {
        let (active, finished): (Vec<Job>, Vec<Job>) =
            std::mem::take(&mut self.jobs).into_iter().partition(Job::is_active);
        self.jobs = active;
        finished
    }

    // ---- inspection ----

    pub fn get(&self, id: JobId) -> Option<&Job> {
        self.jobs.iter().find(|j| j.id == id)
    }

    pub fn jobs(&self) -> &[Job] {
        &self.jobs
    }

    /// Number of pending or processing jobs.
    pub fn active_count(&self) -> usize {
        self.jobs.iter().filter(|j| j.is_active()).count()
    }

    pub fn is_drained(&self) -> bool {
        self.active_count() == 0
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn remaining_capacity(&self) -> usize {
        self.capacity.saturating_sub(self.jobs.len())
    }

    pub fn is_randomizing(&self) -> bool {
        self.policy.is_randomizing()
    }

    // ---- private helpers ----

    fn get_mut(&mut self, id: JobId) -> Result<&mut Job, CoreError> {
        self.jobs
            .iter_mut()
            .find(|j| j.id == id)
            .ok_or(CoreError::NotFound(id))
    }

    fn processing_mut(&mut self, id: JobId) -> Result<&mut Job, CoreError> {
        let job = self.get_mut(id)?;
        if job.status != JobStatus::Processing {
            return Err(CoreError::Conflict(format!(
                "Job {id} is {} and not processing",
                job.status
            )));
        }
        Ok(job)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
