//! Single-concurrency conversion scheduler.
//!
//! The [`Scheduler`] owns the [`JobQueue`] behind an async mutex and runs
//! at most one job at a time on a spawned task. When a job reaches a
//! terminal state the same task releases the slot and starts the next
//! pending job; when nothing is left the batch ends, the effect policy
//! resets and [`QueueEvent::QueueIdle`] is broadcast. A job task that
//! panics is failed and its slot released by a watcher task.
//!
//! The queue lock is never held across a network call.

use std::sync::Arc;

use kenburns_client::{ConversionError, SubmitOutcome, SubmitRequest};
use kenburns_core::job::{Job, JobStatus, SourceFile};
use kenburns_core::naming::artifact_filename;
use kenburns_core::params::progress_percent;
use kenburns_core::queue::{AdmissionResult, JobQueue, JobSelection};
use kenburns_core::types::JobId;
use tokio::sync::{broadcast, watch, Mutex};
use tokio_util::sync::CancellationToken;

use crate::events::QueueEvent;
use crate::poller::{PollStep, PollerConfig, ProgressPoller};
use crate::ports::{Artifact, CompletionSink, ConversionPort};

/// Capacity of the event broadcast channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Error recorded on a job whose task panicked.
pub const TASK_ABORTED: &str = "Conversion task aborted";

/// Whether the scheduler is running a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerPhase {
    Idle,
    Busy(JobId),
}

impl SchedulerPhase {
    pub fn is_idle(self) -> bool {
        matches!(self, SchedulerPhase::Idle)
    }
}

struct State {
    queue: JobQueue,
    phase: SchedulerPhase,
}

struct Inner<P, C> {
    state: Mutex<State>,
    port: P,
    sink: C,
    config: PollerConfig,
    events: broadcast::Sender<QueueEvent>,
    phase_tx: watch::Sender<SchedulerPhase>,
    cancel: CancellationToken,
}

/// Drives queued jobs through a [`ConversionPort`] one at a time.
///
/// Cheap to clone; clones share the same queue.
pub struct Scheduler<P, C> {
    inner: Arc<Inner<P, C>>,
}

impl<P, C> Clone for Scheduler<P, C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<P: ConversionPort, C: CompletionSink> Scheduler<P, C> {
    pub fn new(queue: JobQueue, port: P, sink: C, config: PollerConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (phase_tx, _) = watch::channel(SchedulerPhase::Idle);
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State {
                    queue,
                    phase: SchedulerPhase::Idle,
                }),
                port,
                sink,
                config,
                events,
                phase_tx,
                cancel: CancellationToken::new(),
            }),
        }
    }

    /// Subscribe to queue events.
    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.inner.events.subscribe()
    }

    /// Admit `files` as pending jobs and start one if the scheduler is idle.
    ///
    /// Effect randomization is decided here, before any job is dequeued.
    pub async fn enqueue(&self, files: Vec<SourceFile>, selection: &JobSelection) -> AdmissionResult {
        let result = {
            let mut state = self.inner.state.lock().await;
            let result = state.queue.enqueue(files, selection);

            for id in &result.job_ids {
                if let Some(job) = state.queue.get(*id) {
                    self.inner.emit(QueueEvent::JobQueued {
                        job_id: job.id,
                        file: job.source.name.clone(),
                    });
                }
            }
            if result.randomized {
                tracing::info!("Multiple images queued, effects will be randomized");
                self.inner.emit(QueueEvent::EffectsRandomized);
            }
            if result.rejected_by_type > 0 {
                tracing::warn!(count = result.rejected_by_type, "Skipped non-image files");
            }
            if result.rejected_by_capacity > 0 {
                tracing::warn!(
                    count = result.rejected_by_capacity,
                    capacity = state.queue.capacity(),
                    "Queue is full, files skipped",
                );
            }
            tracing::info!(
                admitted = result.admitted,
                queued = state.queue.active_count(),
                "Files added to queue",
            );
            result
        };

        self.try_start_next().await;
        result
    }

    /// Start the earliest pending job unless one is already processing.
    pub async fn try_start_next(&self) {
        let next = {
            let mut state = self.inner.state.lock().await;
            self.inner.advance(&mut state, false)
        };
        if let Some(job) = next {
            spawn_job(Arc::clone(&self.inner), job);
        }
    }

    /// Resolve once the scheduler is idle.
    pub async fn wait_idle(&self) {
        let mut rx = self.inner.phase_tx.subscribe();
        // The sender lives in `inner`, so the channel cannot close here.
        let _ = rx.wait_for(|phase| phase.is_idle()).await;
    }

    pub fn phase(&self) -> SchedulerPhase {
        *self.inner.phase_tx.borrow()
    }

    /// Copy of every job in the queue, in insertion order.
    pub async fn snapshot(&self) -> Vec<Job> {
        self.inner.state.lock().await.queue.jobs().to_vec()
    }

    pub async fn job(&self, id: JobId) -> Option<Job> {
        self.inner.state.lock().await.queue.get(id).cloned()
    }

    /// Remove finished jobs, freeing their queue slots.
    pub async fn take_finished(&self) -> Vec<Job> {
        self.inner.state.lock().await.queue.take_finished()
    }

    pub async fn is_randomizing(&self) -> bool {
        self.inner.state.lock().await.queue.is_randomizing()
    }

    /// Abort the running job and stop dequeuing.
    ///
    /// The in-flight job ends in error with message `Cancelled`; pending
    /// jobs stay pending. Resolves once the scheduler is idle.
    pub async fn shutdown(&self) {
        tracing::info!("Shutting down conversion scheduler");
        self.inner.cancel.cancel();
        self.wait_idle().await;
    }
}

impl<P: ConversionPort, C: CompletionSink> Inner<P, C> {
    fn emit(&self, event: QueueEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn set_phase(&self, state: &mut State, phase: SchedulerPhase) {
        state.phase = phase;
        self.phase_tx.send_replace(phase);
    }

    /// Pick the next job to run, updating the phase.
    ///
    /// `released` is `true` when a job just left the processing slot; only
    /// then does running out of work count as the end of a batch.
    fn advance(&self, state: &mut State, released: bool) -> Option<Job> {
        if !state.phase.is_idle() {
            return None;
        }

        if !self.cancel.is_cancelled() {
            if let Some(job) = state.queue.start_next() {
                let job = job.clone();
                tracing::info!(
                    job_id = job.id,
                    file = %job.source.name,
                    effect = %job.label,
                    duration = job.duration,
                    stage = job.stage,
                    "Conversion started",
                );
                self.emit(QueueEvent::JobStarted {
                    job_id: job.id,
                    effect_id: job.effect_id.clone(),
                    label: job.label.clone(),
                    duration: job.duration,
                    stage: job.stage,
                });
                self.set_phase(state, SchedulerPhase::Busy(job.id));
                return Some(job);
            }
        }

        if released {
            if state.queue.finish_batch_if_drained() {
                tracing::info!("All conversions finished");
            }
            self.emit(QueueEvent::QueueIdle);
        }
        self.set_phase(state, SchedulerPhase::Idle);
        None
    }

    /// Free the processing slot and start whatever comes next.
    async fn release(self: &Arc<Self>, job_id: JobId) {
        let next = {
            let mut state = self.state.lock().await;
            if state.phase == SchedulerPhase::Busy(job_id) {
                state.phase = SchedulerPhase::Idle;
            }
            self.advance(&mut state, true)
        };
        if let Some(job) = next {
            spawn_job(Arc::clone(self), job);
        }
    }

    /// Settle a job whose task ended before releasing the slot.
    ///
    /// A job still processing is failed with [`TASK_ABORTED`]; the slot is
    /// released either way so the rest of the batch keeps going.
    async fn recover(self: &Arc<Self>, job_id: JobId) {
        {
            let mut state = self.state.lock().await;
            let processing = state
                .queue
                .get(job_id)
                .is_some_and(|job| job.status == JobStatus::Processing);
            if processing {
                match state.queue.fail(job_id, TASK_ABORTED) {
                    Ok(_) => self.emit(QueueEvent::JobFailed {
                        job_id,
                        error: TASK_ABORTED.to_string(),
                    }),
                    Err(e) => {
                        tracing::error!(job_id, error = %e, "Failed to mark job failed");
                    }
                }
            }
        }
        self.release(job_id).await;
    }

    /// Submit the job and, for deferred conversions, poll until terminal.
    async fn execute(&self, job: &Job, cancel: &CancellationToken) -> Result<Artifact, String> {
        let request = SubmitRequest::from_job(job);
        let submitted = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ConversionError::Cancelled),
            r = self.port.submit(&request) => r,
        };

        let handle = match submitted.map_err(|e| e.to_string())? {
            SubmitOutcome::Immediate(bytes) => {
                return Ok(Artifact::Inline {
                    filename: artifact_filename(&job.effect_id),
                    bytes,
                });
            }
            SubmitOutcome::Deferred(handle) => handle,
        };

        {
            let mut state = self.state.lock().await;
            if let Err(e) = state.queue.attach_handle(job.id, handle.clone()) {
                tracing::error!(job_id = job.id, error = %e, "Failed to record remote handle");
            }
        }
        tracing::info!(job_id = job.id, handle = %handle, "Conversion queued remotely");
        self.emit(QueueEvent::JobDeferred {
            job_id: job.id,
            remote_handle: handle.clone(),
        });

        let mut poller = ProgressPoller::new(handle.clone(), &self.config, cancel.child_token());
        loop {
            match poller.tick(&self.port).await {
                PollStep::Progress(fraction) => {
                    let mut state = self.state.lock().await;
                    if let Err(e) = state.queue.record_progress(job.id, fraction) {
                        tracing::error!(job_id = job.id, error = %e, "Failed to record progress");
                    }
                    self.emit(QueueEvent::JobProgress {
                        job_id: job.id,
                        percent: progress_percent(fraction),
                    });
                }
                PollStep::Done => {
                    return Ok(Artifact::Remote {
                        handle,
                        filename: artifact_filename(&job.effect_id),
                    });
                }
                PollStep::Failed(message) => return Err(message),
            }
        }
    }
}

/// Run `job` on its own task, watched so a panic cannot hold the slot.
fn spawn_job<P: ConversionPort, C: CompletionSink>(inner: Arc<Inner<P, C>>, job: Job) {
    let job_id = job.id;
    let handle = tokio::spawn(run_job(Arc::clone(&inner), job));
    tokio::spawn(async move {
        if let Err(e) = handle.await {
            tracing::error!(job_id, error = %e, "Conversion task aborted");
            inner.recover(job_id).await;
        }
    });
}

/// Run one job to a terminal state, deliver its artifact, then advance.
async fn run_job<P: ConversionPort, C: CompletionSink>(inner: Arc<Inner<P, C>>, job: Job) {
    let cancel = inner.cancel.child_token();
    let outcome = inner.execute(&job, &cancel).await;

    match outcome {
        Ok(artifact) => {
            let completed = {
                let mut state = inner.state.lock().await;
                match state.queue.complete(job.id) {
                    Ok(job) => Some(job.clone()),
                    Err(e) => {
                        tracing::error!(job_id = job.id, error = %e, "Failed to mark job done");
                        None
                    }
                }
            };

            if let Some(completed) = completed {
                tracing::info!(
                    job_id = completed.id,
                    filename = %artifact.filename(),
                    "Conversion complete",
                );
                inner.emit(QueueEvent::JobCompleted {
                    job_id: completed.id,
                    filename: artifact.filename().to_string(),
                });
                if let Err(e) = inner.sink.deliver(&completed, artifact).await {
                    tracing::warn!(job_id = completed.id, error = %e, "Artifact delivery failed");
                    inner.emit(QueueEvent::DeliveryFailed {
                        job_id: completed.id,
                        error: e.to_string(),
                    });
                }
            }
        }
        Err(message) => {
            {
                let mut state = inner.state.lock().await;
                if let Err(e) = state.queue.fail(job.id, message.clone()) {
                    tracing::error!(job_id = job.id, error = %e, "Failed to mark job failed");
                }
            }
            tracing::error!(job_id = job.id, error = %message, "Conversion failed");
            inner.emit(QueueEvent::JobFailed {
                job_id: job.id,
                error: message,
            });
        }
    }

    inner.release(job.id).await;
}
