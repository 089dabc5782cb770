//! Progress polling for deferred conversions.
//!
//! One [`ProgressPoller`] exists per remote handle. Each call to
//! [`ProgressPoller::tick`] waits for the next interval (the first tick
//! fires immediately), issues one progress request with bounded retry on
//! transport failures, and reports the resulting [`PollStep`]. Once a
//! terminal step is reported the poller stops issuing requests.

use std::time::Duration;

use kenburns_client::retry::{with_retry, RetryConfig};
use kenburns_client::{ConversionError, RemoteStatus};
use tokio::time::{Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::ports::ConversionPort;

/// Default delay between progress requests.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Polling cadence and transport retry policy.
#[derive(Debug, Clone)]
pub struct PollerConfig {
    pub interval: Duration,
    pub retry: RetryConfig,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            retry: RetryConfig::default(),
        }
    }
}

/// Result of one poll.
#[derive(Debug, Clone, PartialEq)]
pub enum PollStep {
    /// Still running; carries the progress fraction in `[0, 1]`.
    Progress(f64),
    /// The remote job finished; the artifact can be downloaded.
    Done,
    /// The remote job failed, could not be reached, or polling was cancelled.
    Failed(String),
}

/// Polling state machine for one remote handle.
pub struct ProgressPoller {
    handle: String,
    ticker: Interval,
    retry: RetryConfig,
    cancel: CancellationToken,
    finished: Option<PollStep>,
    polls: u32,
}

impl ProgressPoller {
    /// Create a poller for `handle`. Must be called inside a Tokio runtime.
    pub fn new(handle: impl Into<String>, config: &PollerConfig, cancel: CancellationToken) -> Self {
        // `interval` rejects a zero period.
        let period = config.interval.max(Duration::from_millis(1));
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        Self {
            handle: handle.into(),
            ticker,
            retry: config.retry.clone(),
            cancel,
            finished: None,
            polls: 0,
        }
    }

    /// Wait for the next interval and poll once.
    ///
    /// After a terminal step, returns that step again without contacting
    /// the service.
    pub async fn tick<P: ConversionPort>(&mut self, port: &P) -> PollStep {
        if let Some(step) = &self.finished {
            return step.clone();
        }

        let cancelled = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => true,
            _ = self.ticker.tick() => false,
        };
        if cancelled {
            return self.finish(PollStep::Failed(ConversionError::Cancelled.to_string()));
        }

        self.polls += 1;
        let handle = self.handle.as_str();
        let result = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(ConversionError::Cancelled),
            r = with_retry(&self.retry, || port.progress(handle)) => r,
        };

        let step = match result {
            Ok(report) => match report.status {
                RemoteStatus::Pending => {
                    tracing::debug!(
                        handle = %self.handle,
                        progress = report.progress,
                        poll = self.polls,
                        "Conversion in progress",
                    );
                    return PollStep::Progress(report.progress);
                }
                RemoteStatus::Done => PollStep::Done,
                RemoteStatus::Error => PollStep::Failed(report.error_message()),
            },
            Err(e) => {
                tracing::warn!(handle = %self.handle, error = %e, "Progress polling failed");
                PollStep::Failed(e.to_string())
            }
        };
        self.finish(step)
    }

    fn finish(&mut self, step: PollStep) -> PollStep {
        self.finished = Some(step.clone());
        step
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    use assert_matches::assert_matches;
    use kenburns_client::{ProgressReport, SubmitOutcome, SubmitRequest};

    use super::*;

    struct Scripted {
        reports: Mutex<VecDeque<Result<ProgressReport, ConversionError>>>,
        calls: AtomicU32,
    }

    impl Scripted {
        fn new(reports: Vec<Result<ProgressReport, ConversionError>>) -> Self {
            Self {
                reports: Mutex::new(reports.into()),
                calls: AtomicU32::new(0),
            }
        }
    }

    impl ConversionPort for Scripted {
        async fn submit(&self, _request: &SubmitRequest) -> Result<SubmitOutcome, ConversionError> {
            unreachable!("poller never submits")
        }

        async fn progress(&self, _handle: &str) -> Result<ProgressReport, ConversionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.reports
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(report(RemoteStatus::Done, 1.0, None)))
        }
    }

    fn report(status: RemoteStatus, progress: f64, error: Option<&str>) -> ProgressReport {
        ProgressReport {
            status,
            progress,
            error: error.map(str::to_string),
        }
    }

    fn fast() -> PollerConfig {
        PollerConfig {
            interval: Duration::from_millis(2),
            retry: RetryConfig {
                initial_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(1),
                ..Default::default()
            },
        }
    }

    #[tokio::test]
    async fn pending_then_done() {
        let port = Scripted::new(vec![
            Ok(report(RemoteStatus::Pending, 0.4, None)),
            Ok(report(RemoteStatus::Done, 1.0, None)),
        ]);
        let mut poller = ProgressPoller::new("abc", &fast(), CancellationToken::new());

        assert_eq!(poller.tick(&port).await, PollStep::Progress(0.4));
        assert_eq!(poller.tick(&port).await, PollStep::Done);
        assert_eq!(port.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn terminal_step_stops_requests() {
        let port = Scripted::new(vec![Ok(report(RemoteStatus::Done, 1.0, None))]);
        let mut poller = ProgressPoller::new("abc", &fast(), CancellationToken::new());

        assert_eq!(poller.tick(&port).await, PollStep::Done);
        assert_eq!(poller.tick(&port).await, PollStep::Done);
        assert_eq!(port.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn remote_error_uses_server_message() {
        let port = Scripted::new(vec![Ok(report(
            RemoteStatus::Error,
            0.2,
            Some("ffmpeg exited with code 1"),
        ))]);
        let mut poller = ProgressPoller::new("abc", &fast(), CancellationToken::new());

        assert_eq!(
            poller.tick(&port).await,
            PollStep::Failed("ffmpeg exited with code 1".into())
        );
    }

    #[tokio::test]
    async fn transport_errors_retried_then_fail() {
        let port = Scripted::new(vec![
            Err(ConversionError::Transport("reset".into())),
            Err(ConversionError::Transport("reset".into())),
            Err(ConversionError::Transport("reset".into())),
        ]);
        let mut poller = ProgressPoller::new("abc", &fast(), CancellationToken::new());

        let step = poller.tick(&port).await;
        assert_matches!(step, PollStep::Failed(msg) if msg.contains("reset"));
        assert_eq!(port.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn transient_error_recovers_within_one_tick() {
        let port = Scripted::new(vec![
            Err(ConversionError::Transport("reset".into())),
            Ok(report(RemoteStatus::Pending, 0.5, None)),
        ]);
        let mut poller = ProgressPoller::new("abc", &fast(), CancellationToken::new());

        assert_eq!(poller.tick(&port).await, PollStep::Progress(0.5));
        assert_eq!(port.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn cancelled_poller_fails_without_request() {
        let port = Scripted::new(vec![]);
        let cancel = CancellationToken::new();
        let mut poller = ProgressPoller::new("abc", &fast(), cancel.clone());
        cancel.cancel();

        assert_eq!(poller.tick(&port).await, PollStep::Failed("Cancelled".into()));
        assert_eq!(port.calls.load(Ordering::SeqCst), 0);
    }
}
