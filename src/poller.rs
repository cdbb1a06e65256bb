//! Status polling for a submitted export job.
//!
//! The wait between two status queries comes from the service's
//! `Retry-After` hint when present, and from a configured fallback interval
//! otherwise. Either way it is never shorter than [`MIN_POLL_INTERVAL`].
//! The loop ends on a terminal job state, when the timeout budget is spent,
//! on cancellation, or on a status error that cannot be retried.

use crate::clock::Clock;
use crate::error::ServiceError;
use crate::job::{JobHandle, JobStatus};
use crate::service::ExportService;
use crate::telemetry::{ProgressObserver, TracingProgressObserver};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Shortest wait between two status queries, whatever the hint says.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// How a polling loop ended.
#[derive(Debug)]
pub enum PollOutcome {
    /// The job reached `Succeeded` or `Failed`.
    Finished(JobStatus),
    /// The timeout budget ran out first.
    TimedOut { elapsed: Duration },
    Cancelled,
    /// A status query failed in a way that retrying cannot fix.
    QueryFailed(ServiceError),
}

/// Repeatedly queries job status until the job is done.
#[derive(Clone)]
pub struct JobPoller {
    service: Arc<dyn ExportService>,
    clock: Arc<dyn Clock>,
    fallback_interval: Duration,
    observer: Arc<dyn ProgressObserver>,
}

impl JobPoller {
    pub fn new(
        service: Arc<dyn ExportService>,
        clock: Arc<dyn Clock>,
        fallback_interval: Duration,
    ) -> Self {
        Self {
            service,
            clock,
            fallback_interval,
            observer: Arc::new(TracingProgressObserver),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn ProgressObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Polls `handle` until it reaches a terminal state.
    ///
    /// Never runs longer than `timeout` as measured by the clock: status
    /// queries and waits are both cut short when the budget runs out or
    /// `cancel` fires.
    pub async fn poll(
        &self,
        handle: &JobHandle,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> PollOutcome {
        let started = self.clock.now();

        loop {
            let elapsed = self.clock.now().saturating_duration_since(started);
            if cancel.is_cancelled() {
                return PollOutcome::Cancelled;
            }
            if elapsed >= timeout {
                warn!(
                    "Polling timed out: job_id={}, elapsed_ms={}",
                    handle.id(),
                    elapsed.as_millis()
                );
                return PollOutcome::TimedOut { elapsed };
            }
            let remaining = timeout - elapsed;

            let response = tokio::select! {
                biased;
                _ = cancel.cancelled() => return PollOutcome::Cancelled,
                response = self.service.get_export_status(handle) => response,
                _ = self.clock.sleep(remaining) => continue,
            };

            let delay = match response {
                Ok(status) => {
                    self.observer.on_status(handle, &status);
                    if status.state.is_terminal() {
                        debug!(
                            "Export job finished: job_id={}, state={}",
                            handle.id(),
                            status.state
                        );
                        return PollOutcome::Finished(status);
                    }
                    status.retry_after.unwrap_or(self.fallback_interval)
                }
                Err(e) if e.is_retryable() => {
                    warn!(
                        "Status query failed, will retry: job_id={}, error={}",
                        handle.id(),
                        e
                    );
                    e.retry_after().unwrap_or(self.fallback_interval)
                }
                Err(e) => {
                    warn!(
                        "Status query failed permanently: job_id={}, error={}",
                        handle.id(),
                        e
                    );
                    return PollOutcome::QueryFailed(e);
                }
            };

            let elapsed = self.clock.now().saturating_duration_since(started);
            let wait = delay
                .max(MIN_POLL_INTERVAL)
                .min(timeout.saturating_sub(elapsed));
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return PollOutcome::Cancelled,
                _ = self.clock.sleep(wait) => {}
            }
        }
    }
}
