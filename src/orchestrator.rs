//! End-to-end export with whole-job retry.
//!
//! One orchestration walks an explicit state machine:
//!
//! ```text
//! Submitting -> Polling -> Fetching -> Done
//!                  |
//!                  +-- Failed with Retry-After --> RetryWait -> Submitting
//!                  +-- anything else ------------> Aborted
//! ```
//!
//! [`transition`] is a pure function of `(state, event)`; the
//! [`ExportOrchestrator`] performs the I/O that each state calls for and
//! feeds the result back in as the next event.

use crate::clock::{Clock, TokioClock};
use crate::config::ExportConfig;
use crate::error::{AbortReason, ExportError, FetchError, ServiceError};
use crate::fetcher::ArtifactFetcher;
use crate::job::{Artifact, ExportRequest, JobHandle, JobState, JobStatus};
use crate::poller::{JobPoller, PollOutcome};
use crate::service::{ExportService, HttpExportService};
use crate::submitter::JobSubmitter;
use crate::telemetry::{record_export_telemetry, ExportReport, ProgressObserver};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Where an orchestration currently is.
#[derive(Debug)]
pub enum ExportState {
    Submitting {
        attempt: u32,
    },
    Polling {
        attempt: u32,
        handle: JobHandle,
    },
    /// The previous job failed with a retry hint; waiting before resubmitting.
    RetryWait {
        attempt: u32,
        delay: Duration,
    },
    Fetching {
        attempt: u32,
        handle: JobHandle,
        status: JobStatus,
    },
    Done {
        attempt: u32,
        artifact: Artifact,
    },
    Aborted {
        attempt: u32,
        error: ExportError,
    },
}

impl ExportState {
    /// Number of the submission this state belongs to, starting at 1.
    pub fn attempt(&self) -> u32 {
        match self {
            ExportState::Submitting { attempt }
            | ExportState::Polling { attempt, .. }
            | ExportState::RetryWait { attempt, .. }
            | ExportState::Fetching { attempt, .. }
            | ExportState::Done { attempt, .. }
            | ExportState::Aborted { attempt, .. } => *attempt,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ExportState::Done { .. } | ExportState::Aborted { .. })
    }
}

/// Result of the work done in one state.
#[derive(Debug)]
pub enum ExportEvent {
    Submitted(JobHandle),
    SubmitFailed(ServiceError),
    Polled(PollOutcome),
    RetryWaitElapsed,
    Fetched(Artifact),
    FetchFailed(FetchError),
    /// Cancellation observed outside the poll loop.
    Cancelled,
}

/// Computes the next state.
///
/// Terminal states absorb every event. Only a `Failed` job that carries a
/// retry hint is retried, and at most `max_attempts` submissions are made.
///
/// # Panics
///
/// Panics when `event` cannot be produced by the work of `state`, such as
/// `Fetched` while `Submitting`. [`ExportOrchestrator`] never feeds such a
/// pair.
pub fn transition(state: ExportState, event: ExportEvent, max_attempts: u32) -> ExportState {
    match (state, event) {
        (state @ (ExportState::Done { .. } | ExportState::Aborted { .. }), _) => state,

        (state, ExportEvent::Cancelled) => abort(state.attempt(), ExportError::Cancelled),

        (ExportState::Submitting { attempt }, ExportEvent::Submitted(handle)) => {
            ExportState::Polling { attempt, handle }
        }
        (ExportState::Submitting { attempt }, ExportEvent::SubmitFailed(e)) => {
            abort(attempt, ExportError::Submission(e))
        }

        (ExportState::Polling { attempt, handle }, ExportEvent::Polled(outcome)) => match outcome {
            PollOutcome::Finished(status) if status.state == JobState::Succeeded => {
                ExportState::Fetching {
                    attempt,
                    handle,
                    status,
                }
            }
            PollOutcome::Finished(status) => match status.retry_after {
                Some(delay) if attempt < max_attempts => ExportState::RetryWait { attempt, delay },
                Some(_) => abort(
                    attempt,
                    ExportError::Aborted {
                        attempts: attempt,
                        reason: AbortReason::RetriesExhausted,
                    },
                ),
                None => abort(
                    attempt,
                    ExportError::Aborted {
                        attempts: attempt,
                        reason: AbortReason::JobFailed,
                    },
                ),
            },
            PollOutcome::TimedOut { elapsed } => {
                abort(attempt, ExportError::Timeout { attempt, elapsed })
            }
            PollOutcome::Cancelled => abort(attempt, ExportError::Cancelled),
            PollOutcome::QueryFailed(e) => abort(
                attempt,
                ExportError::Aborted {
                    attempts: attempt,
                    reason: AbortReason::StatusUnavailable(e),
                },
            ),
        },

        (ExportState::RetryWait { attempt, .. }, ExportEvent::RetryWaitElapsed) => {
            ExportState::Submitting {
                attempt: attempt + 1,
            }
        }

        (ExportState::Fetching { attempt, .. }, ExportEvent::Fetched(artifact)) => {
            ExportState::Done { attempt, artifact }
        }
        (ExportState::Fetching { attempt, .. }, ExportEvent::FetchFailed(e)) => {
            abort(attempt, ExportError::Fetch(e))
        }

        (state, event) => unreachable!("event {:?} cannot occur in state {:?}", event, state),
    }
}

fn abort(attempt: u32, error: ExportError) -> ExportState {
    ExportState::Aborted { attempt, error }
}

/// Runs exports: submit, poll, retry when the service asks for it, fetch.
///
/// Holds no per-export state, so one orchestrator can drive any number of
/// concurrent exports.
pub struct ExportOrchestrator {
    submitter: JobSubmitter,
    poller: JobPoller,
    fetcher: ArtifactFetcher,
    clock: Arc<dyn Clock>,
    max_attempts: u32,
    poll_timeout: Duration,
}

impl ExportOrchestrator {
    pub fn new(service: Arc<dyn ExportService>, config: &ExportConfig) -> Self {
        Self::with_clock(service, config, Arc::new(TokioClock))
    }

    pub fn with_clock(
        service: Arc<dyn ExportService>,
        config: &ExportConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            submitter: JobSubmitter::new(service.clone()),
            poller: JobPoller::new(service.clone(), clock.clone(), config.poll_interval),
            fetcher: ArtifactFetcher::new(service),
            clock,
            max_attempts: config.max_attempts.max(1),
            poll_timeout: config.poll_timeout,
        }
    }

    /// Builds an orchestrator talking HTTP to `config.service_url`.
    pub fn from_config(config: &ExportConfig) -> Result<Self, ServiceError> {
        let service = HttpExportService::new(config)?;
        Ok(Self::new(Arc::new(service), config))
    }

    pub fn with_observer(mut self, observer: Arc<dyn ProgressObserver>) -> Self {
        self.poller = self.poller.with_observer(observer);
        self
    }

    /// Configured per-attempt polling budget.
    pub fn poll_timeout(&self) -> Duration {
        self.poll_timeout
    }

    /// Exports one document.
    ///
    /// `timeout` bounds each polling loop; a retry gets a fresh budget.
    /// Returns the artifact or exactly one typed failure.
    pub async fn export(
        &self,
        request: &ExportRequest,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<Artifact, ExportError> {
        let export_id = Uuid::new_v4();
        let span = info_span!(
            "export",
            %export_id,
            document_id = %request.document_id,
            collection_id = %request.collection_id
        );
        let started_at = Utc::now();

        let (attempts, result) = self
            .run(request, timeout, cancel)
            .instrument(span.clone())
            .await;

        let report = ExportReport {
            export_id,
            document_id: request.document_id.clone(),
            collection_id: request.collection_id.clone(),
            format: request.format.to_string(),
            attempts,
            outcome: match &result {
                Ok(_) => "succeeded",
                Err(e) => e.kind(),
            },
            error: result.as_ref().err().map(|e| e.to_string()),
            started_at,
            finished_at: Utc::now(),
        };
        span.in_scope(|| record_export_telemetry(&report));

        result
    }

    async fn run(
        &self,
        request: &ExportRequest,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> (u32, Result<Artifact, ExportError>) {
        let mut state = ExportState::Submitting { attempt: 1 };

        loop {
            state = match state {
                ExportState::Done { attempt, artifact } => return (attempt, Ok(artifact)),
                ExportState::Aborted { attempt, error } => return (attempt, Err(error)),
                state => {
                    let event = self.step(&state, request, timeout, cancel).await;
                    let next = transition(state, event, self.max_attempts);
                    debug!(attempt = next.attempt(), state = ?next, "Export state changed");
                    next
                }
            };
        }
    }

    async fn step(
        &self,
        state: &ExportState,
        request: &ExportRequest,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> ExportEvent {
        match state {
            ExportState::Submitting { attempt } => {
                if cancel.is_cancelled() {
                    return ExportEvent::Cancelled;
                }
                info!(
                    "Submitting export: attempt={}/{}, format={}",
                    attempt, self.max_attempts, request.format
                );
                match self.submitter.submit(request).await {
                    Ok(handle) => ExportEvent::Submitted(handle),
                    Err(e) => ExportEvent::SubmitFailed(e),
                }
            }
            ExportState::Polling { handle, .. } => {
                ExportEvent::Polled(self.poller.poll(handle, timeout, cancel).await)
            }
            ExportState::RetryWait { attempt, delay } => {
                let wait = (*delay).min(self.poll_timeout);
                if wait < *delay {
                    warn!(
                        "Retry-After hint exceeds poll timeout, capping: hint={:?}, wait={:?}",
                        delay, wait
                    );
                }
                warn!(
                    "Export job failed, resubmitting after {:?}: attempt={}/{}",
                    wait, attempt, self.max_attempts
                );
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => ExportEvent::Cancelled,
                    _ = self.clock.sleep(wait) => ExportEvent::RetryWaitElapsed,
                }
            }
            ExportState::Fetching { handle, status, .. } => {
                match self.fetcher.fetch(handle, status).await {
                    Ok(artifact) => ExportEvent::Fetched(artifact),
                    Err(e) => ExportEvent::FetchFailed(e),
                }
            }
            ExportState::Done { .. } | ExportState::Aborted { .. } => {
                unreachable!("terminal states are handled by the run loop")
            }
        }
    }
}
