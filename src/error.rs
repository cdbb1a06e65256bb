//! Error types for the export lifecycle.
//!
//! `ServiceError` covers a single call to the remote export service.
//! `ExportError` is what a caller of [`crate::orchestrator::ExportOrchestrator`]
//! sees: exactly one of submission failure, timeout, cancellation, abort or
//! fetch failure.

use crate::job::JobState;
use std::time::Duration;
use thiserror::Error;

/// Failure of one request to the remote export service.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Transport-level failure (DNS, connect, TLS, request timeout).
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The service answered with a non-success status code.
    #[error("export service returned HTTP {status}: {message}")]
    Http {
        status: u16,
        message: String,
        /// `Retry-After` sent along with the error response, if any.
        retry_after: Option<Duration>,
    },

    /// The response body did not match the expected shape.
    #[error("unexpected response body: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("invalid service URL: {0}")]
    InvalidUrl(String),
}

impl ServiceError {
    /// Returns true if the same request may succeed when repeated later.
    ///
    /// Timeouts, connection failures, throttling (429) and server-side
    /// errors (5xx) are transient. Auth failures, missing jobs and malformed
    /// bodies are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            ServiceError::Network(e) => e.is_timeout() || e.is_connect(),
            ServiceError::Http { status, .. } => *status == 429 || (500..600).contains(status),
            ServiceError::Decode(_) | ServiceError::InvalidUrl(_) => false,
        }
    }

    /// Server-suggested delay attached to an error response.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            ServiceError::Http { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

/// Failure to turn a finished job into an [`crate::job::Artifact`].
#[derive(Debug, Error)]
pub enum FetchError {
    /// Fetch was attempted on a job that has not succeeded.
    #[error("cannot fetch artifact for job {job_id} in state {state}")]
    InvalidState { job_id: String, state: JobState },

    #[error("failed to download artifact for job {job_id}: {source}")]
    Service {
        job_id: String,
        #[source]
        source: ServiceError,
    },
}

/// Why an orchestration gave up without an artifact.
#[derive(Debug, Error)]
pub enum AbortReason {
    /// The job failed and the service gave no hint that retrying would help.
    #[error("export job failed permanently")]
    JobFailed,

    /// Every attempt failed with a retry hint.
    #[error("retry budget exhausted")]
    RetriesExhausted,

    /// Job status could not be read.
    #[error("job status unavailable: {0}")]
    StatusUnavailable(#[source] ServiceError),
}

/// Outcome of a failed orchestration.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("failed to submit export job: {0}")]
    Submission(#[source] ServiceError),

    #[error("export job did not finish within {elapsed:?} (attempt {attempt})")]
    Timeout { attempt: u32, elapsed: Duration },

    #[error("export cancelled")]
    Cancelled,

    #[error("export aborted after {attempts} attempt(s): {reason}")]
    Aborted { attempts: u32, reason: AbortReason },

    #[error(transparent)]
    Fetch(#[from] FetchError),
}

impl ExportError {
    /// Short label used in logs and telemetry.
    pub fn kind(&self) -> &'static str {
        match self {
            ExportError::Submission(_) => "submission_error",
            ExportError::Timeout { .. } => "timeout",
            ExportError::Cancelled => "cancelled",
            ExportError::Aborted { .. } => "aborted",
            ExportError::Fetch(_) => "fetch_error",
        }
    }
}

/// Invalid value in [`crate::config::ExportConfig`].
#[derive(Debug, Error)]
#[error("invalid configuration for {key}: {message}")]
pub struct ConfigError {
    pub key: &'static str,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn http(status: u16) -> ServiceError {
        ServiceError::Http {
            status,
            message: String::new(),
            retry_after: None,
        }
    }

    #[test]
    fn test_http_retryability() {
        assert!(http(429).is_retryable());
        assert!(http(503).is_retryable());
        assert!(!http(401).is_retryable());
        assert!(!http(404).is_retryable());
    }

    #[test]
    fn test_retry_after_only_on_http() {
        let err = ServiceError::Http {
            status: 429,
            message: "slow down".to_string(),
            retry_after: Some(Duration::from_secs(7)),
        };
        assert_eq!(err.retry_after(), Some(Duration::from_secs(7)));
        assert_eq!(ServiceError::InvalidUrl("x".to_string()).retry_after(), None);
    }

    #[test]
    fn test_abort_message_includes_reason() {
        let err = ExportError::Aborted {
            attempts: 3,
            reason: AbortReason::RetriesExhausted,
        };
        assert_eq!(
            err.to_string(),
            "export aborted after 3 attempt(s): retry budget exhausted"
        );
        assert_eq!(err.kind(), "aborted");
    }
}
