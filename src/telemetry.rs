//! Telemetry and structured logging for report exports.

use crate::job::{JobHandle, JobStatus};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use opentelemetry::trace::{Span, Tracer};
use opentelemetry::{global, KeyValue};
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

/// Receives every status snapshot read by the poll loop.
///
/// Observers must not block; they never influence polling.
pub trait ProgressObserver: Send + Sync {
    fn on_status(&self, handle: &JobHandle, status: &JobStatus);
}

/// Logs job progress through `tracing`.
pub struct TracingProgressObserver;

impl ProgressObserver for TracingProgressObserver {
    fn on_status(&self, handle: &JobHandle, status: &JobStatus) {
        debug!(
            job_id = %handle.id(),
            state = %status.state,
            percent_complete = status.percent_complete,
            retry_after_ms = status.retry_after.map(|d| d.as_millis() as u64),
            "Export job progress"
        );
    }
}

/// Summary of one orchestration, emitted once it ends.
#[derive(Debug, Clone)]
pub struct ExportReport {
    pub export_id: Uuid,
    pub document_id: String,
    pub collection_id: String,
    pub format: String,
    pub attempts: u32,
    /// `"succeeded"` or an [`crate::error::ExportError::kind`] label.
    pub outcome: &'static str,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl ExportReport {
    pub fn duration_ms(&self) -> i64 {
        self.finished_at
            .signed_duration_since(self.started_at)
            .num_milliseconds()
    }

    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Records telemetry for a finished export.
///
/// Emits one OpenTelemetry span and one structured log line carrying the
/// export id, document, format, attempt count, outcome and duration.
pub fn record_export_telemetry(report: &ExportReport) {
    let tracer = global::tracer("report-export");
    let mut span = tracer.start("report_export");

    span.set_attribute(KeyValue::new("export_id", report.export_id.to_string()));
    span.set_attribute(KeyValue::new("document_id", report.document_id.clone()));
    span.set_attribute(KeyValue::new("collection_id", report.collection_id.clone()));
    span.set_attribute(KeyValue::new("format", report.format.clone()));
    span.set_attribute(KeyValue::new("attempts", report.attempts as i64));
    span.set_attribute(KeyValue::new("outcome", report.outcome));
    span.set_attribute(KeyValue::new("duration_ms", report.duration_ms()));

    match &report.error {
        None => info!(
            export_id = %report.export_id,
            document_id = %report.document_id,
            format = %report.format,
            attempts = report.attempts,
            duration_ms = report.duration_ms(),
            "Report export completed"
        ),
        Some(error) => {
            span.set_attribute(KeyValue::new("error", error.clone()));
            warn!(
                export_id = %report.export_id,
                document_id = %report.document_id,
                attempts = report.attempts,
                outcome = report.outcome,
                error = %error,
                "Report export failed"
            );
        }
    }

    span.end();
}

/// Installs the global `tracing` subscriber.
///
/// Reads the filter from `RUST_LOG` (default: info). Fails if a subscriber
/// is already installed.
pub fn init_tracing() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .context("Failed to install tracing subscriber")
}

/// Initializes OpenTelemetry with OTLP exporter.
///
/// Must run inside a Tokio runtime. Reads configuration from environment
/// variables:
/// - `OTEL_EXPORTER_OTLP_ENDPOINT` - Collector endpoint (default: http://localhost:4317)
/// - `OTEL_SERVICE_NAME` - Service name (default: report-export)
pub fn init_telemetry() -> Result<()> {
    use opentelemetry_otlp::WithExportConfig;
    use opentelemetry_sdk::trace::Config;

    let endpoint = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT")
        .unwrap_or_else(|_| "http://localhost:4317".to_string());

    let service_name =
        std::env::var("OTEL_SERVICE_NAME").unwrap_or_else(|_| "report-export".to_string());

    let tracer = opentelemetry_otlp::new_pipeline()
        .tracing()
        .with_exporter(
            opentelemetry_otlp::new_exporter()
                .tonic()
                .with_endpoint(&endpoint),
        )
        .with_trace_config(Config::default().with_resource(
            opentelemetry_sdk::Resource::new(vec![
                KeyValue::new("service.name", service_name),
                KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
            ]),
        ))
        .install_batch(opentelemetry_sdk::runtime::Tokio)
        .context("Failed to install OTLP exporter")?;

    if let Some(provider) = tracer.provider() {
        global::set_tracer_provider(provider);
    }

    info!("Telemetry initialized: endpoint={}", endpoint);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{ExportFormat, ExportRequest, JobState};
    use std::time::Duration;

    fn report(error: Option<&str>) -> ExportReport {
        let started_at = Utc::now();
        ExportReport {
            export_id: Uuid::new_v4(),
            document_id: "rpt-1".to_string(),
            collection_id: "ws-1".to_string(),
            format: ExportFormat::Pdf.to_string(),
            attempts: 2,
            outcome: if error.is_some() { "aborted" } else { "succeeded" },
            error: error.map(str::to_string),
            started_at,
            finished_at: started_at + chrono::Duration::milliseconds(1500),
        }
    }

    #[test]
    fn test_record_export_telemetry() {
        let report = report(None);
        assert!(report.succeeded());
        assert_eq!(report.duration_ms(), 1500);

        // No provider installed: spans go to the no-op tracer
        record_export_telemetry(&report);
    }

    #[test]
    fn test_record_failed_export() {
        let report = report(Some("export job failed permanently"));
        assert!(!report.succeeded());

        record_export_telemetry(&report);
    }

    #[test]
    fn test_tracing_observer() {
        let request = ExportRequest::new("rpt-1", "ws-1", ExportFormat::Pdf);
        let handle = JobHandle::new("job-1", &request);
        let status = JobStatus::new(JobState::Running)
            .with_progress(40)
            .with_retry_after(Duration::from_secs(2));

        TracingProgressObserver.on_status(&handle, &status);
    }
}
