//! Export job submission.

use crate::error::ServiceError;
use crate::job::{ExportRequest, JobHandle};
use crate::service::ExportService;
use std::sync::Arc;
use tracing::{info, warn};

/// Sends export requests to the service.
///
/// Failures are returned as-is; deciding whether to try again belongs to
/// the orchestrator.
#[derive(Clone)]
pub struct JobSubmitter {
    service: Arc<dyn ExportService>,
}

impl JobSubmitter {
    pub fn new(service: Arc<dyn ExportService>) -> Self {
        Self { service }
    }

    /// Creates a server-side export job for `request`.
    pub async fn submit(&self, request: &ExportRequest) -> Result<JobHandle, ServiceError> {
        match self.service.create_export_job(request).await {
            Ok(handle) => {
                info!(
                    "Submitted export job: job_id={}, document_id={}, format={}, pages={}",
                    handle.id(),
                    request.document_id,
                    request.format,
                    request.pages.len()
                );
                Ok(handle)
            }
            Err(e) => {
                warn!(
                    "Export submission failed: document_id={}, error={}",
                    request.document_id, e
                );
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::ExportFormat;
    use crate::service::MockExportService;

    #[tokio::test]
    async fn test_submit_returns_handle() {
        let mut service = MockExportService::new();
        service
            .expect_create_export_job()
            .withf(|r| r.document_id == "rpt-1" && r.pages == vec!["ReportSection2"])
            .times(1)
            .returning(|r| Ok(JobHandle::new("job-1", r)));

        let submitter = JobSubmitter::new(Arc::new(service));
        let request =
            ExportRequest::new("rpt-1", "ws-1", ExportFormat::Pdf).with_pages(["ReportSection2"]);

        let handle = submitter.submit(&request).await.unwrap();
        assert_eq!(handle.id(), "job-1");
        assert_eq!(handle.collection_id(), "ws-1");
    }

    #[tokio::test]
    async fn test_submit_propagates_errors() {
        let mut service = MockExportService::new();
        service.expect_create_export_job().times(1).returning(|_| {
            Err(ServiceError::Http {
                status: 401,
                message: "token expired".to_string(),
                retry_after: None,
            })
        });

        let submitter = JobSubmitter::new(Arc::new(service));
        let request = ExportRequest::new("rpt-1", "ws-1", ExportFormat::Pdf);

        let err = submitter.submit(&request).await.unwrap_err();
        assert!(matches!(err, ServiceError::Http { status: 401, .. }));
    }
}
