//! Retrieval of a finished export.

use crate::error::FetchError;
use crate::job::{Artifact, JobHandle, JobState, JobStatus};
use crate::service::ExportService;
use std::sync::Arc;
use tracing::info;

/// Opens the file produced by a succeeded job.
#[derive(Clone)]
pub struct ArtifactFetcher {
    service: Arc<dyn ExportService>,
}

impl ArtifactFetcher {
    pub fn new(service: Arc<dyn ExportService>) -> Self {
        Self { service }
    }

    /// Returns the artifact of `handle`.
    ///
    /// `status` must be `Succeeded`; anything else is a caller bug and is
    /// rejected before any request is made.
    pub async fn fetch(
        &self,
        handle: &JobHandle,
        status: &JobStatus,
    ) -> Result<Artifact, FetchError> {
        if status.state != JobState::Succeeded {
            return Err(FetchError::InvalidState {
                job_id: handle.id().to_string(),
                state: status.state,
            });
        }

        let suffix = match status.file_extension.as_deref().map(str::trim) {
            Some(ext) if !ext.is_empty() => normalize_suffix(ext),
            _ => handle.format().default_suffix().to_string(),
        };

        let stream = self
            .service
            .get_exported_file(handle)
            .await
            .map_err(|source| FetchError::Service {
                job_id: handle.id().to_string(),
                source,
            })?;

        info!("Fetched export artifact: job_id={}, suffix={}", handle.id(), suffix);
        Ok(Artifact::new(stream, suffix))
    }
}

fn normalize_suffix(ext: &str) -> String {
    if ext.starts_with('.') {
        ext.to_string()
    } else {
        format!(".{}", ext)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ServiceError;
    use crate::job::{ByteStream, ExportFormat, ExportRequest};
    use crate::service::MockExportService;
    use bytes::Bytes;
    use futures::{stream, StreamExt};

    fn handle(format: ExportFormat) -> JobHandle {
        JobHandle::new("job-7", &ExportRequest::new("rpt-1", "ws-1", format))
    }

    fn file(content: &'static [u8]) -> ByteStream {
        stream::iter(vec![Ok(Bytes::from_static(content))]).boxed()
    }

    #[tokio::test]
    async fn test_fetch_uses_status_extension() {
        let mut service = MockExportService::new();
        service
            .expect_get_exported_file()
            .withf(|h| h.id() == "job-7")
            .times(1)
            .returning(|_| Ok(file(b"%PDF-1.7")));

        let fetcher = ArtifactFetcher::new(Arc::new(service));
        let status = JobStatus::new(JobState::Succeeded).with_file_extension(".pdf");

        let artifact = fetcher.fetch(&handle(ExportFormat::Pdf), &status).await.unwrap();
        assert_eq!(artifact.suffix(), ".pdf");
        assert_eq!(&artifact.into_bytes().await.unwrap()[..], b"%PDF-1.7");
    }

    #[tokio::test]
    async fn test_fetch_normalizes_and_falls_back() {
        let mut service = MockExportService::new();
        service
            .expect_get_exported_file()
            .times(2)
            .returning(|_| Ok(file(b"PK")));
        let fetcher = ArtifactFetcher::new(Arc::new(service));

        let status = JobStatus::new(JobState::Succeeded).with_file_extension("pptx");
        let artifact = fetcher.fetch(&handle(ExportFormat::Pptx), &status).await.unwrap();
        assert_eq!(artifact.suffix(), ".pptx");

        let status = JobStatus::new(JobState::Succeeded);
        let artifact = fetcher.fetch(&handle(ExportFormat::Xlsx), &status).await.unwrap();
        assert_eq!(artifact.suffix(), ".xlsx");
    }

    #[tokio::test]
    async fn test_fetch_rejects_unfinished_job() {
        let mut service = MockExportService::new();
        service.expect_get_exported_file().never();
        let fetcher = ArtifactFetcher::new(Arc::new(service));

        for state in [JobState::NotStarted, JobState::Running, JobState::Failed] {
            let err = fetcher
                .fetch(&handle(ExportFormat::Pdf), &JobStatus::new(state))
                .await
                .unwrap_err();
            assert!(matches!(err, FetchError::InvalidState { state: s, .. } if s == state));
        }
    }

    #[tokio::test]
    async fn test_fetch_download_error() {
        let mut service = MockExportService::new();
        service.expect_get_exported_file().times(1).returning(|_| {
            Err(ServiceError::Http {
                status: 410,
                message: "export expired".to_string(),
                retry_after: None,
            })
        });
        let fetcher = ArtifactFetcher::new(Arc::new(service));

        let err = fetcher
            .fetch(&handle(ExportFormat::Pdf), &JobStatus::new(JobState::Succeeded))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Service { ref job_id, .. } if job_id == "job-7"));
    }
}
