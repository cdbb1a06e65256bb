//! Client for the remote export service.
//!
//! The service exposes three operations per document:
//!
//! - `POST {base}/groups/{collection}/reports/{document}/ExportTo` creates a job
//! - `GET  {base}/groups/{collection}/reports/{document}/exports/{id}` reads its status
//! - `GET  {base}/groups/{collection}/reports/{document}/exports/{id}/file` downloads the result
//!
//! Status responses may carry a `Retry-After` header telling the client how
//! long to wait before asking again.

use crate::config::ExportConfig;
use crate::error::ServiceError;
use crate::job::{ByteStream, ExportFormat, ExportRequest, JobHandle, JobState, JobStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::{StreamExt, TryStreamExt};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Remote operations consumed by the export lifecycle.
///
/// Implementations must be safe to share between concurrent exports.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ExportService: Send + Sync {
    /// Creates a server-side export job.
    async fn create_export_job(&self, request: &ExportRequest) -> Result<JobHandle, ServiceError>;

    /// Reads the current status of a job, including any `Retry-After` hint.
    async fn get_export_status(&self, handle: &JobHandle) -> Result<JobStatus, ServiceError>;

    /// Opens the produced file of a succeeded job.
    async fn get_exported_file(&self, handle: &JobHandle) -> Result<ByteStream, ServiceError>;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ExportBody<'a> {
    format: ExportFormat,
    #[serde(skip_serializing_if = "Option::is_none")]
    report_configuration: Option<ReportConfiguration<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ReportConfiguration<'a> {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pages: Vec<PageSelection<'a>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    report_level_filters: Vec<FilterSelection<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PageSelection<'a> {
    page_name: &'a str,
}

#[derive(Debug, Serialize)]
struct FilterSelection<'a> {
    filter: &'a str,
}

impl<'a> ExportBody<'a> {
    fn from_request(request: &'a ExportRequest) -> Self {
        let pages: Vec<_> = request
            .pages
            .iter()
            .map(|page_name| PageSelection { page_name })
            .collect();
        let report_level_filters: Vec<_> = request
            .filter
            .as_deref()
            .map(|filter| FilterSelection { filter })
            .into_iter()
            .collect();

        let report_configuration = if pages.is_empty() && report_level_filters.is_empty() {
            None
        } else {
            Some(ReportConfiguration {
                pages,
                report_level_filters,
            })
        };

        Self {
            format: request.format,
            report_configuration,
        }
    }
}

/// Job record as returned by the create and status endpoints.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExportResponse {
    id: String,
    status: JobState,
    #[serde(default)]
    percent_complete: Option<u8>,
    #[serde(default)]
    resource_file_extension: Option<String>,
}

/// HTTP implementation of [`ExportService`].
#[derive(Debug, Clone)]
pub struct HttpExportService {
    client: Client,
    base_url: Url,
    access_token: Option<String>,
    request_timeout: Duration,
}

impl HttpExportService {
    /// Builds the service with its own client.
    ///
    /// `request_timeout` bounds connecting and the create and status calls.
    /// File downloads are not bounded as a whole, so a caller may read the
    /// artifact stream at its own pace.
    pub fn new(config: &ExportConfig) -> Result<Self, ServiceError> {
        let client = Client::builder()
            .connect_timeout(config.request_timeout)
            .build()?;
        Self::with_client(client, config)
    }

    /// Builds the service around an existing client, sharing its pool.
    pub fn with_client(client: Client, config: &ExportConfig) -> Result<Self, ServiceError> {
        let base_url = Url::parse(&config.service_url)
            .map_err(|e| ServiceError::InvalidUrl(format!("{}: {}", config.service_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(ServiceError::InvalidUrl(config.service_url.clone()));
        }

        Ok(Self {
            client,
            base_url,
            access_token: config.access_token.clone(),
            request_timeout: config.request_timeout,
        })
    }

    fn report_url(
        &self,
        collection_id: &str,
        document_id: &str,
        tail: &[&str],
    ) -> Result<Url, ServiceError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ServiceError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(["groups", collection_id, "reports", document_id])
            .extend(tail);
        Ok(url)
    }

    fn job_url(&self, handle: &JobHandle, tail: &[&str]) -> Result<Url, ServiceError> {
        let mut segments = vec!["exports", handle.id()];
        segments.extend_from_slice(tail);
        self.report_url(handle.collection_id(), handle.document_id(), &segments)
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.access_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }
}

#[async_trait]
impl ExportService for HttpExportService {
    async fn create_export_job(&self, request: &ExportRequest) -> Result<JobHandle, ServiceError> {
        let url = self.report_url(&request.collection_id, &request.document_id, &["ExportTo"])?;
        let body = ExportBody::from_request(request);

        let response = self
            .authorize(self.client.post(url).json(&body))
            .timeout(self.request_timeout)
            .send()
            .await?;
        let response = ensure_success(response).await?;
        let created: ExportResponse = serde_json::from_slice(&response.bytes().await?)?;

        debug!(
            "Created export job: job_id={}, document_id={}, status={}",
            created.id, request.document_id, created.status
        );
        Ok(JobHandle::new(created.id, request))
    }

    async fn get_export_status(&self, handle: &JobHandle) -> Result<JobStatus, ServiceError> {
        let url = self.job_url(handle, &[])?;

        let response = self
            .authorize(self.client.get(url))
            .timeout(self.request_timeout)
            .send()
            .await?;
        let response = ensure_success(response).await?;
        let retry_after = retry_after_header(response.headers());
        let export: ExportResponse = serde_json::from_slice(&response.bytes().await?)?;

        let mut status = JobStatus::new(export.status);
        if let Some(percent) = export.percent_complete {
            status = status.with_progress(percent);
        }
        status.retry_after = retry_after;
        status.file_extension = export.resource_file_extension;
        Ok(status)
    }

    async fn get_exported_file(&self, handle: &JobHandle) -> Result<ByteStream, ServiceError> {
        let url = self.job_url(handle, &["file"])?;

        let response = self.authorize(self.client.get(url)).send().await?;
        let response = ensure_success(response).await?;

        Ok(response.bytes_stream().map_err(ServiceError::from).boxed())
    }
}

async fn ensure_success(response: Response) -> Result<Response, ServiceError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let retry_after = retry_after_header(response.headers());
    let message = response.text().await.unwrap_or_default();
    Err(ServiceError::Http {
        status: status.as_u16(),
        message,
        retry_after,
    })
}

fn retry_after_header(headers: &HeaderMap) -> Option<Duration> {
    let value = headers.get(RETRY_AFTER)?.to_str().ok()?;
    parse_retry_after(value, Utc::now())
}

/// Parses a `Retry-After` value.
///
/// Accepts delta-seconds (`"30"`) and HTTP-dates
/// (`"Wed, 21 Oct 2015 07:28:00 GMT"`); a date in the past yields zero.
/// Anything else is treated as absent.
pub fn parse_retry_after(value: &str, now: DateTime<Utc>) -> Option<Duration> {
    let value = value.trim();
    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }

    let at = DateTime::parse_from_rfc2822(value).ok()?.with_timezone(&Utc);
    Some((at - now).to_std().unwrap_or(Duration::ZERO))
}
