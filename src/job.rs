//! Export request, job handle, job status and artifact models.

use crate::error::ServiceError;
use bytes::{Bytes, BytesMut};
use futures::stream::BoxStream;
use futures::{StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use std::time::Duration;
use tokio::io::AsyncRead;
use tokio_util::io::StreamReader;

/// Byte stream of an exported file.
pub type ByteStream = BoxStream<'static, Result<Bytes, ServiceError>>;

/// Target file format of an export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ExportFormat {
    Pdf,
    Pptx,
    Png,
    Xlsx,
    Docx,
    Csv,
    Xml,
    Mhtml,
    Image,
    AccessiblePdf,
}

impl ExportFormat {
    /// File suffix used when the service does not report one.
    pub fn default_suffix(&self) -> &'static str {
        match self {
            ExportFormat::Pdf | ExportFormat::AccessiblePdf => ".pdf",
            ExportFormat::Pptx => ".pptx",
            ExportFormat::Png | ExportFormat::Image => ".png",
            ExportFormat::Xlsx => ".xlsx",
            ExportFormat::Docx => ".docx",
            ExportFormat::Csv => ".csv",
            ExportFormat::Xml => ".xml",
            ExportFormat::Mhtml => ".mhtml",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExportFormat::Pdf => "PDF",
            ExportFormat::Pptx => "PPTX",
            ExportFormat::Png => "PNG",
            ExportFormat::Xlsx => "XLSX",
            ExportFormat::Docx => "DOCX",
            ExportFormat::Csv => "CSV",
            ExportFormat::Xml => "XML",
            ExportFormat::Mhtml => "MHTML",
            ExportFormat::Image => "IMAGE",
            ExportFormat::AccessiblePdf => "ACCESSIBLEPDF",
        };
        f.write_str(name)
    }
}

/// Request to render one document into a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportRequest {
    pub document_id: String,
    pub collection_id: String,
    pub format: ExportFormat,
    /// Pages to include, in order. Empty means the whole document.
    pub pages: Vec<String>,
    pub filter: Option<String>,
}

impl ExportRequest {
    pub fn new(
        document_id: impl Into<String>,
        collection_id: impl Into<String>,
        format: ExportFormat,
    ) -> Self {
        Self {
            document_id: document_id.into(),
            collection_id: collection_id.into(),
            format,
            pages: Vec::new(),
            filter: None,
        }
    }

    pub fn with_pages<I, S>(mut self, pages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.pages = pages.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }
}

/// Handle to one server-side export job.
///
/// Valid for a single submission attempt only: a retry submits a new job
/// and gets a new handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobHandle {
    id: String,
    document_id: String,
    collection_id: String,
    format: ExportFormat,
}

impl JobHandle {
    /// Binds a service-issued job id to the request that created it.
    pub fn new(id: impl Into<String>, request: &ExportRequest) -> Self {
        Self {
            id: id.into(),
            document_id: request.document_id.clone(),
            collection_id: request.collection_id.clone(),
            format: request.format,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn document_id(&self) -> &str {
        &self.document_id
    }

    pub fn collection_id(&self) -> &str {
        &self.collection_id
    }

    pub fn format(&self) -> ExportFormat {
        self.format
    }
}

impl fmt::Display for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

/// Server-side state of an export job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobState {
    #[serde(alias = "Undefined")]
    NotStarted,
    Running,
    Succeeded,
    Failed,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Succeeded | JobState::Failed)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobState::NotStarted => write!(f, "not_started"),
            JobState::Running => write!(f, "running"),
            JobState::Succeeded => write!(f, "succeeded"),
            JobState::Failed => write!(f, "failed"),
        }
    }
}

/// Snapshot of a job as reported by one status query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobStatus {
    pub state: JobState,
    pub percent_complete: u8,
    /// Wait suggested by the service before the next poll or retry.
    pub retry_after: Option<Duration>,
    /// Suffix of the produced file; only set once the job has succeeded.
    pub file_extension: Option<String>,
}

impl JobStatus {
    pub fn new(state: JobState) -> Self {
        Self {
            state,
            percent_complete: if state == JobState::Succeeded { 100 } else { 0 },
            retry_after: None,
            file_extension: None,
        }
    }

    pub fn with_progress(mut self, percent_complete: u8) -> Self {
        self.percent_complete = percent_complete.min(100);
        self
    }

    pub fn with_retry_after(mut self, delay: Duration) -> Self {
        self.retry_after = Some(delay);
        self
    }

    pub fn with_file_extension(mut self, extension: impl Into<String>) -> Self {
        self.file_extension = Some(extension.into());
        self
    }
}

/// Exported file handed to the caller.
///
/// The stream can be consumed exactly once; every accessor that reads it
/// takes `self`.
pub struct Artifact {
    stream: ByteStream,
    suffix: String,
}

impl Artifact {
    pub fn new(stream: ByteStream, suffix: impl Into<String>) -> Self {
        Self {
            stream,
            suffix: suffix.into(),
        }
    }

    /// File suffix including the leading dot, e.g. `.pdf`.
    pub fn suffix(&self) -> &str {
        &self.suffix
    }

    /// Builds a file name from `stem` and the artifact suffix.
    pub fn file_name(&self, stem: &str) -> String {
        format!("{}{}", stem, self.suffix)
    }

    pub fn into_stream(self) -> ByteStream {
        self.stream
    }

    /// Buffers the whole file in memory.
    pub async fn into_bytes(self) -> Result<Bytes, ServiceError> {
        let buf = self
            .stream
            .try_fold(BytesMut::new(), |mut buf, chunk| async move {
                buf.extend_from_slice(&chunk);
                Ok(buf)
            })
            .await?;
        Ok(buf.freeze())
    }

    /// Exposes the file as an [`AsyncRead`].
    pub fn into_reader(self) -> impl AsyncRead + Send + Unpin {
        StreamReader::new(
            self.stream
                .map(|chunk| chunk.map_err(|e| io::Error::new(io::ErrorKind::Other, e))),
        )
    }
}

impl fmt::Debug for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Artifact")
            .field("suffix", &self.suffix)
            .finish_non_exhaustive()
    }
}
