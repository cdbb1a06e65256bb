//! Report Export Client Library
//!
//! Requests asynchronous exports of remote documents (reports rendered to
//! PDF, PPTX, PNG, ...), follows each export job to completion and hands
//! back the produced file as a stream.
//!
//! ## Module Overview
//!
//! - `job`: Export request, job handle, status and artifact models
//! - `service`: Remote export service trait and its HTTP client
//! - `submitter`: Job submission
//! - `poller`: Status polling honoring server `Retry-After` hints
//! - `fetcher`: Artifact retrieval for succeeded jobs
//! - `orchestrator`: Submit/poll/retry/fetch state machine
//! - `clock`: Injectable time source
//! - `config`: Environment-based configuration
//! - `telemetry`: OpenTelemetry integration and structured logging
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use report_export::{
//!     config::ExportConfig,
//!     job::{ExportFormat, ExportRequest},
//!     orchestrator::ExportOrchestrator,
//! };
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ExportConfig::from_env()?;
//!     let orchestrator = ExportOrchestrator::from_config(&config)?;
//!
//!     let request = ExportRequest::new("report-id", "workspace-id", ExportFormat::Pdf)
//!         .with_pages(["ReportSection1"]);
//!
//!     let artifact = orchestrator
//!         .export(&request, config.poll_timeout, &CancellationToken::new())
//!         .await?;
//!     let name = artifact.file_name("report");
//!     let bytes = artifact.into_bytes().await?;
//!     println!("{}: {} bytes", name, bytes.len());
//!     Ok(())
//! }
//! ```

pub mod clock;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod job;
pub mod orchestrator;
pub mod poller;
pub mod service;
pub mod submitter;
pub mod telemetry;
