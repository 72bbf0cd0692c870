//! Harvester Core Library
//!
//! Crawls an authenticated medical-imaging portal and mirrors its content to
//! local storage: the thermography image gallery and, for every patient in the
//! directory, the structured record, its images and its thermal matrices.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`navigator`] - Authenticated session and sequential page retrieval
//! - [`extract`] - Page-type extractors for the portal layout
//! - [`crawl`] - Job producer with the gallery and patient traversals
//! - [`download`] - HTTP client, download procedure and worker pool
//! - [`audit`] - Append-only CSV record of every job outcome
//! - [`metadata`] - Per-patient and aggregate JSON documents
//! - [`monitor`] - Completion monitor and run summary
//! - [`pipeline`] - Run orchestration
//!
//! Enumeration is strictly sequential over one session; transfers run in
//! parallel on a bounded pool that shares the session's cookies.

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod audit;
pub mod config;
pub mod crawl;
pub mod download;
pub mod error;
pub mod extract;
pub mod metadata;
pub mod model;
pub mod monitor;
pub mod navigator;
pub mod pipeline;
pub mod user_agent;

// Re-export commonly used types
pub use audit::{AuditError, AuditLog, JobStatus, LogEntry};
pub use config::{ConfigError, DelayRange, FileConfig, HarvestConfig};
pub use crawl::{CrawlError, CrawlSettings, JobProducer, JobSink, PassReport, StepOutcome};
pub use download::{
    DownloadError, DownloadJob, HttpClient, HttpSettings, JobReport, PoolError,
    TransportRetryPolicy, WorkerPool,
};
pub use error::HarvestError;
pub use extract::{ExtractionError, Extractor, PortalExtractor};
pub use metadata::MetadataStore;
pub use model::{FileRef, FileType, GalleryImageRef, PatientRecord, PatientRow, TaskType};
pub use monitor::{CompletionMonitor, RunSummary};
pub use navigator::{AuthError, Credentials, HttpNavigator, NavigationError, Navigator, PageLink};
pub use pipeline::{HarvestOutcome, retry_failed, run_harvest};
