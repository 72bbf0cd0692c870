//! Download jobs and the per-job download procedure.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use super::client::HttpClient;
use super::error::DownloadError;
use crate::audit::{AuditLog, JobStatus, LogEntry};
use crate::config::DelayRange;
use crate::model::TaskType;

/// One file to fetch and where to put it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadJob {
    pub task_type: TaskType,
    /// `Page_{n}` for gallery jobs, `Patient_{id}` for patient jobs.
    pub identifier: String,
    pub source_url: String,
    pub destination: PathBuf,
}

impl DownloadJob {
    /// Creates a job.
    pub fn new(
        task_type: TaskType,
        identifier: impl Into<String>,
        source_url: impl Into<String>,
        destination: impl Into<PathBuf>,
    ) -> Self {
        Self {
            task_type,
            identifier: identifier.into(),
            source_url: source_url.into(),
            destination: destination.into(),
        }
    }

    /// Final path component of the destination.
    #[must_use]
    pub fn file_name(&self) -> String {
        self.destination
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    #[allow(clippy::cast_precision_loss)]
    fn log_entry(&self, status: JobStatus, bytes: u64, elapsed: Duration) -> LogEntry {
        let mut entry = LogEntry::now(
            self.task_type,
            self.identifier.clone(),
            self.file_name(),
            self.source_url.clone(),
            status,
        );
        entry.size_kb = bytes as f64 / 1024.0;
        entry.elapsed_s = elapsed.as_secs_f64();
        entry
    }
}

/// Outcome of a job that ended in [`JobStatus::Exists`] or
/// [`JobStatus::Success`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobReport {
    pub identifier: String,
    pub status: JobStatus,
    pub bytes: u64,
    pub elapsed: Duration,
}

/// A job that ended in [`JobStatus::Failed`].
#[derive(Debug, Error)]
#[error("{identifier}: {source}")]
pub struct JobFailure {
    pub identifier: String,
    pub url: String,
    #[source]
    pub source: DownloadError,
}

/// Runs the download procedure for one job.
///
/// 1. An existing destination is recorded as `exists` without any request.
/// 2. Otherwise a `fetch_delay` pause precedes a streamed GET into the
///    destination (transport retries happen inside the client).
/// 3. The terminal audit row is written before this function returns.
///
/// # Errors
///
/// Returns [`JobFailure`] when the fetch or the write fails; its audit row
/// has already been recorded as `failed`.
#[instrument(skip_all, fields(identifier = %job.identifier, url = %job.source_url))]
pub async fn run_job(
    job: &DownloadJob,
    client: &HttpClient,
    audit: &AuditLog,
    fetch_delay: DelayRange,
) -> Result<JobReport, JobFailure> {
    let started = Instant::now();

    if let Ok(metadata) = tokio::fs::metadata(&job.destination).await {
        let bytes = metadata.len();
        debug!(path = %job.destination.display(), bytes, "destination exists, skipping fetch");
        audit
            .record(&job.log_entry(JobStatus::Exists, bytes, Duration::ZERO))
            .await;
        return Ok(JobReport {
            identifier: job.identifier.clone(),
            status: JobStatus::Exists,
            bytes,
            elapsed: Duration::ZERO,
        });
    }

    tokio::time::sleep(fetch_delay.sample()).await;

    match fetch(client, &job.source_url, &job.destination).await {
        Ok(bytes) => {
            let elapsed = started.elapsed();
            info!(
                path = %job.destination.display(),
                bytes,
                elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
                "download complete"
            );
            audit
                .record(&job.log_entry(JobStatus::Success, bytes, elapsed))
                .await;
            Ok(JobReport {
                identifier: job.identifier.clone(),
                status: JobStatus::Success,
                bytes,
                elapsed,
            })
        }
        Err(error) => {
            let elapsed = started.elapsed();
            warn!(error = %error, "download failed");
            let mut entry = job.log_entry(JobStatus::Failed, 0, elapsed);
            entry.error = error.to_string();
            audit.record(&entry).await;
            Err(JobFailure {
                identifier: job.identifier.clone(),
                url: job.source_url.clone(),
                source: error,
            })
        }
    }
}

async fn fetch(client: &HttpClient, url: &str, destination: &Path) -> Result<u64, DownloadError> {
    if let Some(parent) = destination.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| DownloadError::io(parent, e))?;
    }
    client.fetch_to_file(url, destination).await
}
