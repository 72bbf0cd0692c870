//! Run orchestration: wires the session, producer, pool and monitor together.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{error, info, instrument, warn};

use crate::audit::{self, AuditLog, AuditRow};
use crate::config::HarvestConfig;
use crate::crawl::{CrawlSettings, JobProducer, JobSink, PassReport};
use crate::download::{DownloadJob, HttpClient, WorkerPool};
use crate::error::HarvestError;
use crate::extract::PortalExtractor;
use crate::model::{FileType, TaskType};
use crate::monitor::{CompletionMonitor, RunSummary};
use crate::navigator::{Credentials, HttpNavigator};

/// What a full harvest did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarvestOutcome {
    /// `None` when the gallery pass was disabled.
    pub gallery: Option<PassReport>,
    /// `None` when the patient pass was disabled or aborted.
    pub patients: Option<PassReport>,
    /// The patient list could not be reached.
    pub patients_aborted: bool,
    pub summary: RunSummary,
}

impl HarvestOutcome {
    /// True when every job succeeded and no pass was aborted.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.summary.is_clean() && !self.patients_aborted
    }
}

/// Logs in, runs the enabled passes, and waits for every download.
///
/// Downloads start as soon as jobs are submitted and overlap with the rest of
/// the traversal. An unreachable patient list aborts that pass only; gallery
/// jobs already submitted still run to completion.
///
/// # Errors
///
/// Returns [`HarvestError`] when setup fails: bad base URL, HTTP client,
/// audit log, login, or worker count. Nothing is downloaded in that case.
#[instrument(skip_all, fields(base_url = %config.base_url, workers = config.workers))]
pub async fn run_harvest(
    config: &HarvestConfig,
    credentials: &Credentials,
    show_progress: bool,
) -> Result<HarvestOutcome, HarvestError> {
    let monitor = CompletionMonitor::new(show_progress);
    let base_url = config.parsed_base_url()?;
    let client = HttpClient::new(&config.http_settings())?;
    let audit = Arc::new(AuditLog::open(&config.audit_log)?);

    let mut navigator = HttpNavigator::new(client.clone(), base_url.clone());
    navigator.login(credentials).await?;
    info!(user = %credentials.username, "logged in");

    let mut pool = WorkerPool::new(config.workers, client, audit, config.fetch_delay)?;
    let mut producer = JobProducer::new(
        navigator,
        PortalExtractor::new(base_url.clone()),
        CrawlSettings::from_config(config, base_url),
    );

    let gallery = if config.gallery_enabled {
        info!(dir = %config.gallery_dir.display(), "gallery pass starting");
        Some(producer.run_gallery_pass(&mut pool).await)
    } else {
        info!("gallery pass disabled");
        None
    };

    let mut patients_aborted = false;
    let patients = if config.patients_enabled {
        info!(dir = %config.patient_dir.display(), "patient pass starting");
        match producer.run_patient_pass(&mut pool).await {
            Ok(report) => Some(report),
            Err(e) => {
                error!(error = %e, "patient pass aborted");
                patients_aborted = true;
                None
            }
        }
    } else {
        info!("patient pass disabled");
        None
    };

    info!(submitted = pool.submitted(), "all jobs submitted");
    let summary = monitor.wait(&mut pool).await;

    Ok(HarvestOutcome {
        gallery,
        patients,
        patients_aborted,
        summary,
    })
}

/// Rebuilds the job for a `failed` audit row, or `None` when the file name
/// does not map to a download directory.
#[must_use]
pub fn job_for_failed_row(config: &HarvestConfig, row: &AuditRow) -> Option<DownloadJob> {
    let dir: PathBuf = match row.task_type {
        TaskType::Gallery => config.gallery_dir.clone(),
        TaskType::Patient => match FileType::classify(&row.file_name) {
            FileType::Image => config.patient_images_dir(),
            FileType::ThermalMatrix => config.patient_matrix_dir(),
            FileType::Other => return None,
        },
    };
    if row.file_name.is_empty() {
        return None;
    }
    Some(DownloadJob::new(
        row.task_type,
        row.identifier.clone(),
        row.url.clone(),
        dir.join(&row.file_name),
    ))
}

/// Re-runs only the jobs whose latest audit row is `failed`.
///
/// With `credentials` the session logs in first so patient files behind the
/// login are reachable. New outcomes are appended to the same audit log.
///
/// # Errors
///
/// Returns [`HarvestError`] when the audit log cannot be read or opened, the
/// login fails, or the client or pool cannot be built.
#[instrument(skip_all, fields(audit_log = %config.audit_log.display()))]
pub async fn retry_failed(
    config: &HarvestConfig,
    credentials: Option<&Credentials>,
    show_progress: bool,
) -> Result<RunSummary, HarvestError> {
    let monitor = CompletionMonitor::new(show_progress);
    let rows = audit::failed_rows(&config.audit_log)?;
    info!(failed = rows.len(), "failed rows to retry");

    let client = HttpClient::new(&config.http_settings())?;
    if let Some(credentials) = credentials {
        let mut navigator = HttpNavigator::new(client.clone(), config.parsed_base_url()?);
        navigator.login(credentials).await?;
        info!(user = %credentials.username, "logged in");
    }
    let audit = Arc::new(AuditLog::open(&config.audit_log)?);
    let mut pool = WorkerPool::new(config.workers, client, audit, config.fetch_delay)?;

    for row in &rows {
        match job_for_failed_row(config, row) {
            Some(job) => pool.submit(job),
            None => warn!(url = %row.url, file = %row.file_name, "no destination for failed row, skipping"),
        }
    }

    Ok(monitor.wait(&mut pool).await)
}
