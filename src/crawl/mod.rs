//! The job producer: sequential traversal of the gallery and the patient
//! directory, turning what it finds into [`DownloadJob`]s.
//!
//! The producer owns the [`Navigator`] exclusively and runs its two passes one
//! after the other. Every traversal step returns a [`StepOutcome`]; a failure
//! confined to one page or one patient is logged and the pass moves on. Only
//! an unreachable patient list ends a pass early.

mod gallery;
mod patients;

use std::path::PathBuf;

use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::config::{DelayRange, HarvestConfig};
use crate::download::{DownloadJob, WorkerPool};
use crate::extract::Extractor;
use crate::model::TaskType;
use crate::navigator::{NavigationError, Navigator};

pub use gallery::GALLERY_START_PATH;
pub use patients::PATIENT_LIST_PATH;

/// Receives jobs as the producer discovers them.
pub trait JobSink {
    /// Accepts one job. Must not block on job completion.
    fn submit(&mut self, job: DownloadJob);
}

impl JobSink for WorkerPool {
    fn submit(&mut self, job: DownloadJob) {
        self.enqueue(job);
    }
}

impl JobSink for Vec<DownloadJob> {
    fn submit(&mut self, job: DownloadJob) {
        self.push(job);
    }
}

/// Result of one traversal step (one gallery page or one patient).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// The step submitted this many jobs.
    Submitted(usize),
    /// Nothing to do here; not an error.
    Skipped {
        /// Why the step was skipped.
        reason: String,
    },
    /// The step failed; the pass continues.
    Failed {
        /// What went wrong.
        reason: String,
    },
}

/// Errors that end a pass early.
#[derive(Debug, Error)]
pub enum CrawlError {
    /// Neither the list link nor the direct list URL led to the patient list.
    #[error("patient list unreachable at {url}")]
    ListUnreachable {
        /// The direct list URL that was tried last.
        url: String,
        /// Load failure of the direct URL, if it failed outright.
        #[source]
        source: Option<NavigationError>,
    },
}

/// Tally of one pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassReport {
    pub task_type: TaskType,
    /// Pages (gallery) or patients (directory) processed.
    pub steps: usize,
    pub submitted: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl PassReport {
    fn new(task_type: TaskType) -> Self {
        Self {
            task_type,
            steps: 0,
            submitted: 0,
            skipped: 0,
            failed: 0,
        }
    }

    fn record(&mut self, outcome: &StepOutcome) {
        self.steps += 1;
        match outcome {
            StepOutcome::Submitted(n) => self.submitted += n,
            StepOutcome::Skipped { .. } => self.skipped += 1,
            StepOutcome::Failed { .. } => self.failed += 1,
        }
    }
}

/// Where the producer puts things and how it paces itself.
#[derive(Debug, Clone)]
pub struct CrawlSettings {
    pub base_url: Url,
    pub gallery_dir: PathBuf,
    /// Root for metadata documents.
    pub patient_dir: PathBuf,
    pub patient_images_dir: PathBuf,
    pub patient_matrix_dir: PathBuf,
    pub gallery_max_pages: Option<u32>,
    /// Pause between page loads.
    pub page_delay: DelayRange,
}

impl CrawlSettings {
    /// Takes the crawl-related values from a validated config.
    #[must_use]
    pub fn from_config(config: &HarvestConfig, base_url: Url) -> Self {
        Self {
            base_url,
            gallery_dir: config.gallery_dir.clone(),
            patient_dir: config.patient_dir.clone(),
            patient_images_dir: config.patient_images_dir(),
            patient_matrix_dir: config.patient_matrix_dir(),
            gallery_max_pages: config.gallery_max_pages,
            page_delay: config.page_delay,
        }
    }
}

/// Drives a navigator and an extractor through the traversal passes.
#[derive(Debug)]
pub struct JobProducer<N, E> {
    navigator: N,
    extractor: E,
    settings: CrawlSettings,
}

impl<N: Navigator, E: Extractor> JobProducer<N, E> {
    /// Creates a producer owning `navigator`.
    pub fn new(navigator: N, extractor: E, settings: CrawlSettings) -> Self {
        Self {
            navigator,
            extractor,
            settings,
        }
    }

    /// Returns the navigator, ending the producer.
    pub fn into_navigator(self) -> N {
        self.navigator
    }

    fn resolve(&self, path: &str) -> String {
        self.settings
            .base_url
            .join(path)
            .map_or_else(|_| format!("{}{path}", self.settings.base_url), String::from)
    }

    async fn pause(&self) {
        let delay = self.settings.page_delay.sample();
        debug!(delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX), "page delay");
        tokio::time::sleep(delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pass_report_tallies_outcomes() {
        let mut report = PassReport::new(TaskType::Gallery);
        report.record(&StepOutcome::Submitted(3));
        report.record(&StepOutcome::Skipped {
            reason: "empty".to_string(),
        });
        report.record(&StepOutcome::Failed {
            reason: "boom".to_string(),
        });
        report.record(&StepOutcome::Submitted(2));
        assert_eq!(report.steps, 4);
        assert_eq!(report.submitted, 5);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.failed, 1);
    }

    #[test]
    fn test_vec_sink_collects_jobs() {
        let mut sink: Vec<DownloadJob> = Vec::new();
        sink.submit(DownloadJob::new(TaskType::Gallery, "Page_1", "u", "d/a.jpg"));
        assert_eq!(sink.len(), 1);
    }
}
