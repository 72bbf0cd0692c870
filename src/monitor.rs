//! Completion monitor: drains the worker pool and tallies the outcome.

use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use tracing::{error, info, warn};

use crate::audit::JobStatus;
use crate::download::WorkerPool;

/// Totals for one run, over every job the pool accepted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub submitted: usize,
    /// Fetched during this run.
    pub downloaded: usize,
    /// Already on disk; no request made.
    pub existing: usize,
    /// Failed downloads, including worker tasks that panicked.
    pub failed: usize,
    pub bytes: u64,
    /// Wall-clock time since the monitor was created.
    pub elapsed: Duration,
}

impl RunSummary {
    /// Jobs whose destination holds the file now.
    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.downloaded + self.existing
    }

    /// True when no job failed.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failed == 0
    }
}

/// Waits for all submitted jobs, optionally with a progress bar.
///
/// Create it when the run starts: [`RunSummary::elapsed`] is measured from
/// construction, so login and traversal time are included.
#[derive(Debug)]
pub struct CompletionMonitor {
    bar: ProgressBar,
    started: Instant,
}

impl CompletionMonitor {
    /// A hidden monitor draws nothing; totals are still computed.
    #[must_use]
    pub fn new(show_progress: bool) -> Self {
        let bar = ProgressBar::new(0);
        if show_progress {
            bar.set_style(
                ProgressStyle::with_template(
                    "{spinner} [{elapsed_precise}] {bar:40} {pos}/{len} {msg}",
                )
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
            );
        } else {
            bar.set_draw_target(ProgressDrawTarget::hidden());
        }
        Self {
            bar,
            started: Instant::now(),
        }
    }

    /// Blocks until every job submitted to `pool` has finished.
    pub async fn wait(&self, pool: &mut WorkerPool) -> RunSummary {
        let mut summary = RunSummary {
            submitted: pool.submitted(),
            ..RunSummary::default()
        };
        self.bar.set_length(u64::try_from(pool.pending()).unwrap_or(u64::MAX));
        info!(pending = pool.pending(), "waiting for downloads");

        while let Some(joined) = pool.join_next().await {
            match joined {
                Ok(Ok(report)) => {
                    summary.bytes += report.bytes;
                    match report.status {
                        JobStatus::Exists => summary.existing += 1,
                        _ => summary.downloaded += 1,
                    }
                }
                Ok(Err(failure)) => {
                    warn!(error = %failure, "job failed");
                    summary.failed += 1;
                }
                Err(e) => {
                    error!(error = %e, "worker task aborted");
                    summary.failed += 1;
                }
            }
            self.bar.inc(1);
            self.bar
                .set_message(format!("{} ok, {} failed", summary.succeeded(), summary.failed));
        }

        self.bar.finish_and_clear();
        summary.elapsed = self.started.elapsed();
        info!(
            submitted = summary.submitted,
            downloaded = summary.downloaded,
            existing = summary.existing,
            failed = summary.failed,
            bytes = summary.bytes,
            elapsed_ms = u64::try_from(summary.elapsed.as_millis()).unwrap_or(u64::MAX),
            "all downloads finished"
        );
        summary
    }
}
