//! Bounded worker pool running the download procedure.
//!
//! Jobs are spawned onto a [`JoinSet`] as soon as they are submitted and wait
//! for a semaphore permit inside the task, so submission never blocks the
//! producer. At most `workers` jobs hold a permit at any time.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, instrument, warn};

use super::client::HttpClient;
use super::job::{DownloadJob, JobFailure, JobReport, run_job};
use crate::audit::AuditLog;
use crate::config::{DelayRange, WORKER_RANGE};

/// What a pooled job resolves to.
pub type JobResult = Result<JobReport, JobFailure>;

/// Errors constructing a [`WorkerPool`].
#[derive(Debug, Error)]
pub enum PoolError {
    /// Worker count outside 1..=100.
    #[error("invalid worker count: {value}. Expected range: 1..=100")]
    InvalidWorkers {
        /// The rejected value.
        value: usize,
    },
}

/// Fixed-size pool of download workers sharing one HTTP session and one
/// audit log.
#[derive(Debug)]
pub struct WorkerPool {
    semaphore: Arc<Semaphore>,
    client: HttpClient,
    audit: Arc<AuditLog>,
    fetch_delay: DelayRange,
    tasks: JoinSet<JobResult>,
    submitted: usize,
}

impl WorkerPool {
    /// Creates a pool with `workers` concurrent slots.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::InvalidWorkers`] outside 1..=100.
    #[instrument(level = "debug", skip(client, audit))]
    pub fn new(
        workers: usize,
        client: HttpClient,
        audit: Arc<AuditLog>,
        fetch_delay: DelayRange,
    ) -> Result<Self, PoolError> {
        if !WORKER_RANGE.contains(&workers) {
            return Err(PoolError::InvalidWorkers { value: workers });
        }
        debug!(workers, "creating worker pool");
        Ok(Self {
            semaphore: Arc::new(Semaphore::new(workers)),
            client,
            audit,
            fetch_delay,
            tasks: JoinSet::new(),
            submitted: 0,
        })
    }

    /// Jobs submitted so far.
    #[must_use]
    pub fn submitted(&self) -> usize {
        self.submitted
    }

    /// Jobs not yet collected by [`join_next`](Self::join_next).
    #[must_use]
    pub fn pending(&self) -> usize {
        self.tasks.len()
    }

    /// Queues `job`. Never blocks; the job starts once a worker slot frees up.
    pub fn enqueue(&mut self, job: DownloadJob) {
        let semaphore = Arc::clone(&self.semaphore);
        let client = self.client.clone();
        let audit = Arc::clone(&self.audit);
        let fetch_delay = self.fetch_delay;

        self.submitted += 1;
        self.tasks.spawn(async move {
            // The pool never closes its semaphore; a closed one only loses the bound.
            let _permit = match semaphore.acquire_owned().await {
                Ok(permit) => Some(permit),
                Err(_) => {
                    warn!(identifier = %job.identifier, "worker semaphore closed");
                    None
                }
            };
            run_job(&job, &client, &audit, fetch_delay).await
        });
    }

    /// Waits for the next job to finish, in completion order. Returns `None`
    /// once every submitted job has been collected.
    pub async fn join_next(&mut self) -> Option<Result<JobResult, JoinError>> {
        self.tasks.join_next().await
    }
}
