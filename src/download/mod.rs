//! Download side of the harvester: the shared HTTP session, the per-job
//! download procedure, and the bounded worker pool that runs it.
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use harvester_core::download::{HttpClient, HttpSettings};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = HttpClient::new(&HttpSettings::default())?;
//! let bytes = client
//!     .fetch_to_file("https://example.com/T0001.jpg", Path::new("T0001.jpg"))
//!     .await?;
//! println!("wrote {bytes} bytes");
//! # Ok(())
//! # }
//! ```

mod client;
mod constants;
mod error;
pub mod filename;
mod job;
mod pool;
mod retry;

pub use client::{FetchedPage, HttpClient, HttpSettings};
pub use error::DownloadError;
pub use job::{DownloadJob, JobFailure, JobReport, run_job};
pub use pool::{JobResult, PoolError, WorkerPool};
pub use retry::{
    DEFAULT_BACKOFF_BASE, DEFAULT_MAX_RETRIES, DEFAULT_RETRY_STATUSES, RetryDecision,
    TransportRetryPolicy,
};
