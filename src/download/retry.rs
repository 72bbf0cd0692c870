//! Transport-level retry with exponential backoff.
//!
//! The shared [`HttpClient`](super::HttpClient) consults a
//! [`TransportRetryPolicy`] after every attempt of an idempotent request. A
//! response whose status is in the policy's retry set, or a connect/timeout
//! failure, is retried after a backoff delay until the retry budget runs out.
//! Callers only ever see the final response, so job-outcome classification is
//! unaffected by how many attempts the transport made.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use harvester_core::download::{RetryDecision, TransportRetryPolicy};
//!
//! let policy = TransportRetryPolicy::default();
//! match policy.decide_status(503, 0) {
//!     RetryDecision::Retry { delay, attempt } => {
//!         assert_eq!(attempt, 2);
//!         assert_eq!(delay, Duration::from_millis(500));
//!     }
//!     RetryDecision::DoNotRetry { .. } => unreachable!(),
//! }
//! ```

use std::collections::BTreeSet;
use std::time::Duration;

use tracing::debug;

/// Default number of retries after the initial attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default base delay for exponential backoff (0.5 seconds).
pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_millis(500);

/// Default maximum delay cap.
const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(120);

/// Default backoff multiplier (doubles each retry).
const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;

/// Statuses retried by default.
pub const DEFAULT_RETRY_STATUSES: [u16; 4] = [500, 502, 503, 504];

/// Decision on whether to retry a failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after the specified delay.
    Retry {
        /// How long to wait before retrying.
        delay: Duration,
        /// Which attempt number the retry will be (the initial attempt is 1).
        attempt: u32,
    },

    /// Hand the current result back to the caller.
    DoNotRetry {
        /// Human-readable reason why retry is not attempted.
        reason: String,
    },
}

/// Retry configuration for the shared HTTP session.
///
/// # Delay Calculation
///
/// ```text
/// delay = min(backoff_base * multiplier^(retries_done), max_backoff)
/// ```
///
/// With defaults, delays are 0.5s, 1s, 2s.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportRetryPolicy {
    /// Maximum number of retries after the initial attempt.
    max_retries: u32,
    /// Delay before the first retry.
    backoff_base: Duration,
    /// Upper bound for any single delay.
    max_backoff: Duration,
    /// Multiplier applied per retry.
    multiplier: f64,
    /// Statuses that trigger a retry.
    retry_statuses: BTreeSet<u16>,
}

impl Default for TransportRetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            backoff_base: DEFAULT_BACKOFF_BASE,
            max_backoff: DEFAULT_MAX_BACKOFF,
            multiplier: DEFAULT_BACKOFF_MULTIPLIER,
            retry_statuses: DEFAULT_RETRY_STATUSES.into_iter().collect(),
        }
    }
}

impl TransportRetryPolicy {
    /// Creates a policy with the given retry budget, backoff base and statuses.
    #[must_use]
    pub fn new(
        max_retries: u32,
        backoff_base: Duration,
        retry_statuses: impl IntoIterator<Item = u16>,
    ) -> Self {
        Self {
            max_retries,
            backoff_base,
            retry_statuses: retry_statuses.into_iter().collect(),
            ..Self::default()
        }
    }

    /// Returns the configured retry budget.
    #[must_use]
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Returns the configured backoff base.
    #[must_use]
    pub fn backoff_base(&self) -> Duration {
        self.backoff_base
    }

    /// Returns the retry-eligible statuses.
    #[must_use]
    pub fn retry_statuses(&self) -> &BTreeSet<u16> {
        &self.retry_statuses
    }

    /// Decides what to do after an attempt returned `status`.
    ///
    /// `retries_done` counts retries already made (0 after the initial attempt).
    #[must_use]
    pub fn decide_status(&self, status: u16, retries_done: u32) -> RetryDecision {
        if !self.retry_statuses.contains(&status) {
            return RetryDecision::DoNotRetry {
                reason: format!("status {status} is not retry-eligible"),
            };
        }
        self.next_attempt(retries_done)
    }

    /// Decides what to do after an attempt failed before a response arrived.
    #[must_use]
    pub fn decide_error(&self, error: &reqwest::Error, retries_done: u32) -> RetryDecision {
        if !(error.is_connect() || error.is_timeout()) {
            return RetryDecision::DoNotRetry {
                reason: "error is not a connect or timeout failure".to_string(),
            };
        }
        self.next_attempt(retries_done)
    }

    fn next_attempt(&self, retries_done: u32) -> RetryDecision {
        if retries_done >= self.max_retries {
            debug!(retries_done, max = self.max_retries, "retry budget exhausted");
            return RetryDecision::DoNotRetry {
                reason: format!("max retries ({}) exhausted", self.max_retries),
            };
        }
        RetryDecision::Retry {
            delay: self.calculate_delay(retries_done),
            attempt: retries_done + 2,
        }
    }

    /// Formula: `min(backoff_base * multiplier^retries_done, max_backoff)`
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    fn calculate_delay(&self, retries_done: u32) -> Duration {
        let base_ms = self.backoff_base.as_millis() as f64;
        let delay_ms = base_ms * self.multiplier.powi(i32::try_from(retries_done).unwrap_or(i32::MAX));
        let capped_ms = delay_ms.min(self.max_backoff.as_millis() as f64);
        Duration::from_millis(capped_ms as u64)
    }
}
