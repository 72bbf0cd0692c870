//! Top-level error type for a harvest run.

use thiserror::Error;

use crate::audit::AuditError;
use crate::config::ConfigError;
use crate::crawl::CrawlError;
use crate::download::{DownloadError, PoolError};
use crate::extract::ExtractionError;
use crate::metadata::MetadataError;
use crate::navigator::{AuthError, NavigationError};

/// Anything that can stop a run before or while it is set up.
///
/// Per-page, per-patient and per-job failures never surface here; they are
/// logged and tallied instead.
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("authentication failed: {0}")]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Navigation(#[from] NavigationError),

    #[error(transparent)]
    Crawl(#[from] CrawlError),

    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error("HTTP client setup failed: {0}")]
    Download(#[from] DownloadError),

    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error("audit log unavailable: {0}")]
    Audit(#[from] AuditError),

    #[error(transparent)]
    Metadata(#[from] MetadataError),
}

impl HarvestError {
    /// True for failures of the login step.
    #[must_use]
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Auth(_))
    }
}
