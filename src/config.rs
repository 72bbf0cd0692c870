//! Run configuration: compiled-in defaults, the optional TOML file, and
//! validation.
//!
//! Layering is defaults, then [`FileConfig`], then explicit CLI flags (applied
//! by the binary). [`HarvestConfig::validate`] runs once on the final result.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use rand::Rng;
use serde::Deserialize;
use thiserror::Error;
use url::Url;

use crate::download::{HttpSettings, TransportRetryPolicy};
use crate::download::{DEFAULT_BACKOFF_BASE, DEFAULT_MAX_RETRIES, DEFAULT_RETRY_STATUSES};
use crate::user_agent;

/// Portal root every relative link is resolved against.
pub const DEFAULT_BASE_URL: &str = "https://visual.ic.uff.br/dmi/prontuario/";

/// Default worker pool size.
pub const DEFAULT_WORKERS: usize = 8;

/// Accepted worker pool sizes.
pub const WORKER_RANGE: std::ops::RangeInclusive<usize> = 1..=100;

/// Default per-request timeout in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Default gallery destination.
pub const DEFAULT_GALLERY_DIR: &str = "downloads/Thermography_imgs";

/// Default patient destination.
pub const DEFAULT_PATIENT_DIR: &str = "downloads/Patient_Data";

/// Default audit log file.
pub const DEFAULT_AUDIT_LOG: &str = "download_log_unified.csv";

/// Errors loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("failed to read config file {path}: {source}")]
    Read {
        /// Config file path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid TOML or has unknown keys.
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        /// Config file path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: toml::de::Error,
    },

    /// A value is outside its accepted range.
    #[error("invalid config value for `{field}`: {reason}")]
    Invalid {
        /// Offending key.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}

impl ConfigError {
    fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// A closed range of durations sampled uniformly at millisecond resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelayRange {
    min: Duration,
    max: Duration,
}

impl DelayRange {
    /// Creates a range; `max` must not be below `min`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when `max < min`.
    pub fn new(min: Duration, max: Duration) -> Result<Self, ConfigError> {
        if max < min {
            return Err(ConfigError::invalid(
                "delay",
                format!("max {max:?} is below min {min:?}"),
            ));
        }
        Ok(Self { min, max })
    }

    /// Creates a range from fractional seconds.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for negative or non-finite bounds, or
    /// `max < min`.
    pub fn from_secs_f64(min: f64, max: f64) -> Result<Self, ConfigError> {
        let convert = |value: f64| {
            Duration::try_from_secs_f64(value)
                .map_err(|_| ConfigError::invalid("delay", format!("{value} is not a valid delay")))
        };
        Self::new(convert(min)?, convert(max)?)
    }

    /// A range that always yields zero.
    #[must_use]
    pub const fn zero() -> Self {
        Self {
            min: Duration::ZERO,
            max: Duration::ZERO,
        }
    }

    /// Lower bound.
    #[must_use]
    pub fn min(&self) -> Duration {
        self.min
    }

    /// Upper bound.
    #[must_use]
    pub fn max(&self) -> Duration {
        self.max
    }

    /// Draws one delay from the range. Never below `min`, so a validated page
    /// delay is never zero.
    #[must_use]
    pub fn sample(&self) -> Duration {
        let lo = u64::try_from(self.min.as_nanos()).unwrap_or(u64::MAX);
        let hi = u64::try_from(self.max.as_nanos()).unwrap_or(u64::MAX);
        if hi <= lo {
            return self.min;
        }
        Duration::from_nanos(rand::thread_rng().gen_range(lo..=hi))
    }
}

/// Fully resolved settings for one run.
#[derive(Debug, Clone)]
pub struct HarvestConfig {
    /// Portal root; always ends with `/`.
    pub base_url: String,
    /// Run the gallery pass.
    pub gallery_enabled: bool,
    /// Run the patient pass.
    pub patients_enabled: bool,
    /// Upper bound on gallery pages; `None` walks every detected page.
    pub gallery_max_pages: Option<u32>,
    pub gallery_dir: PathBuf,
    pub patient_dir: PathBuf,
    pub workers: usize,
    pub request_timeout: Duration,
    /// Pause between navigator page loads. Never zero.
    pub page_delay: DelayRange,
    /// Pause before each download request.
    pub fetch_delay: DelayRange,
    pub max_retries: u32,
    pub backoff_base: Duration,
    pub retry_statuses: Vec<u16>,
    pub audit_log: PathBuf,
    pub accept_invalid_certs: bool,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            gallery_enabled: true,
            patients_enabled: true,
            gallery_max_pages: None,
            gallery_dir: PathBuf::from(DEFAULT_GALLERY_DIR),
            patient_dir: PathBuf::from(DEFAULT_PATIENT_DIR),
            workers: DEFAULT_WORKERS,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            page_delay: DelayRange {
                min: Duration::from_millis(1500),
                max: Duration::from_millis(3500),
            },
            fetch_delay: DelayRange {
                min: Duration::from_millis(100),
                max: Duration::from_millis(500),
            },
            max_retries: DEFAULT_MAX_RETRIES,
            backoff_base: DEFAULT_BACKOFF_BASE,
            retry_statuses: DEFAULT_RETRY_STATUSES.to_vec(),
            audit_log: PathBuf::from(DEFAULT_AUDIT_LOG),
            accept_invalid_certs: false,
        }
    }
}

impl HarvestConfig {
    /// Layers every key present in `file` over `self`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for a delay pair that is not a valid
    /// range.
    pub fn apply_file(&mut self, file: FileConfig) -> Result<(), ConfigError> {
        if let Some(base_url) = file.base_url {
            self.base_url = base_url;
        }
        if let Some(gallery) = file.gallery {
            self.gallery_enabled = gallery;
        }
        if let Some(patients) = file.patients {
            self.patients_enabled = patients;
        }
        if let Some(pages) = file.gallery_max_pages {
            self.gallery_max_pages = Some(pages);
        }
        if let Some(dir) = file.gallery_dir {
            self.gallery_dir = dir;
        }
        if let Some(dir) = file.patient_dir {
            self.patient_dir = dir;
        }
        if let Some(workers) = file.workers {
            self.workers = workers;
        }
        if let Some(secs) = file.request_timeout_secs {
            self.request_timeout = Duration::from_secs(secs);
        }
        if let Some([min, max]) = file.page_delay_secs {
            self.page_delay = DelayRange::from_secs_f64(min, max)?;
        }
        if let Some([min, max]) = file.fetch_delay_secs {
            self.fetch_delay = DelayRange::from_secs_f64(min, max)?;
        }
        if let Some(retries) = file.max_retries {
            self.max_retries = retries;
        }
        if let Some(secs) = file.backoff_base_secs {
            self.backoff_base = Duration::try_from_secs_f64(secs).map_err(|_| {
                ConfigError::invalid("backoff_base_secs", format!("{secs} is not a valid delay"))
            })?;
        }
        if let Some(statuses) = file.retry_statuses {
            self.retry_statuses = statuses;
        }
        if let Some(path) = file.audit_log {
            self.audit_log = path;
        }
        if let Some(insecure) = file.accept_invalid_certs {
            self.accept_invalid_certs = insecure;
        }
        Ok(())
    }

    /// Checks every value against its accepted range and normalizes
    /// `base_url` to end with `/`.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError::Invalid`] found.
    pub fn validate(&mut self) -> Result<(), ConfigError> {
        let parsed = Url::parse(&self.base_url)
            .map_err(|e| ConfigError::invalid("base_url", format!("{}: {e}", self.base_url)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ConfigError::invalid(
                "base_url",
                format!("unsupported scheme `{}`", parsed.scheme()),
            ));
        }
        if !self.base_url.ends_with('/') {
            self.base_url.push('/');
        }

        if !WORKER_RANGE.contains(&self.workers) {
            return Err(ConfigError::invalid(
                "workers",
                format!("{}. Expected range: 1..=100", self.workers),
            ));
        }

        let timeout = self.request_timeout.as_secs();
        if !(1..=3600).contains(&timeout) {
            return Err(ConfigError::invalid(
                "request_timeout_secs",
                format!("{timeout}. Expected range: 1..=3600"),
            ));
        }

        if self.page_delay.min().is_zero() {
            return Err(ConfigError::invalid(
                "page_delay_secs",
                "minimum must be greater than zero",
            ));
        }

        if self.gallery_max_pages == Some(0) {
            return Err(ConfigError::invalid(
                "gallery_max_pages",
                "must be at least 1 when set",
            ));
        }

        if let Some(status) = self
            .retry_statuses
            .iter()
            .find(|s| !(500..=599).contains(*s))
        {
            return Err(ConfigError::invalid(
                "retry_statuses",
                format!("{status} is not a 5xx status"),
            ));
        }

        Ok(())
    }

    /// Builds the HTTP session settings for this run.
    #[must_use]
    pub fn http_settings(&self) -> HttpSettings {
        HttpSettings {
            request_timeout: self.request_timeout,
            retry: TransportRetryPolicy::new(
                self.max_retries,
                self.backoff_base,
                self.retry_statuses.iter().copied(),
            ),
            user_agent: user_agent::random_browser_user_agent().to_string(),
            accept_invalid_certs: self.accept_invalid_certs,
            ..HttpSettings::default()
        }
    }

    /// The portal base URL, parsed.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Invalid`] if `base_url` is not an absolute URL.
    pub fn parsed_base_url(&self) -> Result<Url, ConfigError> {
        Url::parse(&self.base_url).map_err(|e| ConfigError::invalid("base_url", e.to_string()))
    }

    /// Patient image subdirectory.
    #[must_use]
    pub fn patient_images_dir(&self) -> PathBuf {
        self.patient_dir.join("images")
    }

    /// Patient thermal-matrix subdirectory.
    #[must_use]
    pub fn patient_matrix_dir(&self) -> PathBuf {
        self.patient_dir.join("thermal_matrix")
    }

    /// Per-patient metadata subdirectory.
    #[must_use]
    pub fn patient_metadata_dir(&self) -> PathBuf {
        self.patient_dir.join("metadata")
    }
}

/// Optional TOML configuration file. Every key is optional; unknown keys are
/// rejected.
///
/// ```toml
/// workers = 4
/// gallery_max_pages = 10
/// page_delay_secs = [2.0, 4.0]
/// retry_statuses = [502, 503]
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub base_url: Option<String>,
    pub gallery: Option<bool>,
    pub patients: Option<bool>,
    pub gallery_max_pages: Option<u32>,
    pub gallery_dir: Option<PathBuf>,
    pub patient_dir: Option<PathBuf>,
    pub workers: Option<usize>,
    pub request_timeout_secs: Option<u64>,
    pub page_delay_secs: Option<[f64; 2]>,
    pub fetch_delay_secs: Option<[f64; 2]>,
    pub max_retries: Option<u32>,
    pub backoff_base_secs: Option<f64>,
    pub retry_statuses: Option<Vec<u16>>,
    pub audit_log: Option<PathBuf>,
    pub accept_invalid_certs: Option<bool>,
}

impl FileConfig {
    /// Reads and parses the TOML file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] or [`ConfigError::Parse`].
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}
