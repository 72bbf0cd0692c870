//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::Parser;

use harvester_core::HarvestConfig;

/// Mirror the DMI thermography portal to local storage.
///
/// Logs in, walks the image gallery and the patient directory, and downloads
/// every image and thermal matrix it finds. Files already on disk are skipped,
/// so an interrupted run can simply be started again.
#[derive(Parser, Debug)]
#[command(name = "harvester")]
#[command(author, version, about)]
pub struct Args {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,

    /// TOML config file layered under these flags
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Portal username
    #[arg(long, env = "PORTAL_USERNAME")]
    pub username: Option<String>,

    /// Portal password
    #[arg(long, env = "PORTAL_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Concurrent downloads (1-100)
    #[arg(short, long, value_parser = clap::value_parser!(u8).range(1..=100))]
    pub workers: Option<u8>,

    /// Stop the gallery pass after this many pages
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    pub gallery_max_pages: Option<u32>,

    /// Skip the gallery pass
    #[arg(long)]
    pub no_gallery: bool,

    /// Skip the patient pass
    #[arg(long)]
    pub no_patients: bool,

    /// Destination for gallery images
    #[arg(long, value_name = "DIR")]
    pub gallery_dir: Option<PathBuf>,

    /// Destination for patient images, matrices and metadata
    #[arg(long, value_name = "DIR")]
    pub patient_dir: Option<PathBuf>,

    /// CSV file recording every download outcome
    #[arg(long, value_name = "PATH")]
    pub audit_log: Option<PathBuf>,

    /// Transport retries for 5xx responses (0-10)
    #[arg(short = 'r', long, value_parser = clap::value_parser!(u32).range(0..=10))]
    pub max_retries: Option<u32>,

    /// Accept invalid TLS certificates from the portal
    #[arg(long)]
    pub insecure: bool,

    /// Only re-download files whose last audit entry failed
    #[arg(long)]
    pub retry_failed: bool,
}

impl Args {
    /// Layers explicitly passed flags over `config`.
    pub fn apply_to(&self, config: &mut HarvestConfig) {
        if let Some(workers) = self.workers {
            config.workers = usize::from(workers);
        }
        if let Some(pages) = self.gallery_max_pages {
            config.gallery_max_pages = Some(pages);
        }
        if self.no_gallery {
            config.gallery_enabled = false;
        }
        if self.no_patients {
            config.patients_enabled = false;
        }
        if let Some(dir) = &self.gallery_dir {
            config.gallery_dir.clone_from(dir);
        }
        if let Some(dir) = &self.patient_dir {
            config.patient_dir.clone_from(dir);
        }
        if let Some(path) = &self.audit_log {
            config.audit_log.clone_from(path);
        }
        if let Some(retries) = self.max_retries {
            config.max_retries = retries;
        }
        if self.insecure {
            config.accept_invalid_certs = true;
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_default_args_parses_successfully() {
        let args = Args::try_parse_from(["harvester"]).unwrap();
        assert_eq!(args.verbose, 0);
        assert!(!args.quiet);
        assert!(args.workers.is_none());
        assert!(!args.retry_failed);
    }

    #[test]
    fn test_cli_verbose_flag_increments_count() {
        let args = Args::try_parse_from(["harvester", "-vv"]).unwrap();
        assert_eq!(args.verbose, 2);
    }

    #[test]
    fn test_cli_help_flag_shows_usage() {
        let err = Args::try_parse_from(["harvester", "--help"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayHelp);
    }

    #[test]
    fn test_cli_workers_range() {
        let args = Args::try_parse_from(["harvester", "-w", "16"]).unwrap();
        assert_eq!(args.workers, Some(16));

        let err = Args::try_parse_from(["harvester", "-w", "0"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);

        let err = Args::try_parse_from(["harvester", "--workers", "101"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn test_cli_gallery_cap_must_be_positive() {
        let err = Args::try_parse_from(["harvester", "--gallery-max-pages", "0"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn test_cli_flags_override_config() {
        let args = Args::try_parse_from([
            "harvester",
            "-w",
            "4",
            "--gallery-max-pages",
            "2",
            "--no-patients",
            "--gallery-dir",
            "out/g",
            "--audit-log",
            "out/log.csv",
            "--insecure",
        ])
        .unwrap();
        let mut config = HarvestConfig::default();
        args.apply_to(&mut config);

        assert_eq!(config.workers, 4);
        assert_eq!(config.gallery_max_pages, Some(2));
        assert!(config.gallery_enabled);
        assert!(!config.patients_enabled);
        assert_eq!(config.gallery_dir, PathBuf::from("out/g"));
        assert_eq!(config.audit_log, PathBuf::from("out/log.csv"));
        assert!(config.accept_invalid_certs);
    }

    #[test]
    fn test_cli_unset_flags_keep_config() {
        let args = Args::try_parse_from(["harvester"]).unwrap();
        let mut config = HarvestConfig::default();
        config.workers = 12;
        args.apply_to(&mut config);
        assert_eq!(config.workers, 12);
        assert!(config.patients_enabled);
    }
}
