//! CLI entry point for the portal harvester.

use std::io::{self, IsTerminal};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use harvester_core::{
    Credentials, FileConfig, HarvestConfig, HarvestOutcome, RunSummary, retry_failed, run_harvest,
};
use tracing::{debug, error, info};

mod cli;

use cli::Args;

/// How the process ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProcessExit {
    Success,
    Partial,
    Failure,
}

impl From<ProcessExit> for ExitCode {
    fn from(exit: ProcessExit) -> Self {
        match exit {
            ProcessExit::Success => ExitCode::SUCCESS,
            ProcessExit::Failure => ExitCode::from(1),
            ProcessExit::Partial => ExitCode::from(2),
        }
    }
}

/// Maps job tallies to the exit outcome.
fn determine_exit_outcome(succeeded: usize, failed: usize) -> ProcessExit {
    if failed == 0 {
        ProcessExit::Success
    } else if succeeded > 0 {
        ProcessExit::Partial
    } else {
        ProcessExit::Failure
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // .env first so clap sees PORTAL_USERNAME / PORTAL_PASSWORD from it
    dotenvy::dotenv().ok();
    let args = Args::parse();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    debug!(?args, "CLI arguments parsed");

    let mut config = HarvestConfig::default();
    if let Some(path) = &args.config {
        let file = FileConfig::load(path)
            .with_context(|| format!("loading config file {}", path.display()))?;
        config.apply_file(file).context("applying config file")?;
    }
    args.apply_to(&mut config);
    config.validate().context("invalid configuration")?;

    let show_progress = !args.quiet && io::stderr().is_terminal();

    if args.retry_failed {
        let credentials = Credentials::new(args.username.clone(), args.password.clone()).ok();
        info!(audit_log = %config.audit_log.display(), "retrying failed downloads");
        let summary = retry_failed(&config, credentials.as_ref(), show_progress)
            .await
            .context("retrying failed downloads")?;
        report_summary(&summary);
        return Ok(determine_exit_outcome(summary.succeeded(), summary.failed).into());
    }

    let credentials = Credentials::new(args.username.clone(), args.password.clone())?;
    info!(base_url = %config.base_url, workers = config.workers, "Harvester starting");

    let outcome = run_harvest(&config, &credentials, show_progress)
        .await
        .context("harvest failed")?;
    report_outcome(&outcome);

    if outcome.patients_aborted {
        return Ok(ProcessExit::Failure.into());
    }
    Ok(determine_exit_outcome(outcome.summary.succeeded(), outcome.summary.failed).into())
}

fn report_outcome(outcome: &HarvestOutcome) {
    if let Some(gallery) = &outcome.gallery {
        info!(
            pages = gallery.steps,
            jobs = gallery.submitted,
            failed_pages = gallery.failed,
            "gallery pass"
        );
    }
    if let Some(patients) = &outcome.patients {
        info!(
            patients = patients.steps,
            jobs = patients.submitted,
            skipped = patients.skipped,
            failed = patients.failed,
            "patient pass"
        );
    }
    if outcome.patients_aborted {
        error!("patient pass aborted: list unreachable");
    }
    report_summary(&outcome.summary);
}

fn report_summary(summary: &RunSummary) {
    info!(
        succeeded = summary.succeeded(),
        downloaded = summary.downloaded,
        existing = summary.existing,
        failed = summary.failed,
        elapsed_s = format!("{:.2}", summary.elapsed.as_secs_f64()),
        "Harvest complete"
    );
    if summary.failed > 0 {
        error!(
            failed = summary.failed,
            "some downloads failed; rerun with --retry-failed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_outcome_success_when_no_failures() {
        assert_eq!(determine_exit_outcome(3, 0), ProcessExit::Success);
        assert_eq!(determine_exit_outcome(0, 0), ProcessExit::Success);
    }

    #[test]
    fn test_exit_outcome_partial_when_mixed() {
        assert_eq!(determine_exit_outcome(2, 1), ProcessExit::Partial);
    }

    #[test]
    fn test_exit_outcome_failure_when_all_failed() {
        assert_eq!(determine_exit_outcome(0, 2), ProcessExit::Failure);
    }
}
