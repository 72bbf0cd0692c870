//! End-to-end CLI tests for the harvester binary.
//!
//! None of these reach the network: each one stops at argument parsing,
//! configuration, credentials or the audit log.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn harvester(temp: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("harvester").unwrap();
    cmd.current_dir(temp.path())
        .env_remove("PORTAL_USERNAME")
        .env_remove("PORTAL_PASSWORD")
        .env_remove("RUST_LOG");
    cmd
}

/// Test that --help displays usage information and exits with code 0.
#[test]
fn test_binary_help_displays_usage() {
    let temp = TempDir::new().unwrap();
    harvester(&temp)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Mirror the DMI thermography portal"))
        .stdout(predicate::str::contains("--retry-failed"));
}

/// Test that --version displays version and exits with code 0.
#[test]
fn test_binary_version_displays_version() {
    let temp = TempDir::new().unwrap();
    harvester(&temp)
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("harvester"));
}

/// Test that invalid flags cause non-zero exit.
#[test]
fn test_binary_invalid_flag_returns_error() {
    let temp = TempDir::new().unwrap();
    harvester(&temp)
        .arg("--invalid-flag")
        .assert()
        .failure()
        .stderr(predicate::str::contains("error"));
}

#[test]
fn test_binary_missing_credentials_fails() {
    let temp = TempDir::new().unwrap();
    harvester(&temp)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("missing credentials"));
}

#[test]
fn test_binary_rejects_unknown_config_key() {
    let temp = TempDir::new().unwrap();
    std::fs::write(temp.path().join("harvest.toml"), "wrokers = 4\n").unwrap();
    harvester(&temp)
        .args(["--config", "harvest.toml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("harvest.toml"));
}

#[test]
fn test_binary_rejects_zero_page_delay_from_config() {
    let temp = TempDir::new().unwrap();
    std::fs::write(
        temp.path().join("harvest.toml"),
        "page_delay_secs = [0.0, 0.0]\n",
    )
    .unwrap();
    harvester(&temp)
        .args(["--config", "harvest.toml", "--username", "a", "--password", "b"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("page_delay"));
}

#[test]
fn test_binary_retry_failed_without_log_fails() {
    let temp = TempDir::new().unwrap();
    harvester(&temp)
        .args(["--retry-failed", "--audit-log", "absent.csv"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("absent.csv"));
}

#[test]
fn test_binary_retry_failed_with_clean_log_succeeds() {
    let temp = TempDir::new().unwrap();
    std::fs::write(
        temp.path().join("log.csv"),
        "timestamp,task_type,identifier,file_name,status,size_kb,url,elapsed_s,error\n\
         2024-01-01 00:00:00,gallery,Page_1,a.jpg,success,1.00,http://127.0.0.1:9/a.jpg,0.10,\n",
    )
    .unwrap();
    harvester(&temp)
        .args(["-q", "--retry-failed", "--audit-log", "log.csv"])
        .assert()
        .success();
}
