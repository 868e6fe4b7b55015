//! Integration tests for the analytics-sentinel binary.

use std::io::Write;

use assert_cmd::{Command, cargo::cargo_bin_cmd};
use predicates::prelude::*;
use tempfile::{NamedTempFile, TempDir};

const CATALOG: &str = r#"
checks:
  - name: event_volume_drop
    description: Daily event count dropped more than 50% versus the 7 day average
    schedule: daily
  - name: null_platform
    description: Events with a null platform
    sql: SELECT event_name FROM events WHERE platform IS NULL
"#;

/// Binary isolated from the user's config files and environment.
fn cmd(home: &TempDir) -> Command {
    let mut cmd = cargo_bin_cmd!("analytics-sentinel");
    cmd.current_dir(home.path())
        .env("HOME", home.path())
        .env_remove("LLM_API_KEY")
        .env_remove("LLM_PROVIDER")
        .env_remove("BIGQUERY_PROJECT")
        .env_remove("BIGQUERY_ACCESS_TOKEN")
        .env_remove("SLACK_WEBHOOK_URL");
    cmd
}

fn catalog(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "{}", content).unwrap();
    file
}

#[test]
fn test_checks_lists_catalog() {
    let home = TempDir::new().unwrap();
    let file = catalog(CATALOG);

    cmd(&home)
        .args(["checks", "-c", file.path().to_str().unwrap(), "--no-color"])
        .assert()
        .success()
        .stdout(predicate::str::contains("event_volume_drop [daily]"))
        .stdout(predicate::str::contains("inline SQL: valid"))
        .stdout(predicate::str::contains("2 check(s)"));
}

#[test]
fn test_checks_invalid_catalog() {
    let home = TempDir::new().unwrap();
    let file = catalog("checks: []");

    cmd(&home)
        .args(["checks", "-c", file.path().to_str().unwrap()])
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("Error"));
}

#[test]
fn test_checks_file_not_found() {
    let home = TempDir::new().unwrap();

    cmd(&home)
        .args(["checks", "-c", "/nonexistent/checks.yaml"])
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("Error"));
}

#[test]
fn test_run_without_warehouse_project() {
    let home = TempDir::new().unwrap();
    let file = catalog(CATALOG);

    cmd(&home)
        .args([
            "run",
            "-c",
            file.path().to_str().unwrap(),
            "--provider",
            "ollama",
            "--dry-run",
            "--no-color"
        ])
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("Error"));
}

#[test]
fn test_run_openai_requires_api_key() {
    let home = TempDir::new().unwrap();
    let file = catalog(CATALOG);

    cmd(&home)
        .args(["run", "-c", file.path().to_str().unwrap(), "--provider", "open-ai"])
        .env("BIGQUERY_PROJECT", "acme")
        .env("BIGQUERY_ACCESS_TOKEN", "token")
        .assert()
        .failure()
        .code(2);
}

#[test]
fn test_run_rejects_zero_concurrency() {
    let home = TempDir::new().unwrap();
    let file = catalog(CATALOG);

    cmd(&home)
        .args([
            "run",
            "-c",
            file.path().to_str().unwrap(),
            "--concurrency",
            "0"
        ])
        .assert()
        .failure()
        .code(2);
}

#[test]
fn test_help() {
    let home = TempDir::new().unwrap();
    cmd(&home).arg("--help").assert().success();
}

#[test]
fn test_version() {
    let home = TempDir::new().unwrap();
    cmd(&home).arg("--version").assert().success();
}
