use analytics_sentinel::report::{CheckOutcome, CheckReport, FailureReason, RunReport};
use chrono::{Duration, TimeZone, Utc};
use serde_json::json;

fn report(outcomes: Vec<CheckReport>) -> RunReport {
    let started = Utc.with_ymd_and_hms(2025, 6, 1, 6, 0, 0).unwrap();
    RunReport::new("run-1", started, started + Duration::seconds(42), outcomes)
}

fn with_rows(check: &str, outcome: CheckOutcome, rows: u64) -> CheckReport {
    let mut report = CheckReport::new(check, outcome);
    report.row_count = Some(rows);
    report
}

#[test]
fn test_counts_by_label() {
    let run = report(vec![
        CheckReport::new("a", CheckOutcome::Notified),
        CheckReport::new("b", CheckOutcome::NoFinding),
        CheckReport::new("c", CheckOutcome::Notified),
        CheckReport::new("d", CheckOutcome::Failed(FailureReason::GenerationError))
    ]);

    assert_eq!(run.count(CheckOutcome::Notified), 2);
    assert_eq!(run.count(CheckOutcome::NoFinding), 1);
    assert_eq!(run.count(CheckOutcome::Failed(FailureReason::GenerationError)), 1);
    assert_eq!(run.count(CheckOutcome::Failed(FailureReason::ExecutionError)), 0);
    assert_eq!(run.counts["failed: generation_error"], 1);
    assert_eq!(run.duration_ms, 42_000);
}

#[test]
fn test_outcome_of() {
    let run = report(vec![CheckReport::new("a", CheckOutcome::Noise)]);
    assert_eq!(run.outcome_of("a"), Some(CheckOutcome::Noise));
    assert_eq!(run.outcome_of("missing"), None);
}

#[test]
fn test_exit_code_clean_run() {
    let run = report(vec![
        CheckReport::new("a", CheckOutcome::NoFinding),
        CheckReport::new("b", CheckOutcome::SuppressedDuplicate),
        CheckReport::new("c", CheckOutcome::Noise)
    ]);
    assert_eq!(run.exit_code(), 0);
    assert!(!run.has_failures());
}

#[test]
fn test_exit_code_findings() {
    let run = report(vec![
        CheckReport::new("a", CheckOutcome::NoFinding),
        CheckReport::new("b", CheckOutcome::Capped)
    ]);
    assert_eq!(run.exit_code(), 1);
}

#[test]
fn test_exit_code_failures_win() {
    for failure in [
        CheckOutcome::TimedOut,
        CheckOutcome::DeliveryFailed,
        CheckOutcome::Failed(FailureReason::ExecutionError)
    ] {
        let run = report(vec![
            CheckReport::new("a", CheckOutcome::Notified),
            CheckReport::new("b", failure)
        ]);
        assert_eq!(run.exit_code(), 2, "{}", failure);
    }
}

#[test]
fn test_observations_use_finish_time() {
    let run = report(vec![
        with_rows("a", CheckOutcome::NoFinding, 0),
        CheckReport::timed_out("b"),
        with_rows("c", CheckOutcome::Notified, 12)
    ]);

    let observed = run.observations();
    assert_eq!(observed.len(), 2);
    assert_eq!(observed[0].0, "a");
    assert_eq!(observed[0].1.row_count, 0);
    assert_eq!(observed[1].1.row_count, 12);
    assert_eq!(observed[1].1.observed, run.finished_at);
}

#[test]
fn test_labels() {
    assert_eq!(CheckOutcome::SuppressedDuplicate.to_string(), "suppressed_duplicate");
    assert_eq!(
        CheckOutcome::Failed(FailureReason::ExecutionError).to_string(),
        "failed: execution_error"
    );
    assert_eq!(FailureReason::GenerationError.as_str(), "generation_error");
}

#[test]
fn test_serializes_outcomes() {
    let mut failed = CheckReport::new("b", CheckOutcome::Failed(FailureReason::ExecutionError));
    failed.attempts = 4;
    let run = report(vec![CheckReport::new("a", CheckOutcome::NoFinding), failed]);

    let value = serde_json::to_value(&run).unwrap();
    assert_eq!(value["outcomes"][0]["outcome"], json!("no_finding"));
    assert_eq!(
        value["outcomes"][1]["outcome"],
        json!({"failed": "execution_error"})
    );
    assert_eq!(value["outcomes"][1]["attempts"], json!(4));
    assert!(value["outcomes"][0].get("sql").is_none());
    assert_eq!(value["counts"]["no_finding"], json!(1));
}
