//! Per-run accounting.

use std::fmt;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::Serialize;

use crate::{context::Baseline, finding::Finding};

/// Pipeline stage a check failed in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    GenerationError,
    ExecutionError
}

impl FailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GenerationError => "generation_error",
            Self::ExecutionError => "execution_error"
        }
    }
}

/// Final state of one check in one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckOutcome {
    Notified,
    NoFinding,
    /// Classifier judged the rows expected variance
    Noise,
    SuppressedDuplicate,
    Capped,
    DeliveryFailed,
    Failed(FailureReason),
    /// Still running when the run deadline passed
    TimedOut
}

impl CheckOutcome {
    /// Whether the pipeline itself broke for this check.
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed(_) | Self::TimedOut | Self::DeliveryFailed)
    }

    /// Key used in [`RunReport::counts`]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Notified => "notified",
            Self::NoFinding => "no_finding",
            Self::Noise => "noise",
            Self::SuppressedDuplicate => "suppressed_duplicate",
            Self::Capped => "capped",
            Self::DeliveryFailed => "delivery_failed",
            Self::Failed(FailureReason::GenerationError) => "failed: generation_error",
            Self::Failed(FailureReason::ExecutionError) => "failed: execution_error",
            Self::TimedOut => "timed_out"
        }
    }
}

impl fmt::Display for CheckOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Error recorded against a check
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureDetail {
    pub kind:    String,
    pub message: String
}

impl FailureDetail {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind:    kind.into(),
            message: message.into()
        }
    }
}

/// What happened to one check.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckReport {
    pub check:                String,
    pub outcome:              CheckOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sql:                  Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model:                Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row_count:            Option<u64>,
    /// Warehouse execution attempts
    pub attempts:             u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finding:              Option<Finding>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error:                Option<FailureDetail>,
    /// Classifier failure the finding fell back from, kept when a later
    /// stage overwrites `error`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub classification_error: Option<FailureDetail>,
    pub duration_ms:          u64
}

impl CheckReport {
    pub fn new(check: impl Into<String>, outcome: CheckOutcome) -> Self {
        Self {
            check: check.into(),
            outcome,
            sql: None,
            model: None,
            row_count: None,
            attempts: 0,
            finding: None,
            error: None,
            classification_error: None,
            duration_ms: 0
        }
    }

    pub fn timed_out(check: impl Into<String>) -> Self {
        Self::new(check, CheckOutcome::TimedOut)
    }
}

/// Summary of a run, outcomes in catalog order.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id:      String,
    pub started_at:  DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub outcomes:    Vec<CheckReport>,
    pub counts:      IndexMap<String, usize>
}

impl RunReport {
    pub fn new(
        run_id: impl Into<String>,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
        outcomes: Vec<CheckReport>
    ) -> Self {
        let mut counts: IndexMap<String, usize> = IndexMap::new();
        for report in &outcomes {
            *counts.entry(report.outcome.label().to_string()).or_insert(0) += 1;
        }
        let duration_ms = finished_at
            .signed_duration_since(started_at)
            .num_milliseconds()
            .max(0) as u64;
        Self {
            run_id: run_id.into(),
            started_at,
            finished_at,
            duration_ms,
            outcomes,
            counts
        }
    }

    /// Number of checks that ended with `outcome`
    pub fn count(&self, outcome: CheckOutcome) -> usize {
        self.counts.get(outcome.label()).copied().unwrap_or(0)
    }

    pub fn outcome_of(&self, check: &str) -> Option<CheckOutcome> {
        self.outcomes
            .iter()
            .find(|r| r.check == check)
            .map(|r| r.outcome)
    }

    /// Row counts seen in this run, to serve as the next run's baselines.
    pub fn observations(&self) -> Vec<(String, Baseline)> {
        self.outcomes
            .iter()
            .filter_map(|r| {
                r.row_count.map(|row_count| {
                    (r.check.clone(), Baseline {
                        row_count,
                        observed: self.finished_at
                    })
                })
            })
            .collect()
    }

    pub fn has_failures(&self) -> bool {
        self.outcomes.iter().any(|r| r.outcome.is_failure())
    }

    /// Process exit code for the run
    ///
    /// - `0` every check ran and nothing needed attention
    /// - `1` findings were delivered or held back by the cap
    /// - `2` at least one check failed, timed out or could not be delivered
    pub fn exit_code(&self) -> i32 {
        if self.has_failures() {
            2
        } else if self
            .outcomes
            .iter()
            .any(|r| matches!(r.outcome, CheckOutcome::Notified | CheckOutcome::Capped))
        {
            1
        } else {
            0
        }
    }
}
