//! Run-scoped state shared by the workers of one run.
//!
//! Nothing here is global: two runs against different warehouses each build
//! their own [`RunContext`] and never see each other's budget. The
//! orchestrator gives every run its own [`NotificationLedger`], even when the
//! runs share one context.

use std::{collections::HashMap, sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::{
    sync::Mutex,
    time::{Instant, sleep_until}
};
use tracing::debug;

use crate::dedup::NotificationLedger;

/// Source of wall-clock time for cooldown decisions.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// The system clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that always reports the same instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Previous observation of a check, used as trend context by the classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Baseline {
    pub row_count: u64,
    pub observed:  DateTime<Utc>
}

#[derive(Debug)]
struct Window {
    started: Instant,
    used:    u32
}

/// Calls-per-minute budget for the generation backend.
///
/// One counter behind a mutex, shared by every worker of a run. A caller
/// that finds the window exhausted sleeps until the window rolls over.
///
/// A slot is one logical generation call: one SQL synthesis or one
/// classification. Transport retries inside a backend client reuse the slot
/// of the call they retry, so a provider may see up to
/// `max_retries + 1` requests per slot.
#[derive(Debug)]
pub struct GenerationBudget {
    per_window: u32,
    window:     Duration,
    state:      Mutex<Window>
}

impl GenerationBudget {
    pub fn per_minute(calls: u32) -> Self {
        Self::new(calls, Duration::from_secs(60))
    }

    pub fn new(per_window: u32, window: Duration) -> Self {
        Self {
            per_window: per_window.max(1),
            window,
            state: Mutex::new(Window {
                started: Instant::now(),
                used:    0
            })
        }
    }

    /// Wait for and consume one call slot.
    pub async fn acquire(&self) {
        loop {
            let resume_at = {
                let mut state = self.state.lock().await;
                let now = Instant::now();
                if now.duration_since(state.started) >= self.window {
                    state.started = now;
                    state.used = 0;
                }
                if state.used < self.per_window {
                    state.used += 1;
                    return;
                }
                state.started + self.window
            };
            debug!("generation budget exhausted, waiting for next window");
            sleep_until(resume_at).await;
        }
    }

    /// Calls consumed in the current window
    pub async fn used(&self) -> u32 {
        self.state.lock().await.used
    }
}

/// Everything a worker needs besides the pipeline components.
#[derive(Clone)]
pub struct RunContext {
    pub run_id:        String,
    pub budget:        Arc<GenerationBudget>,
    pub clock:         Arc<dyn Clock>,
    /// Table description passed to the SQL generator
    pub schema_hint:   Option<String>,
    /// Last observed row count per check
    pub baselines:     HashMap<String, Baseline>,
    /// Only run checks carrying this schedule tag
    pub schedule:      Option<String>,
    /// Only run these checks (all when empty)
    pub only:          Vec<String>,
    /// Cap and pending fingerprints of the run, replaced when a run starts
    pub notifications: Arc<NotificationLedger>
}

impl RunContext {
    pub fn new(budget: GenerationBudget) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let now = clock.now();
        Self {
            run_id: now.format("run-%Y%m%dT%H%M%SZ").to_string(),
            budget: Arc::new(budget),
            clock,
            schema_hint: None,
            baselines: HashMap::new(),
            schedule: None,
            only: Vec::new(),
            notifications: Arc::new(NotificationLedger::new(usize::MAX))
        }
    }

    /// Copy of this context with a fresh ledger capped at
    /// `max_notifications`.
    pub fn for_run(&self, max_notifications: usize) -> Self {
        Self {
            notifications: Arc::new(NotificationLedger::new(max_notifications)),
            ..self.clone()
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_schema_hint(mut self, hint: Option<String>) -> Self {
        self.schema_hint = hint;
        self
    }

    pub fn with_baselines(mut self, baselines: HashMap<String, Baseline>) -> Self {
        self.baselines = baselines;
        self
    }

    pub fn with_schedule(mut self, schedule: Option<String>) -> Self {
        self.schedule = schedule;
        self
    }

    pub fn with_only(mut self, only: Vec<String>) -> Self {
        self.only = only;
        self
    }
}
