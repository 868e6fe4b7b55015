//! Drives every runnable check of a catalog through the pipeline.
//!
//! ```text
//! synthesize → execute (retry transient) → empty? → classify → dedup → notify
//! ```
//!
//! Each check ends in exactly one [`CheckOutcome`]. Errors of one check are
//! recorded in its report and never abort the other checks. A run fails as a
//! whole only when no check of the catalog is runnable or when it overruns
//! the hard timeout.
//!
//! Checks run on a bounded pool: a [`Semaphore`] with `concurrency` permits
//! in front of a [`JoinSet`]. Reports are put back into catalog order. When
//! the run deadline passes, unfinished checks are aborted and reported
//! `timed_out`. Deliveries run in their own tasks and are not aborted with
//! their check: the run waits for them so every sent notification has its
//! timestamp recorded.

use std::{collections::HashMap, sync::Arc, time::Duration};

use tokio::{
    sync::Semaphore,
    task::JoinSet,
    time::{Instant, sleep, timeout, timeout_at}
};
use tracing::{Instrument, debug, info, info_span, warn};

use crate::{
    catalog::{Catalog, CheckDefinition},
    classifier::{FindingClassifier, Verdict, sample_result, unclassified_finding},
    config::{Config, RetryConfig},
    context::{Clock, RunContext},
    dedup::{Admission, Deduplicator},
    error::{AppResult, ExecutionError, catalog_error, run_timeout_error},
    finding::Finding,
    notify::{NotificationPayload, NotificationSink},
    query::SqlDialect,
    report::{CheckOutcome, CheckReport, FailureDetail, FailureReason, RunReport},
    synth::{QuerySynthesizer, SynthesisRequest, compile_inline},
    warehouse::{QueryResult, WarehouseClient}
};

/// Tunables of a run.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub dialect:           SqlDialect,
    /// Backoff for transient warehouse errors and failed deliveries
    pub retry:             RetryConfig,
    pub query_timeout:     Duration,
    pub sample_cap:        usize,
    pub delivery_retries:  u32,
    /// Notifications one run may send
    pub max_notifications: usize,
    pub concurrency:       usize,
    /// Checks unfinished after this are reported timed out
    pub run_timeout:       Duration,
    /// Ceiling for the whole run, exceeding it is an error
    pub hard_timeout:      Duration
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl PipelineSettings {
    pub fn from_config(config: &Config) -> Self {
        let p = &config.pipeline;
        Self {
            dialect:           SqlDialect::BigQuery,
            retry:             config.retry.clone(),
            query_timeout:     Duration::from_secs(p.query_timeout_secs),
            sample_cap:        p.sample_cap,
            delivery_retries:  p.delivery_retries,
            max_notifications: config.dedup.max_notifications,
            concurrency:       p.concurrency,
            run_timeout:       Duration::from_secs(p.run_timeout_secs),
            hard_timeout:      Duration::from_secs(p.hard_timeout_secs)
        }
    }
}

struct Pipeline {
    synthesizer: Arc<dyn QuerySynthesizer>,
    warehouse:   Arc<dyn WarehouseClient>,
    classifier:  Arc<dyn FindingClassifier>,
    dedup:       Arc<Deduplicator>,
    sink:        Arc<dyn NotificationSink>,
    settings:    PipelineSettings
}

/// Runs catalogs against one warehouse and one notification channel.
pub struct CheckOrchestrator {
    pipeline: Arc<Pipeline>
}

impl CheckOrchestrator {
    pub fn new(
        synthesizer: Arc<dyn QuerySynthesizer>,
        warehouse: Arc<dyn WarehouseClient>,
        classifier: Arc<dyn FindingClassifier>,
        dedup: Arc<Deduplicator>,
        sink: Arc<dyn NotificationSink>
    ) -> Self {
        Self {
            pipeline: Arc::new(Pipeline {
                synthesizer,
                warehouse,
                classifier,
                dedup,
                sink,
                settings: PipelineSettings::default()
            })
        }
    }

    pub fn with_settings(self, settings: PipelineSettings) -> Self {
        let p = &self.pipeline;
        Self {
            pipeline: Arc::new(Pipeline {
                synthesizer: Arc::clone(&p.synthesizer),
                warehouse: Arc::clone(&p.warehouse),
                classifier: Arc::clone(&p.classifier),
                dedup: Arc::clone(&p.dedup),
                sink: Arc::clone(&p.sink),
                settings
            })
        }
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.pipeline.settings
    }

    /// Run every enabled check of `catalog` that matches the context's
    /// filters.
    ///
    /// Every call gets its own notification cap, so runs may overlap on one
    /// orchestrator.
    pub async fn run(&self, catalog: &Catalog, context: &RunContext) -> AppResult<RunReport> {
        let hard_timeout = self.pipeline.settings.hard_timeout;
        timeout(hard_timeout, self.run_checks(catalog, context))
            .await
            .map_err(|_| run_timeout_error(hard_timeout))?
    }

    async fn run_checks(&self, catalog: &Catalog, context: &RunContext) -> AppResult<RunReport> {
        let settings = &self.pipeline.settings;
        let started_at = context.clock.now();
        let deadline = Instant::now() + settings.run_timeout;

        let checks: Vec<CheckDefinition> = catalog
            .runnable(context.schedule.as_deref(), &context.only)
            .cloned()
            .collect();
        if checks.is_empty() {
            return Err(catalog_error(format!(
                "none of the {} check(s) is enabled and selected for this run",
                catalog.len()
            )));
        }
        info!(
            run = %context.run_id,
            checks = checks.len(),
            skipped = catalog.len() - checks.len(),
            "starting run"
        );

        let semaphore = Arc::new(Semaphore::new(settings.concurrency.max(1)));
        let shared = Arc::new(context.for_run(settings.max_notifications));
        let mut set = JoinSet::new();
        let mut task_index = HashMap::new();
        for (idx, check) in checks.iter().cloned().enumerate() {
            let pipeline = Arc::clone(&self.pipeline);
            let semaphore = Arc::clone(&semaphore);
            let context = Arc::clone(&shared);
            let handle = set.spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                (idx, pipeline.run_check(&check, &context).await)
            });
            task_index.insert(handle.id(), idx);
        }

        let mut slots: Vec<Option<CheckReport>> = vec![None; checks.len()];
        loop {
            match timeout_at(deadline, set.join_next()).await {
                Ok(Some(Ok((idx, report)))) => slots[idx] = Some(report),
                Ok(Some(Err(e))) => {
                    warn!(error = %e, "check task failed");
                    if let Some(&idx) = task_index.get(&e.id()) {
                        let mut report = CheckReport::new(
                            checks[idx].name.clone(),
                            CheckOutcome::Failed(FailureReason::ExecutionError)
                        );
                        report.error = Some(FailureDetail::new("panic", e.to_string()));
                        slots[idx] = Some(report);
                    }
                }
                Ok(None) => break,
                Err(_) => {
                    warn!(unfinished = set.len(), "run deadline reached");
                    set.abort_all();
                    while let Some(joined) = set.join_next().await {
                        if let Ok((idx, report)) = joined {
                            slots[idx] = Some(report);
                        }
                    }
                    break;
                }
            }
        }
        let in_flight = shared.notifications.deliveries_in_flight();
        if in_flight > 0 {
            info!(deliveries = in_flight, "waiting for in-flight deliveries");
            shared.notifications.settled().await;
        }

        let outcomes = slots
            .into_iter()
            .zip(&checks)
            .map(|(slot, check)| slot.unwrap_or_else(|| CheckReport::timed_out(check.name.clone())))
            .collect();
        let report = RunReport::new(
            context.run_id.clone(),
            started_at,
            context.clock.now(),
            outcomes
        );
        info!(run = %report.run_id, counts = ?report.counts, "run finished");
        Ok(report)
    }
}

impl Pipeline {
    async fn run_check(&self, check: &CheckDefinition, context: &RunContext) -> CheckReport {
        let started = Instant::now();
        let span = info_span!("check", check = %check.name);
        let mut report = self.evaluate(check, context).instrument(span).await;
        report.duration_ms = started.elapsed().as_millis() as u64;
        info!(
            check = %report.check,
            outcome = %report.outcome,
            attempts = report.attempts,
            duration_ms = report.duration_ms,
            "check finished"
        );
        report
    }

    async fn evaluate(&self, check: &CheckDefinition, context: &RunContext) -> CheckReport {
        let mut report = CheckReport::new(check.name.clone(), CheckOutcome::NoFinding);

        let compiled = match &check.sql {
            Some(sql) => compile_inline(check, sql, self.settings.dialect),
            None => {
                context.budget.acquire().await;
                let request = SynthesisRequest::for_check(check, context.schema_hint.as_deref());
                self.synthesizer.synthesize(&request).await
            }
        };
        let compiled = match compiled {
            Ok(compiled) => compiled,
            Err(e) => {
                warn!(error = %e, "SQL generation failed");
                report.outcome = CheckOutcome::Failed(FailureReason::GenerationError);
                report.error = Some(FailureDetail::new(e.kind(), e.to_string()));
                return report;
            }
        };
        debug!(model = %compiled.model, sql = %compiled.sql, "compiled query");
        report.model = Some(compiled.model.clone());
        report.sql = Some(compiled.sql.clone());

        let (result, attempts) = self.execute_with_retry(&compiled.sql).await;
        report.attempts = attempts;
        let result = match result {
            Ok(result) => result,
            Err(e) => {
                warn!(error = %e, attempts, "query execution failed");
                report.outcome = CheckOutcome::Failed(FailureReason::ExecutionError);
                report.error = Some(FailureDetail::new(e.kind(), e.to_string()));
                return report;
            }
        };
        report.row_count = Some(result.row_count);
        if result.is_empty() {
            return report;
        }

        let sample = sample_result(result, self.settings.sample_cap);
        context.budget.acquire().await;
        let verdict = self
            .classifier
            .classify(check, &sample, context.baselines.get(&check.name))
            .await;
        let finding = match verdict {
            Ok(Verdict::Finding(finding)) => finding,
            Ok(Verdict::Noise {
                reason
            }) => {
                debug!(%reason, "classified as noise");
                report.outcome = CheckOutcome::Noise;
                return report;
            }
            Err(e) => {
                warn!(error = %e, "classifier unavailable, reporting rows unclassified");
                let detail = FailureDetail::new("classification", e.to_string());
                report.error = Some(detail.clone());
                report.classification_error = Some(detail);
                unclassified_finding(check, &sample, &e.0)
            }
        };

        let admission = self.dedup.admit(
            &context.notifications,
            &finding.fingerprint,
            context.clock.now()
        );
        report.outcome = match admission {
            Admission::Duplicate {
                last_notified
            } => {
                debug!(fingerprint = %finding.fingerprint, ?last_notified, "duplicate finding");
                CheckOutcome::SuppressedDuplicate
            }
            Admission::Capped => {
                info!(fingerprint = %finding.fingerprint, "notification cap reached");
                CheckOutcome::Capped
            }
            Admission::Eligible => match self.deliver(&finding, context).await {
                Ok(()) => CheckOutcome::Notified,
                Err(detail) => {
                    report.error = Some(detail);
                    CheckOutcome::DeliveryFailed
                }
            }
        };
        report.finding = Some(finding);
        report
    }

    /// Execute with retries on transient errors. Returns the final result and
    /// the number of attempts made.
    async fn execute_with_retry(&self, sql: &str) -> (Result<QueryResult, ExecutionError>, u32) {
        let retry = &self.settings.retry;
        let query_timeout = self.settings.query_timeout;
        let mut attempts = 0;
        loop {
            attempts += 1;
            let outcome = match timeout(query_timeout, self.warehouse.execute(sql, query_timeout)).await
            {
                Ok(outcome) => outcome,
                Err(_) => Err(ExecutionError::Timeout(query_timeout))
            };
            match outcome {
                Ok(result) => return (Ok(result), attempts),
                Err(e) if e.is_transient() && attempts <= retry.max_retries => {
                    let delay = retry.delay_for(attempts);
                    warn!(
                        attempt = attempts,
                        error = %e,
                        delay_ms = delay.as_millis() as u64,
                        "transient warehouse error, retrying"
                    );
                    sleep(delay).await;
                }
                Err(e) => return (Err(e), attempts)
            }
        }
    }

    async fn deliver(&self, finding: &Finding, context: &RunContext) -> Result<(), FailureDetail> {
        let delivery = Delivery {
            sink:        Arc::clone(&self.sink),
            dedup:       Arc::clone(&self.dedup),
            clock:       Arc::clone(&context.clock),
            retry:       self.settings.retry.clone(),
            max_retries: self.settings.delivery_retries,
            fingerprint: finding.fingerprint.clone(),
            payload:     NotificationPayload::from_finding(finding)
        };
        let guard = context.notifications.begin_delivery();
        let task = tokio::spawn(
            async move {
                let _guard = guard;
                delivery.send().await
            }
            .in_current_span()
        );
        let result = match task.await {
            Ok(result) => result,
            Err(e) => Err(FailureDetail::new("delivery", e.to_string()))
        };
        if result.is_err() {
            context.notifications.release(&finding.fingerprint);
        }
        result
    }
}

/// One notification on its way to the sink.
///
/// Owns everything it needs so it can outlive the check task that started
/// it.
struct Delivery {
    sink:        Arc<dyn NotificationSink>,
    dedup:       Arc<Deduplicator>,
    clock:       Arc<dyn Clock>,
    retry:       RetryConfig,
    max_retries: u32,
    fingerprint: String,
    payload:     NotificationPayload
}

impl Delivery {
    async fn send(self) -> Result<(), FailureDetail> {
        let mut attempt = 0;
        loop {
            match self.sink.notify(&self.payload).await {
                Ok(receipt) => {
                    debug!(channel = %receipt.channel, status = ?receipt.status, "finding delivered");
                    self.dedup
                        .record_delivery(&self.fingerprint, self.clock.now())
                        .await;
                    return Ok(());
                }
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    attempt += 1;
                    let delay = self.retry.delay_for(attempt);
                    warn!(attempt, error = %e, channel = %self.sink.channel(), "delivery failed, retrying");
                    sleep(delay).await;
                }
                Err(e) => {
                    warn!(error = %e, channel = %self.sink.channel(), "delivery failed");
                    return Err(FailureDetail::new("delivery", e.to_string()));
                }
            }
        }
    }
}
