//! Command execution.
//!
//! `run_checks` assembles the pipeline from configuration: one LLM client
//! shared by the synthesizer and the classifier, the BigQuery client, the
//! state file behind the deduplicator and the notification sink. Dry runs
//! swap the state file for memory and the webhook for the log.

use std::{sync::Arc, time::Duration};

use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use super::{
    convert::{convert_provider, convert_webhook_style},
    helpers::{
        build_llm_provider, build_settings, build_warehouse, cooldown, create_output_options,
        get_effective_model, get_effective_ollama_url, load_schema_hint
    },
    types::{ChecksParams, CommandOutput, RunParams}
};
use crate::{
    catalog::Catalog,
    classifier::LlmClassifier,
    cli::Format,
    config::Config,
    context::{GenerationBudget, RunContext},
    dedup::{DedupStore, Deduplicator, MemoryDedupStore},
    error::{AppResult, state_error},
    llm::{GenerationBackend, LlmClient},
    notify::{LogSink, NotificationSink, WebhookSink},
    orchestrator::CheckOrchestrator,
    output::{format_catalog, format_run_report},
    query::SqlDialect,
    state::FileStateStore,
    synth::{CachingSynthesizer, LlmSynthesizer, QuerySynthesizer}
};

/// Run the checks of a catalog and render the report.
///
/// # Errors
///
/// Catalog or configuration problems, an unreadable state file and a run
/// overrunning its hard timeout. Failures of individual checks are part of
/// the report instead.
pub async fn run_checks(params: RunParams, config: Config) -> AppResult<CommandOutput> {
    let catalog = Catalog::load(&params.checks_path)?;
    let settings = build_settings(&config, params.concurrency)?;

    let provider = convert_provider(params.provider, config.llm.provider.as_deref())?;
    let model = get_effective_model(params.model, config.llm.model.clone(), &provider);
    let ollama_url = get_effective_ollama_url(params.ollama_url, config.llm.ollama_url.clone());
    let api_key = params.api_key.or_else(|| config.llm.api_key.clone());
    let llm_provider = build_llm_provider(provider, api_key, model, ollama_url)?;
    let backend: Arc<dyn GenerationBackend> = Arc::new(LlmClient::with_retry_config(
        llm_provider,
        config.retry.clone()
    ));

    let bigquery = build_warehouse(&config)?;
    let schema_hint = load_schema_hint(&config, &bigquery).await;

    let llm_synth = LlmSynthesizer::new(Arc::clone(&backend)).with_dialect(settings.dialect);
    let synthesizer: Arc<dyn QuerySynthesizer> = if config.pipeline.synthesis_cache {
        Arc::new(CachingSynthesizer::new(llm_synth, catalog.len().max(16)))
    } else {
        Arc::new(llm_synth)
    };

    let state = if params.dry_run {
        None
    } else {
        match &config.dedup.state_file {
            Some(path) => Some(Arc::new(FileStateStore::open(path)?)),
            None => None
        }
    };
    let store: Arc<dyn DedupStore> = match &state {
        Some(state) => Arc::clone(state) as Arc<dyn DedupStore>,
        None => Arc::new(MemoryDedupStore::new())
    };
    let dedup = Arc::new(Deduplicator::new(store, cooldown(&config)));

    let sink: Arc<dyn NotificationSink> = match (&config.notify.webhook_url, params.dry_run) {
        (Some(url), false) => Arc::new(WebhookSink::new(
            url.clone(),
            convert_webhook_style(config.notify.style.as_deref())?
        )),
        (None, false) => {
            warn!("no webhook configured, findings are only logged");
            Arc::new(LogSink)
        }
        (_, true) => Arc::new(LogSink)
    };

    let baselines = state.as_ref().map(|s| s.baselines()).unwrap_or_default();
    let context = RunContext::new(GenerationBudget::per_minute(
        config.pipeline.generation_calls_per_minute
    ))
    .with_schema_hint(schema_hint)
    .with_baselines(baselines)
    .with_schedule(params.schedule)
    .with_only(params.only);

    let orchestrator = CheckOrchestrator::new(
        synthesizer,
        Arc::new(bigquery),
        Arc::new(LlmClassifier::new(backend)),
        dedup,
        sink
    )
    .with_settings(settings);

    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
        pb.set_style(style);
    }
    pb.set_message(format!("Running {} check(s)...", catalog.len()));
    pb.enable_steady_tick(Duration::from_millis(100));

    let report = orchestrator.run(&catalog, &context).await;
    pb.finish_and_clear();
    let report = report?;

    if let Some(state) = &state {
        state.record_baselines(report.observations());
        let saver = Arc::clone(state);
        tokio::task::spawn_blocking(move || saver.save())
            .await
            .map_err(|e| state_error(format!("state save task failed: {}", e)))??;
        info!(path = %state.path().display(), "state saved");
    }

    let opts = create_output_options(params.format, params.no_color, params.verbose);
    Ok(CommandOutput {
        exit_code: report.exit_code(),
        output:    format_run_report(&report, &opts)
    })
}

/// List the checks of a catalog.
///
/// # Errors
///
/// The catalog cannot be read or is invalid.
pub fn list_checks(params: ChecksParams) -> AppResult<CommandOutput> {
    let catalog = Catalog::load(&params.checks_path)?;
    let opts = create_output_options(Format::Text, params.no_color, params.verbose);
    Ok(CommandOutput {
        exit_code: 0,
        output:    format_catalog(&catalog, SqlDialect::BigQuery, &opts)
    })
}
