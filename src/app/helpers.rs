//! Helper functions for CLI operations.
//!
//! Small, pure pieces of the command wiring: resolving effective settings
//! from flags and configuration, building the LLM provider and output
//! options.

use std::{fs::read_to_string, time::Duration};

use chrono::Duration as CooldownDuration;
use tracing::warn;

use super::convert::convert_format;
use crate::{
    cli::{Format, Provider},
    config::Config,
    error::{AppResult, config_error},
    llm::LlmProvider,
    orchestrator::PipelineSettings,
    output::OutputOptions,
    warehouse::{BigQueryClient, ResultLimits}
};

/// Builds an [`LlmProvider`] from the resolved CLI parameters.
///
/// # Errors
///
/// Returns a configuration error when OpenAI or Anthropic is selected
/// without an API key.
///
/// # Example
///
/// ```
/// use analytics_sentinel::{app::build_llm_provider, cli::Provider};
///
/// let provider = build_llm_provider(
///     Provider::Ollama,
///     None,
///     "llama3.2".to_string(),
///     "http://localhost:11434".to_string()
/// );
/// assert!(provider.is_ok());
///
/// let missing_key = build_llm_provider(
///     Provider::OpenAI,
///     None,
///     "gpt-4".to_string(),
///     String::new()
/// );
/// assert!(missing_key.is_err());
/// ```
pub fn build_llm_provider(
    provider: Provider,
    api_key: Option<String>,
    model: String,
    ollama_url: String
) -> AppResult<LlmProvider> {
    match provider {
        Provider::OpenAI => {
            let key = api_key.ok_or_else(|| {
                config_error("API key required for OpenAI (use --api-key or LLM_API_KEY)")
            })?;
            Ok(LlmProvider::OpenAI {
                api_key: key,
                model
            })
        }
        Provider::Anthropic => {
            let key = api_key.ok_or_else(|| {
                config_error("API key required for Anthropic (use --api-key or LLM_API_KEY)")
            })?;
            Ok(LlmProvider::Anthropic {
                api_key: key,
                model
            })
        }
        Provider::Ollama => Ok(LlmProvider::Ollama {
            base_url: ollama_url,
            model
        })
    }
}

/// Picks the model: CLI flag, then config, then the provider default.
///
/// # Example
///
/// ```
/// use analytics_sentinel::{app::get_effective_model, cli::Provider};
///
/// assert_eq!(get_effective_model(None, None, &Provider::Ollama), "llama3.2");
/// assert_eq!(
///     get_effective_model(None, Some("mistral".into()), &Provider::Ollama),
///     "mistral"
/// );
/// ```
pub fn get_effective_model(
    model: Option<String>,
    config_model: Option<String>,
    provider: &Provider
) -> String {
    model
        .or(config_model)
        .unwrap_or_else(|| provider.default_model().to_string())
}

/// Picks the Ollama URL: CLI flag, then config, then localhost.
pub fn get_effective_ollama_url(url: Option<String>, config_url: Option<String>) -> String {
    url.or(config_url)
        .unwrap_or_else(|| String::from("http://localhost:11434"))
}

/// Creates output options from CLI flags.
pub fn create_output_options(format: Format, no_color: bool, verbose: bool) -> OutputOptions {
    OutputOptions {
        format: convert_format(format),
        colored: !no_color,
        verbose
    }
}

/// Pipeline settings from configuration with an optional worker override.
///
/// # Errors
///
/// Returns a configuration error for a concurrency of zero.
pub fn build_settings(config: &Config, concurrency: Option<usize>) -> AppResult<PipelineSettings> {
    let mut settings = PipelineSettings::from_config(config);
    if let Some(workers) = concurrency {
        if workers == 0 {
            return Err(config_error("--concurrency must be at least 1"));
        }
        settings.concurrency = workers;
    }
    Ok(settings)
}

/// Cooldown window from configuration.
pub fn cooldown(config: &Config) -> CooldownDuration {
    i64::try_from(config.dedup.cooldown_hours)
        .ok()
        .and_then(CooldownDuration::try_hours)
        .unwrap_or(CooldownDuration::MAX)
}

/// Builds the BigQuery client when a project and token are configured.
pub fn build_warehouse(config: &Config) -> AppResult<BigQueryClient> {
    let warehouse = &config.warehouse;
    let project = warehouse.project.clone().ok_or_else(|| {
        config_error("warehouse.project is required (or set BIGQUERY_PROJECT)")
    })?;
    let token = warehouse.access_token.clone().ok_or_else(|| {
        config_error("warehouse.access_token is required (or set BIGQUERY_ACCESS_TOKEN)")
    })?;
    let limits = ResultLimits {
        max_rows:  config.pipeline.max_rows,
        max_bytes: config.pipeline.max_bytes
    };
    Ok(BigQueryClient::new(project, token)
        .with_location(warehouse.location.clone())
        .with_limits(limits))
}

/// Schema description for the SQL generator.
///
/// A configured `schema_file` wins; otherwise the table metadata is fetched
/// from the warehouse. Failures only cost prompt quality, so they are logged
/// and yield `None`.
pub async fn load_schema_hint(config: &Config, client: &BigQueryClient) -> Option<String> {
    let warehouse = &config.warehouse;
    if let Some(path) = &warehouse.schema_file {
        return match read_to_string(path) {
            Ok(text) => Some(text),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "cannot read schema file");
                None
            }
        };
    }
    let (Some(dataset), Some(table)) = (&warehouse.dataset, &warehouse.table) else {
        return None;
    };
    match tokio::time::timeout(Duration::from_secs(60), client.describe_table(dataset, table)).await {
        Ok(Ok(schema)) => Some(schema.to_hint()),
        Ok(Err(e)) => {
            warn!(error = %e, "cannot describe warehouse table");
            None
        }
        Err(_) => {
            warn!("describing warehouse table timed out");
            None
        }
    }
}
