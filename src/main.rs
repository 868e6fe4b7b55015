//! # Analytics Sentinel
//!
//! Scheduled, LLM-driven checks over an analytics event warehouse.
//!
//! Each check in a YAML catalog is a plain-English question ("did the event
//! volume drop by more than half?"). For every check the sentinel asks a
//! language model for a read-only SQL query, runs it against BigQuery, asks
//! the model to classify any rows that come back, and posts findings to a
//! webhook. Identical findings are held back for a cooldown period and each
//! run sends at most a fixed number of notifications.
//!
//! # Quick Start
//!
//! ```bash
//! # List the catalog, validating inline SQL
//! analytics-sentinel checks -c checks.yaml
//!
//! # Run the daily checks, logging findings instead of posting them
//! export BIGQUERY_PROJECT=my-project BIGQUERY_ACCESS_TOKEN=$(gcloud auth print-access-token)
//! analytics-sentinel run -c checks.yaml --schedule daily --dry-run
//!
//! # Post to Slack with Anthropic as the model provider
//! export LLM_API_KEY="sk-ant-..." SLACK_WEBHOOK_URL="https://hooks.slack.com/..."
//! analytics-sentinel run -c checks.yaml --provider anthropic -f json
//! ```
//!
//! # Configuration
//!
//! Configuration is loaded from (in order of precedence):
//!
//! 1. Command-line arguments
//! 2. Environment variables (`LLM_API_KEY`, `BIGQUERY_PROJECT`, etc.)
//! 3. `.analytics-sentinel.toml` in current directory
//! 4. `~/.config/analytics-sentinel/config.toml`
//!
//! ## Example Configuration
//!
//! ```toml
//! [llm]
//! provider = "anthropic"
//! model = "claude-sonnet-4-20250514"
//!
//! [warehouse]
//! project = "my-project"
//! dataset = "analytics"
//! table = "events"
//!
//! [pipeline]
//! concurrency = 4
//! run_timeout_secs = 900
//!
//! [dedup]
//! cooldown_hours = 24
//! max_notifications = 20
//!
//! [notify]
//! style = "slack"
//! ```
//!
//! # Logging
//!
//! Logs go to stderr. The filter is read from `SENTINEL_LOG`
//! (e.g. `SENTINEL_LOG=analytics_sentinel=debug`) and defaults to `info`, or
//! `debug` with `--verbose`.
//!
//! # Exit Codes
//!
//! - `0` - Every check ran and nothing needed attention
//! - `1` - Findings were delivered or held back by the notification cap
//! - `2` - A check failed, timed out or could not be delivered, or the run
//!   could not start

use std::process;

use analytics_sentinel::{
    app::{ChecksParams, RunParams, list_checks, run_checks},
    cli::{Cli, Commands},
    config::Config,
    error::AppResult
};
use clap::Parser;
use tokio::main;
use tracing_subscriber::EnvFilter;

#[main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose());
    match run(cli).await {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(2);
        }
    }
}

fn init_tracing(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_env("SENTINEL_LOG").unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

async fn run(cli: Cli) -> AppResult<i32> {
    let result = match cli.command {
        Commands::Run {
            checks,
            provider,
            api_key,
            model,
            ollama_url,
            schedule,
            only,
            concurrency,
            format,
            dry_run,
            no_color,
            verbose
        } => {
            let config = Config::load()?;
            let params = RunParams {
                checks_path: checks,
                provider,
                api_key,
                model,
                ollama_url,
                schedule,
                only,
                concurrency,
                format,
                dry_run,
                no_color,
                verbose
            };
            run_checks(params, config).await?
        }
        Commands::Checks {
            checks,
            verbose,
            no_color
        } => list_checks(ChecksParams {
            checks_path: checks,
            verbose,
            no_color
        })?
    };
    println!("{}", result.output);
    Ok(result.exit_code)
}
