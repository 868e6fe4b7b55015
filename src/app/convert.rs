//! Type conversion functions for CLI to internal types.
//!
//! This module translates CLI-facing types (from the `cli` module) and
//! configuration strings into the domain types used by the pipeline.

use crate::{
    cli::{Format, Provider},
    error::{AppResult, config_error},
    notify::WebhookStyle,
    output::OutputFormat
};

/// Converts a CLI format enum to the internal output format type.
///
/// # Example
///
/// ```
/// use analytics_sentinel::{app::convert_format, cli::Format, output::OutputFormat};
///
/// assert!(matches!(convert_format(Format::Json), OutputFormat::Json));
/// ```
pub fn convert_format(format: Format) -> OutputFormat {
    match format {
        Format::Text => OutputFormat::Text,
        Format::Json => OutputFormat::Json,
        Format::Yaml => OutputFormat::Yaml
    }
}

/// Resolves the provider from the command line, then the config file.
///
/// Falls back to Ollama, which needs no API key. An unknown provider name in
/// the config file is an error rather than a silent fallback.
///
/// # Example
///
/// ```
/// use analytics_sentinel::{app::convert_provider, cli::Provider};
///
/// assert_eq!(convert_provider(None, Some("anthropic")).unwrap(), Provider::Anthropic);
/// assert_eq!(convert_provider(Some(Provider::OpenAI), Some("ollama")).unwrap(), Provider::OpenAI);
/// assert!(convert_provider(None, Some("mystery")).is_err());
/// ```
pub fn convert_provider(cli: Option<Provider>, configured: Option<&str>) -> AppResult<Provider> {
    if let Some(provider) = cli {
        return Ok(provider);
    }
    match configured {
        Some(name) => Provider::from_name(name)
            .ok_or_else(|| config_error(format!("Unknown LLM provider '{}'", name))),
        None => Ok(Provider::Ollama)
    }
}

/// Converts the configured webhook style, defaulting to Slack.
pub fn convert_webhook_style(style: Option<&str>) -> AppResult<WebhookStyle> {
    match style {
        Some(name) => WebhookStyle::parse(name)
            .ok_or_else(|| config_error(format!("Unknown notify.style '{}'", name))),
        None => Ok(WebhookStyle::Slack)
    }
}
