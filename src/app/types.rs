//! Application types for CLI commands.
//!
//! Parameters handed from the argument parser to the command runners, and
//! the rendered result they hand back.

use std::path::PathBuf;

use crate::cli::{Format, Provider};

/// Parameters for the run command.
///
/// Every optional field falls back to the configuration file and then to
/// the built-in defaults.
///
/// # Example
///
/// ```
/// use std::path::PathBuf;
///
/// use analytics_sentinel::{app::RunParams, cli::Format};
///
/// let params = RunParams {
///     checks_path: PathBuf::from("checks.yaml"),
///     provider:    None,
///     api_key:     None,
///     model:       None,
///     ollama_url:  None,
///     schedule:    Some("daily".to_string()),
///     only:        vec![],
///     concurrency: None,
///     format:      Format::Text,
///     dry_run:     true,
///     no_color:    true,
///     verbose:     false
/// };
/// assert!(params.dry_run);
/// ```
#[derive(Debug, Clone)]
pub struct RunParams {
    /// Path to the YAML check catalog.
    pub checks_path: PathBuf,
    /// LLM provider used for SQL generation and classification.
    pub provider:    Option<Provider>,
    /// API key for cloud LLM providers (OpenAI, Anthropic).
    pub api_key:     Option<String>,
    /// Model name to use.
    pub model:       Option<String>,
    /// Base URL for Ollama server.
    pub ollama_url:  Option<String>,
    /// Only run checks carrying this schedule tag.
    pub schedule:    Option<String>,
    /// Only run the named checks.
    pub only:        Vec<String>,
    /// Worker count override.
    pub concurrency: Option<usize>,
    /// Report format.
    pub format:      Format,
    /// Log findings instead of sending them; keep the state file untouched.
    pub dry_run:     bool,
    /// Disable colored terminal output.
    pub no_color:    bool,
    /// Per-check details in the report.
    pub verbose:     bool
}

/// Parameters for the checks command.
#[derive(Debug, Clone)]
pub struct ChecksParams {
    pub checks_path: PathBuf,
    pub verbose:     bool,
    pub no_color:    bool
}

/// Rendered command result.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// Process exit code (0 clean, 1 findings, 2 failures).
    pub exit_code: i32,
    /// Text for stdout.
    pub output:    String
}
