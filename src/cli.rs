use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// Analytics Sentinel - LLM-driven data-quality checks over an analytics
/// warehouse
#[derive(Parser, Debug)]
#[command(name = "analytics-sentinel")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands
}

impl Cli {
    /// Whether the selected command asked for verbose output
    pub fn verbose(&self) -> bool {
        match &self.command {
            Commands::Run {
                verbose, ..
            }
            | Commands::Checks {
                verbose, ..
            } => *verbose
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the checks of a catalog and notify about findings
    Run {
        /// Path to the YAML check catalog
        #[arg(short, long)]
        checks: PathBuf,

        /// LLM provider to use
        #[arg(short, long, value_enum)]
        provider: Option<Provider>,

        /// API key for OpenAI or Anthropic
        #[arg(short, long, env = "LLM_API_KEY")]
        api_key: Option<String>,

        /// Model name
        #[arg(short, long)]
        model: Option<String>,

        /// Ollama base URL
        #[arg(long)]
        ollama_url: Option<String>,

        /// Only run checks with this schedule tag
        #[arg(long)]
        schedule: Option<String>,

        /// Only run the named checks
        #[arg(long, num_args = 1..)]
        only: Vec<String>,

        /// Number of checks run at the same time
        #[arg(long)]
        concurrency: Option<usize>,

        /// Output format
        #[arg(short = 'f', long, value_enum, default_value = "text")]
        format: Format,

        /// Log findings instead of sending them and leave the state file
        /// untouched
        #[arg(long)]
        dry_run: bool,

        /// Disable colored output
        #[arg(long)]
        no_color: bool,

        /// Debug logging and per-check details in the report
        #[arg(short, long)]
        verbose: bool
    },

    /// List the checks of a catalog
    Checks {
        /// Path to the YAML check catalog
        #[arg(short, long)]
        checks: PathBuf,

        /// Show severity overrides
        #[arg(short, long)]
        verbose: bool,

        /// Disable colored output
        #[arg(long)]
        no_color: bool
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Provider {
    OpenAI,
    Anthropic,
    Ollama
}

impl Provider {
    /// Get default model for provider
    pub fn default_model(&self) -> &str {
        match self {
            Self::OpenAI => "gpt-4",
            Self::Anthropic => "claude-sonnet-4-20250514",
            Self::Ollama => "llama3.2"
        }
    }

    /// Parse a provider name from configuration
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "openai" => Some(Self::OpenAI),
            "anthropic" => Some(Self::Anthropic),
            "ollama" => Some(Self::Ollama),
            _ => None
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum Format {
    Text,
    Json,
    Yaml
}
