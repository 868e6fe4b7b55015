//! Configuration loading and management.
//!
//! Configuration is loaded from multiple sources with the following precedence
//! (highest to lowest):
//!
//! 1. Command-line arguments
//! 2. Environment variables
//! 3. `.analytics-sentinel.toml` in current directory
//! 4. `~/.config/analytics-sentinel/config.toml`
//! 5. Default values
//!
//! # Configuration File Format
//!
//! ```toml
//! [llm]
//! provider = "openai"          # openai, anthropic, ollama
//! model = "gpt-4"
//! api_key = "sk-..."           # or use LLM_API_KEY env var
//!
//! [retry]
//! max_retries = 3
//! initial_delay_ms = 1000
//! max_delay_ms = 30000
//! backoff_factor = 2.0
//!
//! [pipeline]
//! concurrency = 4
//! run_timeout_secs = 900
//! sample_cap = 50
//!
//! [dedup]
//! cooldown_hours = 24
//! max_notifications = 20
//! state_file = ".analytics-sentinel-state.json"
//!
//! [warehouse]
//! project = "my-gcp-project"
//! dataset = "analytics"
//! table = "events"
//!
//! [notify]
//! webhook_url = "https://hooks.slack.com/services/..."
//! style = "slack"
//! ```
//!
//! # Environment Variables
//!
//! | Variable | Description |
//! |----------|-------------|
//! | `LLM_API_KEY` | API key for OpenAI/Anthropic |
//! | `LLM_PROVIDER` | Provider name |
//! | `LLM_MODEL` | Model identifier |
//! | `OLLAMA_URL` | Ollama base URL |
//! | `BIGQUERY_PROJECT` | Warehouse project id |
//! | `BIGQUERY_ACCESS_TOKEN` | OAuth bearer token for BigQuery |
//! | `SLACK_WEBHOOK_URL` | Notification webhook |

use std::{env, fs, path::PathBuf, time::Duration};

use serde::Deserialize;

use crate::error::{AppResult, config_error};

/// Application configuration
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub llm:       LlmConfig,
    #[serde(default)]
    pub retry:     RetryConfig,
    #[serde(default)]
    pub pipeline:  PipelineConfig,
    #[serde(default)]
    pub dedup:     DedupConfig,
    #[serde(default)]
    pub warehouse: WarehouseConfig,
    #[serde(default)]
    pub notify:    NotifyConfig
}

/// LLM provider configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    pub provider:   Option<String>,
    pub api_key:    Option<String>,
    pub model:      Option<String>,
    pub ollama_url: Option<String>
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider:   None,
            api_key:    None,
            model:      None,
            ollama_url: Some(String::from("http://localhost:11434"))
        }
    }
}

/// Retry configuration shared by LLM requests and warehouse execution
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries:      u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms:     u64,
    pub backoff_factor:   f64
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries:      3,
            initial_delay_ms: 1000,
            max_delay_ms:     30000,
            backoff_factor:   2.0
        }
    }
}

impl RetryConfig {
    /// Delay before retry number `retry` (1-based), capped at `max_delay_ms`.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let mut delay = self.initial_delay_ms as f64;
        for _ in 1..retry {
            delay *= self.backoff_factor;
        }
        Duration::from_millis((delay as u64).min(self.max_delay_ms))
    }
}

/// Check execution settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Number of checks run at the same time
    pub concurrency:                 usize,
    /// Soft deadline; checks still running afterwards are reported timed out
    pub run_timeout_secs:            u64,
    /// Hard ceiling; a run still going after this is abandoned
    pub hard_timeout_secs:           u64,
    /// Per-query warehouse timeout
    pub query_timeout_secs:          u64,
    /// Rows passed to the classifier
    pub sample_cap:                  usize,
    /// Row ceiling for a single query result
    pub max_rows:                    u64,
    /// Byte ceiling for a single query result
    pub max_bytes:                   u64,
    /// Shared generation-backend budget, one slot per synthesis or
    /// classification; client retries reuse the slot
    pub generation_calls_per_minute: u32,
    /// Retries for a failed notification delivery
    pub delivery_retries:            u32,
    /// Reuse generated SQL for identical (description, schema) pairs
    pub synthesis_cache:             bool
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            concurrency:                 4,
            run_timeout_secs:            900,
            hard_timeout_secs:           1200,
            query_timeout_secs:          120,
            sample_cap:                  50,
            max_rows:                    10_000,
            max_bytes:                   16 * 1024 * 1024,
            generation_calls_per_minute: 60,
            delivery_retries:            2,
            synthesis_cache:             false
        }
    }
}

/// Deduplication and volume cap settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DedupConfig {
    pub cooldown_hours:    u64,
    pub max_notifications: usize,
    pub state_file:        Option<PathBuf>
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            cooldown_hours:    24,
            max_notifications: 20,
            state_file:        Some(PathBuf::from(".analytics-sentinel-state.json"))
        }
    }
}

/// Warehouse addressing
#[derive(Debug, Clone, Deserialize, Default)]
pub struct WarehouseConfig {
    pub project:      Option<String>,
    pub dataset:      Option<String>,
    pub table:        Option<String>,
    pub access_token: Option<String>,
    pub location:     Option<String>,
    /// Plain-text schema description used instead of fetching table metadata
    pub schema_file:  Option<PathBuf>
}

impl WarehouseConfig {
    /// Fully qualified `project.dataset.table` reference, when configured.
    pub fn table_ref(&self) -> Option<String> {
        match (&self.project, &self.dataset, &self.table) {
            (Some(p), Some(d), Some(t)) => Some(format!("{}.{}.{}", p, d, t)),
            _ => None
        }
    }
}

/// Notification channel settings
#[derive(Debug, Clone, Deserialize, Default)]
pub struct NotifyConfig {
    pub webhook_url: Option<String>,
    pub style:       Option<String>
}

impl Config {
    /// Load configuration from file and environment
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables
    /// 2. Config file in current directory (.analytics-sentinel.toml)
    /// 3. Config file in home directory
    ///    (~/.config/analytics-sentinel/config.toml)
    /// 4. Default values
    pub fn load() -> AppResult<Self> {
        let mut config = Self::default();

        if let Some(home) = env::var_os("HOME") {
            let home_config = PathBuf::from(home)
                .join(".config")
                .join("analytics-sentinel")
                .join("config.toml");

            if home_config.exists() {
                config = Self::from_file(&home_config)?;
            }
        }

        let local_config = PathBuf::from(".analytics-sentinel.toml");
        if local_config.exists() {
            config = Self::from_file(&local_config)?;
        }

        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Parse a single config file
    pub fn from_file(path: &std::path::Path) -> AppResult<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| config_error(format!("Failed to read config file: {}", e)))?;
        Self::from_toml(&content)
    }

    /// Parse config from TOML text
    pub fn from_toml(content: &str) -> AppResult<Self> {
        toml::from_str(content).map_err(|e| config_error(format!("Invalid config file: {}", e)))
    }

    fn apply_env(&mut self) {
        if let Ok(api_key) = env::var("LLM_API_KEY") {
            self.llm.api_key = Some(api_key);
        }

        if let Ok(provider) = env::var("LLM_PROVIDER") {
            self.llm.provider = Some(provider);
        }

        if let Ok(model) = env::var("LLM_MODEL") {
            self.llm.model = Some(model);
        }

        if let Ok(url) = env::var("OLLAMA_URL") {
            self.llm.ollama_url = Some(url);
        }

        if let Ok(project) = env::var("BIGQUERY_PROJECT") {
            self.warehouse.project = Some(project);
        }

        if let Ok(token) = env::var("BIGQUERY_ACCESS_TOKEN") {
            self.warehouse.access_token = Some(token);
        }

        if let Ok(url) = env::var("SLACK_WEBHOOK_URL") {
            self.notify.webhook_url = Some(url);
        }
    }

    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> AppResult<()> {
        let p = &self.pipeline;
        if p.concurrency == 0 {
            return Err(config_error("pipeline.concurrency must be at least 1"));
        }
        if p.sample_cap == 0 {
            return Err(config_error("pipeline.sample_cap must be at least 1"));
        }
        if p.generation_calls_per_minute == 0 {
            return Err(config_error(
                "pipeline.generation_calls_per_minute must be at least 1"
            ));
        }
        if p.hard_timeout_secs < p.run_timeout_secs {
            return Err(config_error(
                "pipeline.hard_timeout_secs must not be shorter than run_timeout_secs"
            ));
        }
        if self.retry.backoff_factor < 1.0 {
            return Err(config_error("retry.backoff_factor must be >= 1.0"));
        }
        Ok(())
    }
}
