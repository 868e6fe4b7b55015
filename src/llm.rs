//! LLM provider integrations used as the generation backend.
//!
//! Both SQL synthesis and result classification are text-in/text-out calls to
//! a hosted model. They go through the [`GenerationBackend`] trait so the
//! pipeline never depends on a concrete provider and tests can substitute a
//! deterministic stub.
//!
//! # Supported Providers
//!
//! | Provider | Endpoint | Authentication |
//! |----------|----------|----------------|
//! | OpenAI | `api.openai.com` | Bearer token |
//! | Anthropic | `api.anthropic.com` | x-api-key header |
//! | Ollama | Local (configurable) | None |
//!
//! # Retry Behavior
//!
//! The client automatically retries on transient errors:
//! - Connection timeouts
//! - Rate limiting (429)
//! - Server errors (5xx)
//!
//! Retry delays use exponential backoff with configurable parameters.
//!
//! # Example
//!
//! ```
//! use analytics_sentinel::{
//!     config::RetryConfig,
//!     llm::{GenerationBackend, LlmClient, LlmProvider}
//! };
//!
//! let provider = LlmProvider::Ollama {
//!     base_url: "http://localhost:11434".into(),
//!     model:    "llama3.2".into()
//! };
//!
//! let client = LlmClient::with_retry_config(provider, RetryConfig::default());
//! assert_eq!(client.model_id(), "llama3.2");
//! ```

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tracing::warn;

use crate::{
    config::RetryConfig,
    error::{AppResult, http_error, llm_api_error}
};

/// One prompt for the generation backend.
#[derive(Debug, Clone, Default)]
pub struct GenerationRequest {
    /// Standing instructions (system prompt)
    pub system:      String,
    pub prompt:      String,
    /// Sampling temperature, provider default when unset
    pub temperature: Option<f32>
}

/// Text generation capability.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Identifier of the model answering requests, recorded with generated SQL
    fn model_id(&self) -> &str;

    async fn complete(&self, request: &GenerationRequest) -> AppResult<String>;
}

/// LLM provider configuration with authentication credentials.
#[derive(Debug, Clone)]
pub enum LlmProvider {
    /// OpenAI API (GPT-4, GPT-4o, etc.)
    OpenAI {
        /// API key (sk-...)
        api_key: String,
        /// Model identifier (e.g., "gpt-4")
        model:   String
    },
    /// Anthropic API (Claude models)
    Anthropic {
        /// API key
        api_key: String,
        /// Model identifier (e.g., "claude-sonnet-4-20250514")
        model:   String
    },
    /// Local Ollama instance
    Ollama {
        /// Base URL (e.g., "http://localhost:11434")
        base_url: String,
        /// Model name (e.g., "llama3.2", "sqlcoder")
        model:    String
    }
}

impl LlmProvider {
    pub fn model(&self) -> &str {
        match self {
            Self::OpenAI {
                model, ..
            }
            | Self::Anthropic {
                model, ..
            }
            | Self::Ollama {
                model, ..
            } => model
        }
    }
}

/// HTTP client for LLM API communication with retry support.
///
/// Handles provider-specific request formatting and response parsing.
/// Automatically retries transient failures with exponential backoff.
pub struct LlmClient {
    provider:     LlmProvider,
    client:       reqwest::Client,
    retry_config: RetryConfig
}

#[derive(Serialize)]
struct OpenAIRequest {
    model:       String,
    messages:    Vec<OpenAIRequestMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>
}

#[derive(Serialize)]
struct OpenAIRequestMessage {
    role:    String,
    content: String
}

#[derive(Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>
}

#[derive(Deserialize)]
struct OpenAIChoice {
    message: OpenAIResponseMessage
}

#[derive(Deserialize)]
struct OpenAIResponseMessage {
    content: Option<String>
}

#[derive(Serialize)]
struct AnthropicRequest {
    model:       String,
    max_tokens:  u32,
    #[serde(skip_serializing_if = "String::is_empty")]
    system:      String,
    messages:    Vec<AnthropicMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>
}

#[derive(Serialize)]
struct AnthropicMessage {
    role:    String,
    content: String
}

#[derive(Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContent>
}

#[derive(Deserialize)]
struct AnthropicContent {
    #[serde(default)]
    text: String
}

#[derive(Serialize)]
struct OllamaRequest {
    model:   String,
    prompt:  String,
    #[serde(skip_serializing_if = "String::is_empty")]
    system:  String,
    stream:  bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<OllamaOptions>
}

#[derive(Serialize)]
struct OllamaOptions {
    temperature: f32
}

#[derive(Deserialize)]
struct OllamaResponse {
    response: String
}

impl LlmClient {
    /// Create new LLM client with default retry configuration
    pub fn new(provider: LlmProvider) -> Self {
        Self::with_retry_config(provider, RetryConfig::default())
    }

    /// Create new LLM client with custom retry configuration
    pub fn with_retry_config(provider: LlmProvider, retry_config: RetryConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            provider,
            client,
            retry_config
        }
    }

    async fn call_with_retry(&self, request: &GenerationRequest) -> AppResult<String> {
        let mut last_error = None;
        for attempt in 0..=self.retry_config.max_retries {
            if attempt > 0 {
                let delay = self.retry_config.delay_for(attempt);
                warn!(
                    attempt = attempt + 1,
                    max = self.retry_config.max_retries + 1,
                    delay_ms = delay.as_millis() as u64,
                    "retrying LLM request"
                );
                sleep(delay).await;
            }
            match self.call_provider(request).await {
                Ok(result) => return Ok(result),
                Err(e) => {
                    if is_retryable_error(&e) {
                        last_error = Some(e);
                        continue;
                    }
                    return Err(e);
                }
            }
        }
        Err(last_error.unwrap_or_else(|| llm_api_error("All retry attempts failed")))
    }

    async fn call_provider(&self, request: &GenerationRequest) -> AppResult<String> {
        match &self.provider {
            LlmProvider::OpenAI {
                api_key,
                model
            } => self.call_openai(api_key, model, request).await,
            LlmProvider::Anthropic {
                api_key,
                model
            } => self.call_anthropic(api_key, model, request).await,
            LlmProvider::Ollama {
                base_url,
                model
            } => self.call_ollama(base_url, model, request).await
        }
    }

    async fn call_openai(
        &self,
        api_key: &str,
        model: &str,
        request: &GenerationRequest
    ) -> AppResult<String> {
        let mut messages = Vec::with_capacity(2);
        if !request.system.is_empty() {
            messages.push(OpenAIRequestMessage {
                role:    String::from("system"),
                content: request.system.clone()
            });
        }
        messages.push(OpenAIRequestMessage {
            role:    String::from("user"),
            content: request.prompt.clone()
        });
        let body = OpenAIRequest {
            model: model.to_string(),
            messages,
            temperature: request.temperature
        };
        let response = self
            .client
            .post("https://api.openai.com/v1/chat/completions")
            .header("Authorization", format!("Bearer {}", api_key))
            .json(&body)
            .send()
            .await
            .map_err(http_error)?;
        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(llm_api_error(format!(
                "OpenAI API error {}: {}",
                status, text
            )));
        }
        let result: OpenAIResponse = response.json().await.map_err(http_error)?;
        result
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .ok_or_else(|| llm_api_error("Empty response from OpenAI"))
    }

    async fn call_anthropic(
        &self,
        api_key: &str,
        model: &str,
        request: &GenerationRequest
    ) -> AppResult<String> {
        let body = AnthropicRequest {
            model:       model.to_string(),
            max_tokens:  4096,
            system:      request.system.clone(),
            messages:    vec![AnthropicMessage {
                role:    String::from("user"),
                content: request.prompt.clone()
            }],
            temperature: request.temperature
        };
        let response = self
            .client
            .post("https://api.anthropic.com/v1/messages")
            .header("x-api-key", api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&body)
            .send()
            .await
            .map_err(http_error)?;
        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(llm_api_error(format!(
                "Anthropic API error {}: {}",
                status, text
            )));
        }
        let result: AnthropicResponse = response.json().await.map_err(http_error)?;
        result
            .content
            .first()
            .map(|c| c.text.clone())
            .ok_or_else(|| llm_api_error("Empty response from Anthropic"))
    }

    async fn call_ollama(
        &self,
        base_url: &str,
        model: &str,
        request: &GenerationRequest
    ) -> AppResult<String> {
        let body = OllamaRequest {
            model:   model.to_string(),
            prompt:  request.prompt.clone(),
            system:  request.system.clone(),
            stream:  false,
            options: request.temperature.map(|temperature| OllamaOptions {
                temperature
            })
        };
        let url = format!("{}/api/generate", base_url.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(http_error)?;
        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(llm_api_error(format!(
                "Ollama API error {}: {}",
                status, text
            )));
        }
        let result: OllamaResponse = response.json().await.map_err(http_error)?;
        Ok(result.response)
    }
}

#[async_trait]
impl GenerationBackend for LlmClient {
    fn model_id(&self) -> &str {
        self.provider.model()
    }

    async fn complete(&self, request: &GenerationRequest) -> AppResult<String> {
        self.call_with_retry(request).await
    }
}

fn is_retryable_error(error: &masterror::AppError) -> bool {
    let msg = error.to_string().to_lowercase();
    msg.contains("timeout")
        || msg.contains("connection")
        || msg.contains("429")
        || msg.contains("rate limit")
        || msg.contains("500")
        || msg.contains("502")
        || msg.contains("503")
        || msg.contains("504")
}

/// Strip a surrounding markdown code fence (```` ```sql ```` or ```` ``` ````).
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = match rest.find('\n') {
        Some(newline) if !rest[..newline].contains(' ') => &rest[newline + 1..],
        _ => rest
    };
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}
