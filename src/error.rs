//! Error types and constructors.
//!
//! Application-level failures (configuration, catalog loading, state files,
//! HTTP plumbing) are [`AppError`] values built through the helpers below.
//! Each pipeline stage additionally has a typed error so the orchestrator can
//! decide on retries and record a precise failure kind in the run report.

use std::time::Duration;

pub use masterror::{AppError, AppResult};
use thiserror::Error;

/// Create file read error
pub fn file_read_error(path: &str, source: std::io::Error) -> AppError {
    AppError::internal(format!("Failed to read file '{}': {}", path, source))
}

/// Create check catalog error
pub fn catalog_error(message: impl Into<String>) -> AppError {
    AppError::bad_request(format!("Check catalog error: {}", message.into()))
}

/// Create LLM API error
pub fn llm_api_error(message: impl Into<String>) -> AppError {
    AppError::service(message.into())
}

/// Create warehouse metadata error
pub fn warehouse_error(message: impl Into<String>) -> AppError {
    AppError::service(message.into())
}

/// Create HTTP error
pub fn http_error(err: reqwest::Error) -> AppError {
    let msg = if err.is_timeout() {
        format!("Request timeout: {}", err)
    } else if err.is_connect() {
        format!("Connection failed: {}", err)
    } else if err.is_status() {
        format!("HTTP error {}: {}", err.status().unwrap_or_default(), err)
    } else {
        err.to_string()
    };
    AppError::service(msg)
}

/// Create config error
pub fn config_error(message: impl Into<String>) -> AppError {
    AppError::bad_request(message.into())
}

/// Create state store error
pub fn state_error(message: impl Into<String>) -> AppError {
    AppError::internal(format!("State store error: {}", message.into()))
}

/// Create run timeout error for a run that overran its hard ceiling
pub fn run_timeout_error(limit: Duration) -> AppError {
    AppError::internal(format!(
        "Run exceeded hard timeout of {}s and was abandoned",
        limit.as_secs()
    ))
}

/// Failure while turning a check description into SQL.
#[derive(Debug, Clone, Error)]
pub enum SynthesisError {
    /// Generation backend unreachable or returned an error status
    #[error("generation backend failed: {0}")]
    Backend(String),
    /// Backend answered but the text is not a usable SQL statement
    #[error("malformed SQL from generator: {0}")]
    Malformed(String),
    /// SQL parsed but performs a disallowed operation
    #[error("disallowed SQL: {0}")]
    PolicyViolation(String)
}

impl SynthesisError {
    /// Short machine-readable kind for reports.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Backend(_) => "backend",
            Self::Malformed(_) => "malformed",
            Self::PolicyViolation(_) => "policy_violation"
        }
    }
}

/// Failure while executing SQL against the warehouse.
#[derive(Debug, Clone, Error)]
pub enum ExecutionError {
    #[error("query timed out after {0:?}")]
    Timeout(Duration),
    #[error("SQL syntax error: {0}")]
    Syntax(String),
    #[error("warehouse quota exceeded: {0}")]
    QuotaExceeded(String),
    #[error("warehouse rate limit hit: {0}")]
    RateLimited(String),
    #[error("warehouse connection failed: {0}")]
    Connection(String),
    /// Authentication, permission or addressing problems
    #[error("warehouse rejected the request: {0}")]
    Rejected(String),
    #[error("result exceeds {limit}: {actual} {unit}")]
    ResultTooLarge {
        limit:  &'static str,
        actual: u64,
        unit:   &'static str
    }
}

impl ExecutionError {
    /// Whether another attempt may succeed without changing the query.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Timeout(_) | Self::RateLimited(_) | Self::Connection(_)
        )
    }

    /// Short machine-readable kind for reports.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Timeout(_) => "timeout",
            Self::Syntax(_) => "syntax",
            Self::QuotaExceeded(_) => "quota",
            Self::RateLimited(_) => "rate_limit",
            Self::Connection(_) => "connection",
            Self::Rejected(_) => "rejected",
            Self::ResultTooLarge {
                ..
            } => "result_too_large"
        }
    }
}

/// Failure of the classification backend.
#[derive(Debug, Clone, Error)]
#[error("classification failed: {0}")]
pub struct ClassificationError(pub String);

/// Failure to hand a finding to the notification channel.
#[derive(Debug, Clone, Error)]
pub enum DeliveryError {
    #[error("network error: {0}")]
    Network(String),
    #[error("payload rejected as malformed: {0}")]
    Malformed(String),
    #[error("channel rejected notification ({status}): {body}")]
    Rejected {
        status: u16,
        body:   String
    }
}

impl DeliveryError {
    /// Malformed payloads will not improve on retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) => true,
            Self::Malformed(_) => false,
            Self::Rejected {
                status, ..
            } => *status == 429 || *status >= 500
        }
    }
}

/// Failure of the dedup state backend.
#[derive(Debug, Error)]
#[error("state store failure: {0}")]
pub struct StoreError(pub String);

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        state_error(err.0)
    }
}
