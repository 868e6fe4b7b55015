// SPDX-FileCopyrightText: 2025 RAprogramm
// SPDX-License-Identifier: MIT

use std::time::Duration;

use analytics_sentinel::error::{
    AppError, DeliveryError, ExecutionError, StoreError, SynthesisError, catalog_error,
    config_error, file_read_error, llm_api_error, run_timeout_error, state_error, warehouse_error
};

#[test]
fn test_file_read_error() {
    let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
    let error = file_read_error("/path/to/checks.yaml", io_error);
    let _msg = error.to_string();
}

#[test]
fn test_app_error_constructors() {
    let _msg = catalog_error("duplicate check name").to_string();
    let _msg = config_error("Invalid configuration value").to_string();
    let _msg = llm_api_error("API rate limit exceeded").to_string();
    let _msg = warehouse_error("tables.get returned 404").to_string();
    let _msg = state_error("corrupt file").to_string();
    let _msg = run_timeout_error(Duration::from_secs(1200)).to_string();
}

#[test]
fn test_store_error_converts_to_app_error() {
    let error: AppError = StoreError("disk full".to_string()).into();
    let _msg = error.to_string();
}

#[test]
fn test_execution_error_transience() {
    assert!(ExecutionError::Timeout(Duration::from_secs(1)).is_transient());
    assert!(ExecutionError::RateLimited("429".into()).is_transient());
    assert!(ExecutionError::Connection("reset".into()).is_transient());
    assert!(!ExecutionError::Syntax("bad".into()).is_transient());
    assert!(!ExecutionError::QuotaExceeded("daily".into()).is_transient());
    assert!(!ExecutionError::Rejected("403".into()).is_transient());
    assert!(
        !ExecutionError::ResultTooLarge {
            limit:  "row ceiling",
            actual: 20_000,
            unit:   "rows"
        }
        .is_transient()
    );
}

#[test]
fn test_execution_error_kinds() {
    assert_eq!(ExecutionError::Timeout(Duration::ZERO).kind(), "timeout");
    assert_eq!(ExecutionError::Syntax(String::new()).kind(), "syntax");
    assert_eq!(ExecutionError::QuotaExceeded(String::new()).kind(), "quota");
    assert_eq!(ExecutionError::RateLimited(String::new()).kind(), "rate_limit");
    assert_eq!(ExecutionError::Connection(String::new()).kind(), "connection");
}

#[test]
fn test_result_too_large_message() {
    let error = ExecutionError::ResultTooLarge {
        limit:  "row ceiling",
        actual: 20_000,
        unit:   "rows"
    };
    assert_eq!(error.to_string(), "result exceeds row ceiling: 20000 rows");
}

#[test]
fn test_synthesis_error_kinds() {
    assert_eq!(SynthesisError::Backend(String::new()).kind(), "backend");
    assert_eq!(SynthesisError::Malformed(String::new()).kind(), "malformed");
    assert_eq!(
        SynthesisError::PolicyViolation(String::new()).kind(),
        "policy_violation"
    );
}

#[test]
fn test_delivery_error_retryability() {
    assert!(DeliveryError::Network("reset".into()).is_retryable());
    assert!(!DeliveryError::Malformed("no title".into()).is_retryable());
    assert!(
        DeliveryError::Rejected {
            status: 503,
            body:   String::new()
        }
        .is_retryable()
    );
    assert!(
        DeliveryError::Rejected {
            status: 429,
            body:   String::new()
        }
        .is_retryable()
    );
    assert!(
        !DeliveryError::Rejected {
            status: 404,
            body:   "no_service".into()
        }
        .is_retryable()
    );
}
