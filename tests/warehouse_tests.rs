use analytics_sentinel::{
    error::ExecutionError,
    warehouse::{Column, QueryResult, ResultLimits, Row}
};
use serde_json::json;

#[test]
fn test_from_rows_takes_columns_from_first_row() {
    let mut row = Row::new();
    row.insert("event_date".to_string(), json!("2025-06-01"));
    row.insert("events".to_string(), json!(120));

    let result = QueryResult::from_rows(vec![row.clone(), row]);

    assert_eq!(result.row_count, 2);
    assert!(!result.is_empty());
    assert_eq!(
        result.columns,
        vec![Column::new("event_date", "UNKNOWN"), Column::new("events", "UNKNOWN")]
    );
}

#[test]
fn test_from_rows_empty() {
    let result = QueryResult::from_rows(Vec::new());
    assert!(result.is_empty());
    assert!(result.columns.is_empty());
}

#[test]
fn test_limits_allow_exact_ceiling() {
    let limits = ResultLimits {
        max_rows:  100,
        max_bytes: 1024
    };
    assert!(limits.check_rows(100).is_ok());
    assert!(limits.check_bytes(1024).is_ok());
}

#[test]
fn test_limits_reject_oversized_results() {
    let limits = ResultLimits {
        max_rows:  100,
        max_bytes: 1024
    };
    assert!(matches!(
        limits.check_rows(101),
        Err(ExecutionError::ResultTooLarge {
            actual: 101,
            unit: "rows",
            ..
        })
    ));
    assert!(matches!(
        limits.check_bytes(4096),
        Err(ExecutionError::ResultTooLarge {
            actual: 4096,
            unit: "bytes",
            ..
        })
    ));
}

#[test]
fn test_default_limits() {
    let limits = ResultLimits::default();
    assert_eq!(limits.max_rows, 10_000);
    assert_eq!(limits.max_bytes, 16 * 1024 * 1024);
}
