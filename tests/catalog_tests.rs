// SPDX-FileCopyrightText: 2025 RAprogramm
// SPDX-License-Identifier: MIT

use std::io::Write;

use analytics_sentinel::{
    catalog::{Catalog, CheckDefinition},
    finding::{Category, Severity}
};
use tempfile::NamedTempFile;

const CATALOG: &str = r#"
checks:
  - name: event_volume_drop
    description: Daily event count dropped more than 50% versus the 7 day average
    schedule: daily
    severity:
      problem: critical
  - name: missing_consent_state
    description: Events from EU countries without a consent_state value
    enabled: false
  - name: null_platform
    description: Events with a null platform
    schedule: hourly
    sql: SELECT event_name FROM events WHERE platform IS NULL
"#;

#[test]
fn test_from_yaml_preserves_order_and_fields() {
    let catalog = Catalog::from_yaml(CATALOG).unwrap();

    assert_eq!(catalog.len(), 3);
    let names: Vec<&str> = catalog.checks().iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["event_volume_drop", "missing_consent_state", "null_platform"]);

    let first = &catalog.checks()[0];
    assert!(first.enabled);
    assert_eq!(first.schedule.as_deref(), Some("daily"));
    assert_eq!(first.severity.get(&Category::Problem), Some(&Severity::Critical));
    assert!(!catalog.checks()[1].enabled);
    assert!(catalog.checks()[2].sql.is_some());
}

#[test]
fn test_runnable_skips_disabled() {
    let catalog = Catalog::from_yaml(CATALOG).unwrap();
    let runnable: Vec<&str> = catalog
        .runnable(None, &[])
        .map(|c| c.name.as_str())
        .collect();
    assert_eq!(runnable, vec!["event_volume_drop", "null_platform"]);
}

#[test]
fn test_runnable_by_schedule() {
    let catalog = Catalog::from_yaml(CATALOG).unwrap();
    let hourly: Vec<&str> = catalog
        .runnable(Some("HOURLY"), &[])
        .map(|c| c.name.as_str())
        .collect();
    assert_eq!(hourly, vec!["null_platform"]);
}

#[test]
fn test_runnable_by_name() {
    let catalog = Catalog::from_yaml(CATALOG).unwrap();
    let only = vec!["event_volume_drop".to_string(), "missing_consent_state".to_string()];
    let selected: Vec<&str> = catalog
        .runnable(None, &only)
        .map(|c| c.name.as_str())
        .collect();
    assert_eq!(selected, vec!["event_volume_drop"]);
}

#[test]
fn test_empty_catalog_is_error() {
    assert!(Catalog::from_yaml("checks: []").is_err());
    assert!(Catalog::from_yaml("{}").is_err());
}

#[test]
fn test_duplicate_names_are_error() {
    let yaml = r#"
checks:
  - name: a
    description: first
  - name: a
    description: second
"#;
    assert!(Catalog::from_yaml(yaml).is_err());
}

#[test]
fn test_empty_name_is_error() {
    let result = Catalog::new(vec![CheckDefinition::new("  ", "whatever")]);
    assert!(result.is_err());
}

#[test]
fn test_check_without_description_or_sql_is_error() {
    let result = Catalog::new(vec![CheckDefinition::new("silent", "")]);
    assert!(result.is_err());
}

#[test]
fn test_invalid_yaml_is_error() {
    assert!(Catalog::from_yaml("checks: [name: ").is_err());
}

#[test]
fn test_load_from_file() {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "{}", CATALOG).unwrap();

    let catalog = Catalog::load(file.path()).unwrap();
    assert_eq!(catalog.len(), 3);
}

#[test]
fn test_load_missing_file() {
    assert!(Catalog::load(std::path::Path::new("/nonexistent/checks.yaml")).is_err());
}

#[test]
fn test_matches_schedule() {
    let mut check = CheckDefinition::new("c", "d");
    assert!(check.matches_schedule(None));
    assert!(!check.matches_schedule(Some("daily")));
    check.schedule = Some("Daily".to_string());
    assert!(check.matches_schedule(Some("daily")));
}
