use std::path::PathBuf;

use analytics_sentinel::config::{Config, RetryConfig};

#[test]
fn test_default_config() {
    let config = Config::default();

    assert!(config.llm.api_key.is_none());
    assert!(config.llm.provider.is_none());
    assert!(config.notify.webhook_url.is_none());
    assert!(config.validate().is_ok());
}

#[test]
fn test_default_retry_config() {
    let config = Config::default();

    assert_eq!(config.retry.max_retries, 3);
    assert_eq!(config.retry.initial_delay_ms, 1000);
    assert_eq!(config.retry.backoff_factor, 2.0);
}

#[test]
fn test_default_pipeline_config() {
    let config = Config::default();

    assert_eq!(config.pipeline.concurrency, 4);
    assert_eq!(config.pipeline.sample_cap, 50);
    assert_eq!(config.pipeline.delivery_retries, 2);
    assert!(!config.pipeline.synthesis_cache);
    assert_eq!(config.dedup.cooldown_hours, 24);
    assert_eq!(config.dedup.max_notifications, 20);
}

#[test]
fn test_retry_delay_backoff() {
    let retry = RetryConfig {
        max_retries:      5,
        initial_delay_ms: 100,
        max_delay_ms:     1000,
        backoff_factor:   2.0
    };

    assert_eq!(retry.delay_for(1).as_millis(), 100);
    assert_eq!(retry.delay_for(2).as_millis(), 200);
    assert_eq!(retry.delay_for(3).as_millis(), 400);
    assert_eq!(retry.delay_for(10).as_millis(), 1000);
}

#[test]
fn test_from_toml_sections() {
    let config = Config::from_toml(
        r#"
        [llm]
        provider = "anthropic"
        model = "claude-sonnet-4-20250514"

        [pipeline]
        concurrency = 2
        sample_cap = 25

        [dedup]
        cooldown_hours = 12
        state_file = "/var/lib/sentinel/state.json"

        [warehouse]
        project = "acme"
        dataset = "analytics"
        table = "events"

        [notify]
        webhook_url = "https://hooks.example.com/x"
        style = "json"
        "#
    )
    .unwrap();

    assert_eq!(config.llm.provider.as_deref(), Some("anthropic"));
    assert_eq!(config.pipeline.concurrency, 2);
    assert_eq!(config.pipeline.sample_cap, 25);
    assert_eq!(config.pipeline.run_timeout_secs, 900);
    assert_eq!(config.dedup.cooldown_hours, 12);
    assert_eq!(
        config.dedup.state_file,
        Some(PathBuf::from("/var/lib/sentinel/state.json"))
    );
    assert_eq!(config.dedup.max_notifications, 20);
    assert_eq!(
        config.warehouse.table_ref().as_deref(),
        Some("acme.analytics.events")
    );
    assert_eq!(config.notify.style.as_deref(), Some("json"));
}

#[test]
fn test_from_toml_invalid() {
    assert!(Config::from_toml("[pipeline]\nconcurrency = \"many\"").is_err());
}

#[test]
fn test_table_ref_requires_all_parts() {
    let config = Config::from_toml("[warehouse]\nproject = \"acme\"").unwrap();
    assert!(config.warehouse.table_ref().is_none());
}

#[test]
fn test_validate_rejects_zero_concurrency() {
    let mut config = Config::default();
    config.pipeline.concurrency = 0;
    assert!(config.validate().is_err());
}

#[test]
fn test_validate_rejects_hard_timeout_below_run_timeout() {
    let mut config = Config::default();
    config.pipeline.hard_timeout_secs = 60;
    config.pipeline.run_timeout_secs = 120;
    assert!(config.validate().is_err());
}

#[test]
fn test_validate_rejects_shrinking_backoff() {
    let mut config = Config::default();
    config.retry.backoff_factor = 0.5;
    assert!(config.validate().is_err());
}
