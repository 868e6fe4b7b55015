// SPDX-FileCopyrightText: 2025 RAprogramm
// SPDX-License-Identifier: MIT

use std::path::PathBuf;

use analytics_sentinel::cli::{Cli, Commands, Format, Provider};
use clap::Parser;

#[test]
fn test_provider_default_model_openai() {
    assert_eq!(Provider::OpenAI.default_model(), "gpt-4");
}

#[test]
fn test_provider_default_model_anthropic() {
    assert_eq!(Provider::Anthropic.default_model(), "claude-sonnet-4-20250514");
}

#[test]
fn test_provider_default_model_ollama() {
    assert_eq!(Provider::Ollama.default_model(), "llama3.2");
}

#[test]
fn test_provider_from_name() {
    assert_eq!(Provider::from_name("OpenAI"), Some(Provider::OpenAI));
    assert_eq!(Provider::from_name(" anthropic "), Some(Provider::Anthropic));
    assert_eq!(Provider::from_name("ollama"), Some(Provider::Ollama));
    assert_eq!(Provider::from_name("gemini"), None);
}

#[test]
fn test_parse_run_defaults() {
    let cli = Cli::try_parse_from(["analytics-sentinel", "run", "-c", "checks.yaml"]).unwrap();
    assert!(!cli.verbose());

    let Commands::Run {
        checks,
        provider,
        only,
        concurrency,
        format,
        dry_run,
        no_color,
        ..
    } = cli.command
    else {
        panic!("expected run command");
    };
    assert_eq!(checks, PathBuf::from("checks.yaml"));
    assert!(provider.is_none());
    assert!(only.is_empty());
    assert!(concurrency.is_none());
    assert!(matches!(format, Format::Text));
    assert!(!dry_run);
    assert!(!no_color);
}

#[test]
fn test_parse_run_options() {
    let cli = Cli::try_parse_from([
        "analytics-sentinel",
        "run",
        "--checks",
        "checks.yaml",
        "--provider",
        "anthropic",
        "--schedule",
        "daily",
        "--only",
        "event_volume_drop",
        "null_platform",
        "--concurrency",
        "2",
        "-f",
        "json",
        "--dry-run",
        "-v"
    ])
    .unwrap();
    assert!(cli.verbose());

    let Commands::Run {
        provider,
        schedule,
        only,
        concurrency,
        format,
        dry_run,
        ..
    } = cli.command
    else {
        panic!("expected run command");
    };
    assert_eq!(provider, Some(Provider::Anthropic));
    assert_eq!(schedule.as_deref(), Some("daily"));
    assert_eq!(only, vec!["event_volume_drop", "null_platform"]);
    assert_eq!(concurrency, Some(2));
    assert!(matches!(format, Format::Json));
    assert!(dry_run);
}

#[test]
fn test_parse_checks_command() {
    let cli = Cli::try_parse_from([
        "analytics-sentinel",
        "checks",
        "-c",
        "catalog.yaml",
        "--no-color",
        "--verbose"
    ])
    .unwrap();
    assert!(cli.verbose());
    assert!(matches!(
        cli.command,
        Commands::Checks {
            no_color: true,
            ..
        }
    ));
}

#[test]
fn test_run_requires_catalog() {
    assert!(Cli::try_parse_from(["analytics-sentinel", "run"]).is_err());
}

#[test]
fn test_unknown_format_rejected() {
    assert!(
        Cli::try_parse_from(["analytics-sentinel", "run", "-c", "c.yaml", "-f", "sarif"]).is_err()
    );
}
