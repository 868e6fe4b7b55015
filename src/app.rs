//! Application logic for the Analytics Sentinel CLI.
//!
//! Command wiring is kept out of the binary entry point so it can be tested.

mod convert;
mod helpers;
mod run;
mod types;

pub use convert::{convert_format, convert_provider, convert_webhook_style};
pub use helpers::{
    build_llm_provider, build_settings, build_warehouse, cooldown, create_output_options,
    get_effective_model, get_effective_ollama_url, load_schema_hint
};
pub use run::{list_checks, run_checks};
pub use types::{ChecksParams, CommandOutput, RunParams};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        cli::{Format, Provider},
        config::Config,
        llm::LlmProvider,
        notify::WebhookStyle,
        output::OutputFormat
    };

    #[test]
    fn test_convert_format_text() {
        assert!(matches!(convert_format(Format::Text), OutputFormat::Text));
    }

    #[test]
    fn test_convert_format_yaml() {
        assert!(matches!(convert_format(Format::Yaml), OutputFormat::Yaml));
    }

    #[test]
    fn test_convert_provider_defaults_to_ollama() {
        assert_eq!(convert_provider(None, None).unwrap(), Provider::Ollama);
    }

    #[test]
    fn test_convert_provider_flag_wins() {
        assert_eq!(
            convert_provider(Some(Provider::Anthropic), Some("openai")).unwrap(),
            Provider::Anthropic
        );
    }

    #[test]
    fn test_convert_webhook_style() {
        assert_eq!(convert_webhook_style(None).unwrap(), WebhookStyle::Slack);
        assert_eq!(convert_webhook_style(Some("json")).unwrap(), WebhookStyle::Json);
        assert!(convert_webhook_style(Some("pager")).is_err());
    }

    #[test]
    fn test_build_llm_provider_anthropic_requires_key() {
        let result = build_llm_provider(
            Provider::Anthropic,
            None,
            "claude".to_string(),
            String::new()
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_build_llm_provider_openai_with_key() {
        let result = build_llm_provider(
            Provider::OpenAI,
            Some("sk-test".to_string()),
            "gpt-4".to_string(),
            String::new()
        );
        assert!(matches!(result, Ok(LlmProvider::OpenAI { .. })));
    }

    #[test]
    fn test_get_effective_model_flag_wins() {
        assert_eq!(
            get_effective_model(Some("a".into()), Some("b".into()), &Provider::OpenAI),
            "a"
        );
    }

    #[test]
    fn test_get_effective_ollama_url_fallbacks() {
        assert_eq!(
            get_effective_ollama_url(None, None),
            "http://localhost:11434"
        );
        assert_eq!(
            get_effective_ollama_url(None, Some("http://gpu:11434".into())),
            "http://gpu:11434"
        );
        assert_eq!(
            get_effective_ollama_url(Some("http://x".into()), Some("http://y".into())),
            "http://x"
        );
    }

    #[test]
    fn test_build_settings_concurrency_override() {
        let config = Config::default();
        let settings = build_settings(&config, Some(8)).unwrap();
        assert_eq!(settings.concurrency, 8);
        assert!(build_settings(&config, Some(0)).is_err());
        assert_eq!(build_settings(&config, None).unwrap().concurrency, 4);
    }

    #[test]
    fn test_cooldown_from_config() {
        let mut config = Config::default();
        assert_eq!(cooldown(&config), chrono::Duration::hours(24));
        config.dedup.cooldown_hours = u64::MAX;
        assert_eq!(cooldown(&config), chrono::Duration::MAX);
    }

    #[test]
    fn test_build_warehouse_requires_project() {
        let config = Config::default();
        assert!(build_warehouse(&config).is_err());
    }
}
