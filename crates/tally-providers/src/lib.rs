//! # tally-providers
//!
//! AI provider implementations for Tally.

pub mod anthropic;
pub mod gemini;
pub mod openai;

use std::sync::Arc;
use std::time::Duration;
use tally_core::{config::ProviderConfig, error::TallyError, traits::Provider};

/// Shared HTTP client with the configured per-call timeout.
pub fn http_client(timeout: Duration) -> Result<reqwest::Client, TallyError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| TallyError::Provider(format!("http client build failed: {e}")))
}

/// Build the provider registered under `name`.
pub fn build_provider(
    name: &str,
    config: &ProviderConfig,
    client: reqwest::Client,
) -> Result<Arc<dyn Provider>, TallyError> {
    match name {
        "openai" => {
            let cfg = config.openai.clone().unwrap_or_default();
            if !cfg.enabled {
                return Err(TallyError::Config("provider 'openai' is disabled".into()));
            }
            Ok(Arc::new(openai::OpenAiProvider::from_config(
                client,
                cfg.base_url,
                cfg.api_key,
                cfg.model,
            )))
        }
        "anthropic" => {
            let cfg = config
                .anthropic
                .clone()
                .ok_or_else(|| TallyError::Config("missing [provider.anthropic] section".into()))?;
            if !cfg.enabled {
                return Err(TallyError::Config("provider 'anthropic' is disabled".into()));
            }
            Ok(Arc::new(anthropic::AnthropicProvider::from_config(
                client,
                cfg.api_key,
                cfg.model,
            )))
        }
        "gemini" => {
            let cfg = config
                .gemini
                .clone()
                .ok_or_else(|| TallyError::Config("missing [provider.gemini] section".into()))?;
            if !cfg.enabled {
                return Err(TallyError::Config("provider 'gemini' is disabled".into()));
            }
            Ok(Arc::new(gemini::GeminiProvider::from_config(
                client,
                cfg.api_key,
                cfg.model,
            )))
        }
        other => Err(TallyError::Config(format!("unsupported provider: {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally_core::config::{AnthropicConfig, GeminiConfig};

    fn client() -> reqwest::Client {
        http_client(Duration::from_secs(1)).unwrap()
    }

    #[test]
    fn test_build_openai_without_section_uses_defaults() {
        let p = build_provider("openai", &ProviderConfig::default(), client()).unwrap();
        assert_eq!(p.name(), "openai");
        assert!(p.supports_vision());
    }

    #[test]
    fn test_build_anthropic_requires_section() {
        let err = build_provider("anthropic", &ProviderConfig::default(), client()).err().unwrap();
        assert!(err.to_string().contains("provider.anthropic"));

        let config = ProviderConfig {
            anthropic: Some(AnthropicConfig {
                enabled: true,
                api_key: "sk-ant".into(),
                model: "claude-sonnet-4-20250514".into(),
            }),
            ..Default::default()
        };
        let p = build_provider("anthropic", &config, client()).unwrap();
        assert_eq!(p.name(), "anthropic");
    }

    #[test]
    fn test_build_disabled_gemini_is_error() {
        let config = ProviderConfig {
            gemini: Some(GeminiConfig {
                enabled: false,
                api_key: "g".into(),
                model: "gemini-2.0-flash".into(),
            }),
            ..Default::default()
        };
        assert!(build_provider("gemini", &config, client()).is_err());
    }

    #[test]
    fn test_build_unknown_provider() {
        let err = build_provider("ollama", &ProviderConfig::default(), client()).err().unwrap();
        assert!(err.to_string().contains("unsupported provider: ollama"));
    }
}
