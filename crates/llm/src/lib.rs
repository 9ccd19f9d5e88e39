//! Pulse completion provider adapters.
//!
//! Implements [`pipeline::CompletionProvider`] for each [`ProviderId`]:
//! Anthropic Messages, OpenAI Chat Completions and a local Ollama server.
//! Adding a provider means a new `ProviderId` variant, a new module here and a
//! new arm in [`build_provider`].
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** HTTP transport, request formatting, envelope decoding
//! and error classification live here. Each adapter makes exactly one call
//! per `complete`; retries and backoff belong to `nodes::CompletionClient`.

pub mod anthropic;
pub mod classify;
pub mod ollama;
pub mod openai;
mod transport;

use std::sync::Arc;

use pipeline::{CompletionProvider, ModelName, ProviderId, PulseError};

pub use anthropic::AnthropicProvider;
pub use classify::{classify_status, classify_transport, parse_retry_after, ErrorDetails};
pub use ollama::OllamaProvider;
pub use openai::OpenAiProvider;

/// Connection settings for one provider.
#[derive(Debug, Clone, Default)]
pub struct ProviderSettings {
    /// Overrides the provider's public endpoint (proxies, self-hosting).
    pub base_url: Option<String>,
    /// Required for Anthropic and OpenAI; ignored by Ollama.
    pub api_key: Option<String>,
    /// Model used when a request carries no override.
    pub model: Option<ModelName>,
}

/// Builds the adapter for `provider`.
///
/// # Errors
///
/// [`PulseError::ConfigurationError`] if a hosted provider has no API key.
pub fn build_provider(
    provider: ProviderId,
    settings: ProviderSettings,
    client: reqwest::Client,
) -> Result<Arc<dyn CompletionProvider>, PulseError> {
    let model = |default: &str| {
        settings
            .model
            .clone()
            .or_else(|| ModelName::new(default))
            .ok_or_else(|| PulseError::ConfigurationError {
                message: format!("no model configured for {provider}"),
            })
    };
    let api_key = || {
        settings
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| PulseError::ConfigurationError {
                message: format!("{provider} requires an API key"),
            })
    };

    let adapter: Arc<dyn CompletionProvider> = match provider {
        ProviderId::Anthropic => Arc::new(AnthropicProvider::new(
            client,
            settings.base_url.clone().unwrap_or_else(|| anthropic::DEFAULT_BASE_URL.to_string()),
            api_key()?,
            model(anthropic::DEFAULT_MODEL)?,
        )),
        ProviderId::OpenAi => Arc::new(OpenAiProvider::new(
            client,
            settings.base_url.clone().unwrap_or_else(|| openai::DEFAULT_BASE_URL.to_string()),
            api_key()?,
            model(openai::DEFAULT_MODEL)?,
        )),
        ProviderId::Ollama => Arc::new(OllamaProvider::new(
            client,
            settings.base_url.clone().unwrap_or_else(|| ollama::DEFAULT_BASE_URL.to_string()),
            model(ollama::DEFAULT_MODEL)?,
        )),
    };

    tracing::debug!(provider = %provider, model = %adapter.default_model(), "Provider adapter built");
    Ok(adapter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hosted_providers_need_api_key() {
        for provider in [ProviderId::Anthropic, ProviderId::OpenAi] {
            let err = build_provider(provider, ProviderSettings::default(), reqwest::Client::new())
                .err()
                .unwrap();
            assert!(matches!(err, PulseError::ConfigurationError { .. }));
        }
    }

    #[test]
    fn test_ollama_builds_without_key() {
        let adapter =
            build_provider(ProviderId::Ollama, ProviderSettings::default(), reqwest::Client::new()).unwrap();
        assert_eq!(adapter.id(), ProviderId::Ollama);
        assert_eq!(adapter.default_model().as_str(), ollama::DEFAULT_MODEL);
    }

    #[test]
    fn test_model_override() {
        let settings = ProviderSettings {
            api_key: Some("sk".to_string()),
            model: ModelName::new("gpt-4.1"),
            ..ProviderSettings::default()
        };
        let adapter = build_provider(ProviderId::OpenAi, settings, reqwest::Client::new()).unwrap();
        assert_eq!(adapter.default_model().as_str(), "gpt-4.1");
    }
}
