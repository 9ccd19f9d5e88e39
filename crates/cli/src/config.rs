//! `pulse.toml` loading.
//!
//! Every section and field is optional; anything left out takes the default
//! documented on the field. API keys are never read from the file, only from
//! the environment variable a provider section names.
//!
//! ```toml
//! [analysis]
//! provider = "anthropic"      # anthropic | openai | ollama
//! mode = "enhanced"           # basic | enhanced
//! max_workers = 5
//! batch_chunk = 10
//! max_retries = 3
//! temperature = 0.2
//! timeout_secs = 60
//!
//! [cache.analyses]
//! capacity = 1000
//! ttl_secs = 300
//!
//! [backoff]
//! max_delay_secs = 60
//!
//! [providers.ollama]
//! base_url = "http://gpu-box:11434"
//! model = "llama3.1:70b"
//!
//! [logging]
//! format = "json"
//! otlp_endpoint = "http://localhost:4317"
//! ```

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use llm::ProviderSettings;
use nodes::{BackoffConfig, PartitionPolicies};
use pipeline::{AnalysisConfig, AnalysisMode, ModelName, ProviderId};
use serde::Deserialize;

/// The whole configuration file.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PulseConfig {
    pub analysis: AnalysisSection,
    pub cache: PartitionPolicies,
    pub backoff: BackoffSection,
    /// Keyed by provider name (`anthropic`, `openai`, `ollama`).
    pub providers: HashMap<String, ProviderSection>,
    pub logging: LoggingSection,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AnalysisSection {
    pub provider: String,
    pub mode: String,
    pub model: Option<String>,
    pub max_workers: usize,
    pub batch_chunk: usize,
    pub max_retries: u32,
    pub temperature: f32,
    pub timeout_secs: u64,
    pub max_tokens: u32,
}

impl Default for AnalysisSection {
    fn default() -> Self {
        let defaults = AnalysisConfig::default();
        Self {
            provider: defaults.provider.as_str().to_string(),
            mode: defaults.mode.as_str().to_string(),
            model: None,
            max_workers: defaults.max_workers,
            batch_chunk: defaults.batch_chunk,
            max_retries: defaults.max_retries,
            temperature: defaults.temperature,
            timeout_secs: defaults.timeout.as_secs(),
            max_tokens: defaults.max_tokens,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BackoffSection {
    /// Ceiling on the exponential part of a retry delay.
    pub max_delay_secs: u64,
}

impl Default for BackoffSection {
    fn default() -> Self {
        Self {
            max_delay_secs: BackoffConfig::default().max_delay.as_secs(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProviderSection {
    pub base_url: Option<String>,
    /// Environment variable holding the API key. Defaults to
    /// `ANTHROPIC_API_KEY` / `OPENAI_API_KEY`.
    pub api_key_env: Option<String>,
    pub model: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per event.
    Json,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingSection {
    pub format: LogFormat,
    /// OTLP gRPC endpoint; tracing export is off when unset.
    pub otlp_endpoint: Option<String>,
}

/// Reads and validates `path`.
pub fn load_config(path: &Path) -> Result<PulseConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    let config = parse_config(&content)
        .with_context(|| format!("Invalid config file: {}", path.display()))?;
    Ok(config)
}

/// Parses and validates TOML text.
pub fn parse_config(content: &str) -> Result<PulseConfig> {
    let config: PulseConfig = toml::from_str(content).context("Failed to parse config")?;
    config.validate()?;
    Ok(config)
}

impl PulseConfig {
    /// Checks everything that can be checked without the environment.
    pub fn validate(&self) -> Result<()> {
        self.analysis_config()?.validate()?;

        for name in self.providers.keys() {
            name.parse::<ProviderId>()
                .map_err(|e| anyhow::anyhow!("[providers.{name}]: {e}"))?;
        }
        if self.backoff.max_delay_secs == 0 {
            anyhow::bail!("backoff.max_delay_secs must be > 0");
        }
        for (name, policy) in [
            ("listings", self.cache.listings),
            ("analyses", self.cache.analyses),
            ("identities", self.cache.identities),
        ] {
            if policy.capacity == 0 {
                anyhow::bail!("cache.{name}.capacity must be > 0");
            }
        }
        Ok(())
    }

    /// The `[analysis]` section as an [`AnalysisConfig`].
    pub fn analysis_config(&self) -> Result<AnalysisConfig> {
        let section = &self.analysis;
        let provider = section
            .provider
            .parse::<ProviderId>()
            .map_err(|e| anyhow::anyhow!("analysis.provider: {e}"))?;
        let mode = section
            .mode
            .parse::<AnalysisMode>()
            .map_err(|e| anyhow::anyhow!("analysis.mode: {e}"))?;
        let model = match &section.model {
            Some(name) => Some(
                ModelName::new(name.trim()).context("analysis.model must not be empty")?,
            ),
            None => None,
        };

        Ok(AnalysisConfig {
            provider,
            mode,
            model,
            max_workers: section.max_workers,
            batch_chunk: section.batch_chunk,
            max_retries: section.max_retries,
            temperature: section.temperature,
            timeout: Duration::from_secs(section.timeout_secs),
            max_tokens: section.max_tokens,
        })
    }

    pub fn backoff_config(&self) -> BackoffConfig {
        BackoffConfig {
            max_delay: Duration::from_secs(self.backoff.max_delay_secs),
            ..BackoffConfig::default()
        }
    }

    /// Connection settings for `provider`, reading its API key through `env`.
    pub fn provider_settings(
        &self,
        provider: ProviderId,
        env: impl Fn(&str) -> Option<String>,
    ) -> ProviderSettings {
        let section = self
            .providers
            .iter()
            .find(|(name, _)| name.parse::<ProviderId>().ok() == Some(provider))
            .map(|(_, section)| section.clone())
            .unwrap_or_default();

        let key_var = section
            .api_key_env
            .clone()
            .or_else(|| default_key_env(provider).map(str::to_string));

        ProviderSettings {
            base_url: section.base_url,
            api_key: key_var.and_then(|var| env(&var)),
            model: section.model.and_then(ModelName::new),
        }
    }
}

fn default_key_env(provider: ProviderId) -> Option<&'static str> {
    match provider {
        ProviderId::Anthropic => Some("ANTHROPIC_API_KEY"),
        ProviderId::OpenAi => Some("OPENAI_API_KEY"),
        ProviderId::Ollama => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_yields_defaults() {
        let config = parse_config("").unwrap();
        assert_eq!(config, PulseConfig::default());
        assert_eq!(config.analysis_config().unwrap(), AnalysisConfig::default());
        assert_eq!(config.cache.analyses.capacity, 1000);
        assert_eq!(config.cache.listings.ttl, Duration::from_secs(600));
    }

    #[test]
    fn test_provider_aliases_accepted() {
        let config = parse_config("[analysis]\nprovider = \"openai\"\nmode = \"basic\"\n").unwrap();
        let analysis = config.analysis_config().unwrap();
        assert_eq!(analysis.provider, ProviderId::OpenAi);
        assert_eq!(analysis.mode, AnalysisMode::Basic);
    }

    #[test]
    fn test_api_key_read_from_named_env_var() {
        let config = parse_config(
            "[providers.anthropic]\napi_key_env = \"PULSE_CLAUDE_KEY\"\nbase_url = \"http://proxy\"\n",
        )
        .unwrap();
        let settings = config.provider_settings(ProviderId::Anthropic, |var| {
            (var == "PULSE_CLAUDE_KEY").then(|| "sk-ant".to_string())
        });
        assert_eq!(settings.api_key.as_deref(), Some("sk-ant"));
        assert_eq!(settings.base_url.as_deref(), Some("http://proxy"));
    }

    #[test]
    fn test_default_key_env_per_provider() {
        let config = PulseConfig::default();
        let settings = config.provider_settings(ProviderId::OpenAi, |var| {
            (var == "OPENAI_API_KEY").then(|| "sk-oai".to_string())
        });
        assert_eq!(settings.api_key.as_deref(), Some("sk-oai"));

        let ollama = config.provider_settings(ProviderId::Ollama, |_| Some("unused".to_string()));
        assert_eq!(ollama.api_key, None);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(parse_config("[analysis]\nmax_workers = 0\n").is_err());
        assert!(parse_config("[analysis]\ntemperature = 3.5\n").is_err());
        assert!(parse_config("[analysis]\nprovider = \"bard\"\n").is_err());
        assert!(parse_config("[providers.bard]\nmodel = \"x\"\n").is_err());
        assert!(parse_config("[backoff]\nmax_delay_secs = 0\n").is_err());
        assert!(parse_config("[analysis]\nworkers = 3\n").is_err(), "unknown keys are rejected");
    }
}
