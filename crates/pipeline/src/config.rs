//! Inbound analysis configuration.
//!
//! [`AnalysisConfig`] is what a caller hands the core alongside a batch of
//! requests. Every field has a documented default and may be overridden
//! individually; [`AnalysisConfig::validate`] runs before any batch starts.

use std::time::Duration;

use crate::{AnalysisMode, ModelName, ProviderId, PulseError};

/// Default number of concurrent in-flight analyses.
pub const DEFAULT_MAX_WORKERS: usize = 5;
/// Default number of requests per batch chunk.
pub const DEFAULT_BATCH_CHUNK: usize = 10;
/// Default number of provider attempts per request.
pub const DEFAULT_MAX_RETRIES: u32 = 3;
/// Default sampling temperature.
pub const DEFAULT_TEMPERATURE: f32 = 0.2;
/// Default per-attempt timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
/// Default completion token budget.
pub const DEFAULT_MAX_TOKENS: u32 = 1024;

/// Configuration for one analysis run.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisConfig {
    /// Provider every request in the run is sent to.
    pub provider: ProviderId,
    /// How much structure to ask for.
    pub mode: AnalysisMode,
    /// Model override; `None` uses the provider's default model.
    pub model: Option<ModelName>,
    /// Ceiling on concurrent in-flight analyses.
    pub max_workers: usize,
    /// Requests per chunk.
    pub batch_chunk: usize,
    /// Total provider attempts per request (not additional retries).
    pub max_retries: u32,
    /// Sampling temperature, from 0.0 up to [`ProviderId::max_temperature`].
    pub temperature: f32,
    /// Initial per-attempt timeout; shrinks on timeout retries.
    pub timeout: Duration,
    /// Completion token budget.
    pub max_tokens: u32,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            provider: ProviderId::Anthropic,
            mode: AnalysisMode::Enhanced,
            model: None,
            max_workers: DEFAULT_MAX_WORKERS,
            batch_chunk: DEFAULT_BATCH_CHUNK,
            max_retries: DEFAULT_MAX_RETRIES,
            temperature: DEFAULT_TEMPERATURE,
            timeout: DEFAULT_TIMEOUT,
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }
}

impl AnalysisConfig {
    /// Checks every field is usable.
    pub fn validate(&self) -> Result<(), PulseError> {
        let fail = |message: &str| {
            Err(PulseError::ConfigurationError {
                message: message.to_string(),
            })
        };

        if self.max_workers == 0 {
            return fail("max_workers must be > 0");
        }
        if self.batch_chunk == 0 {
            return fail("batch_chunk must be > 0");
        }
        if self.max_retries == 0 {
            return fail("max_retries must be >= 1");
        }
        let max_temperature = self.provider.max_temperature();
        if !(0.0..=max_temperature).contains(&self.temperature) {
            return fail(&format!(
                "temperature must be in [0.0, {max_temperature:.1}] for provider {}",
                self.provider
            ));
        }
        if self.timeout.is_zero() {
            return fail("timeout must be > 0");
        }
        if self.max_tokens == 0 {
            return fail("max_tokens must be > 0");
        }
        Ok(())
    }

    /// The per-call options handed to the completion client.
    pub fn completion_options(&self) -> CompletionOptions {
        CompletionOptions {
            model: self.model.clone(),
            max_retries: self.max_retries,
            temperature: self.temperature,
            timeout: self.timeout,
            max_tokens: self.max_tokens,
        }
    }
}

/// Options for one `complete` call (covering every attempt of it).
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionOptions {
    pub model: Option<ModelName>,
    pub max_retries: u32,
    pub temperature: f32,
    pub timeout: Duration,
    pub max_tokens: u32,
}

impl Default for CompletionOptions {
    fn default() -> Self {
        AnalysisConfig::default().completion_options()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = AnalysisConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_workers, 5);
        assert_eq!(config.batch_chunk, 10);
    }

    #[test]
    fn test_rejects_zero_workers_and_bad_temperature() {
        let config = AnalysisConfig {
            max_workers: 0,
            ..AnalysisConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(PulseError::ConfigurationError { .. })
        ));

        let config = AnalysisConfig {
            temperature: 3.5,
            ..AnalysisConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_temperature_ceiling_follows_provider() {
        let anthropic = AnalysisConfig {
            provider: ProviderId::Anthropic,
            temperature: 1.5,
            ..AnalysisConfig::default()
        };
        let err = anthropic.validate().unwrap_err();
        assert!(err.to_string().contains("[0.0, 1.0]"), "{err}");

        let openai = AnalysisConfig {
            provider: ProviderId::OpenAi,
            ..anthropic
        };
        assert!(openai.validate().is_ok());
    }
}
