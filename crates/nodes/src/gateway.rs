//! Provider-agnostic completion client.
//!
//! [`CompletionClient`] is constructed once at start-up with every configured
//! [`CompletionProvider`] and shared by reference with all batch workers. It
//! holds no mutable state, so concurrent calls never contend.
//!
//! ## Retry behaviour
//!
//! Each call makes up to `max_retries` attempts. After a failure the error's
//! [`RetryPolicy`] decides:
//!
//! - `NonRetryable` → returned immediately.
//! - `Retryable` → sleep for the [`BackoffConfig`] delay (raised to the
//!   provider's `Retry-After` hint when one was given) and try again. A
//!   timeout additionally shrinks the next attempt's timeout.
//!
//! When attempts run out the last classified error is returned; a partial
//! result is never substituted.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use pipeline::{
    CompletionOptions, CompletionProvider, CompletionRequest, ErrorKind, ProviderError,
    ProviderId, RetryPolicy,
};

use crate::BackoffConfig;

/// Suspends the current task between attempts.
///
/// Abstracted so tests can observe backoff without waiting.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// [`Sleeper`] backed by `tokio::time::sleep`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Sends prompts to a selected provider with retry and backoff.
pub struct CompletionClient {
    providers: HashMap<ProviderId, Arc<dyn CompletionProvider>>,
    backoff: BackoffConfig,
    sleeper: Arc<dyn Sleeper>,
}

impl CompletionClient {
    /// Creates a client dispatching to `providers`.
    ///
    /// A later provider with the same [`ProviderId`] replaces an earlier one.
    pub fn new(providers: impl IntoIterator<Item = Arc<dyn CompletionProvider>>) -> Self {
        Self {
            providers: providers.into_iter().map(|p| (p.id(), p)).collect(),
            backoff: BackoffConfig::default(),
            sleeper: Arc::new(TokioSleeper),
        }
    }

    /// Replaces the backoff tunables.
    pub fn with_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff;
        self
    }

    /// Replaces the sleeper (tests use a recording one).
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Returns `true` if `provider` was registered.
    pub fn has_provider(&self, provider: ProviderId) -> bool {
        self.providers.contains_key(&provider)
    }

    /// Registered providers, in no particular order.
    pub fn providers(&self) -> impl Iterator<Item = ProviderId> + '_ {
        self.providers.keys().copied()
    }

    /// Sends `prompt` to `provider` and returns the raw reply text.
    #[tracing::instrument(skip(self, prompt, options), fields(provider = %provider, prompt_len = prompt.len()))]
    pub async fn complete(
        &self,
        prompt: &str,
        provider: ProviderId,
        options: &CompletionOptions,
    ) -> Result<String, ProviderError> {
        let Some(backend) = self.providers.get(&provider) else {
            return Err(ProviderError::new(
                ErrorKind::BadRequest,
                format!("provider '{provider}' is not registered"),
            ));
        };

        let attempts = options.max_retries.max(1);
        let mut timeout = options.timeout;
        let mut attempt = 1u32;

        loop {
            let request = CompletionRequest {
                prompt: prompt.to_string(),
                model: options.model.clone(),
                temperature: options.temperature,
                max_tokens: options.max_tokens,
                timeout,
            };

            let outcome = match tokio::time::timeout(timeout, backend.complete(&request)).await {
                Ok(outcome) => outcome,
                Err(_) => Err(ProviderError::new(
                    ErrorKind::Timeout,
                    format!("no reply within {}s", timeout.as_secs_f64()),
                )),
            };

            let err = match outcome {
                Ok(text) => {
                    if attempt > 1 {
                        tracing::info!(attempt, "Provider call succeeded after retry");
                    }
                    return Ok(text);
                }
                Err(err) => err,
            };

            let RetryPolicy::Retryable { after } = err.retry_policy() else {
                tracing::warn!(attempt, kind = %err.kind, error = %err.message, "Provider call failed with terminal error");
                return Err(err);
            };

            if attempt >= attempts {
                tracing::warn!(
                    attempt,
                    kind = %err.kind,
                    error = %err.message,
                    "Provider call failed: retries exhausted"
                );
                return Err(err);
            }

            let computed = self
                .backoff
                .delay(err.kind, attempt - 1, &mut rand::thread_rng());
            let delay = after.map_or(computed, |hint| computed.max(hint));

            if err.kind == ErrorKind::Timeout {
                timeout = self.backoff.next_timeout(timeout);
            }

            tracing::warn!(
                attempt,
                kind = %err.kind,
                delay_ms = delay.as_millis() as u64,
                next_timeout_ms = timeout.as_millis() as u64,
                error = %err.message,
                "Provider call failed, will retry after backoff"
            );

            self.sleeper.sleep(delay).await;
            attempt += 1;
        }
    }
}
