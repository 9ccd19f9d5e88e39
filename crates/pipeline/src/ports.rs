//! Port traits implemented by infrastructure crates.
//!
//! This crate defines *what* is needed; the `llm` crate supplies completion
//! providers and the application layer supplies the ticket source and result
//! repository.

use std::time::Duration;

use async_trait::async_trait;

use crate::{AnalysisResult, ModelName, ProviderError, ProviderId, PulseError, RequestId, Ticket};

/// One attempt's worth of input to a [`CompletionProvider`].
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    /// The single natural-language prompt.
    pub prompt: String,
    /// Model override; `None` uses the provider's default.
    pub model: Option<ModelName>,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Timeout for this attempt only.
    pub timeout: Duration,
}

/// A completion endpoint.
///
/// Implementations issue exactly one call per invocation and classify every
/// failure into a [`ProviderError`]; retries belong to the caller.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Which provider this is.
    fn id(&self) -> ProviderId;

    /// Model used when a request carries no override.
    fn default_model(&self) -> &ModelName;

    /// Sends `request` and returns the reply text verbatim.
    async fn complete(&self, request: &CompletionRequest) -> Result<String, ProviderError>;
}

/// Supplies tickets to analyse (the ticket-system collaborator).
#[async_trait]
pub trait TicketSource: Send + Sync {
    /// Fetches every ticket currently due for analysis.
    async fn fetch_tickets(&self) -> Result<Vec<Ticket>, PulseError>;
}

/// Persists analysis results (the repository collaborator).
///
/// Delivery is at-least-once from the core's point of view; implementations
/// should treat `save` of an existing id as an overwrite.
#[async_trait]
pub trait AnalysisRepository: Send + Sync {
    /// Returns the stored result for `id`, if any.
    async fn find(&self, id: &RequestId) -> Result<Option<AnalysisResult>, PulseError>;

    /// Stores `result`.
    async fn save(&self, result: &AnalysisResult) -> Result<(), PulseError>;
}
