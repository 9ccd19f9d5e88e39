//! Per-ticket analysis pipeline.
//!
//! For one request the stages run strictly in sequence:
//!
//! 1. blank text → `BadRequest("Empty content provided")`, no provider call
//! 2. cache lookup by [`Fingerprint`]
//! 3. prompt → [`CompletionClient::complete`]
//! 4. [`normalize`] the reply
//! 5. [`score`] the sentiment
//! 6. cache store (successful results only)
//!
//! [`TicketAnalyzer::analyze_batch`] runs this over many requests through
//! [`run_batch`]; [`TicketAnalyzer::analyze_pending`] additionally consults an
//! [`AnalysisRepository`] so tickets that already have a stored result are not
//! sent to a provider again.

use std::sync::Arc;

use pipeline::{
    build_prompt, normalize, score, AnalysisConfig, AnalysisFailure, AnalysisRepository,
    AnalysisRequest, AnalysisResult, Fingerprint, PulseError, Ticket,
};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::batch::{run_batch, BatchLimits, BatchProgress, BatchReport};
use crate::cache::ResponseCache;
use crate::CompletionClient;

/// Runs the analysis pipeline for a fixed [`AnalysisConfig`].
pub struct TicketAnalyzer {
    client: Arc<CompletionClient>,
    cache: Arc<ResponseCache<AnalysisResult>>,
    config: AnalysisConfig,
}

impl TicketAnalyzer {
    /// Creates an analyzer.
    ///
    /// # Errors
    ///
    /// - [`PulseError::ConfigurationError`] if `config` fails validation.
    /// - [`PulseError::ProviderNotRegistered`] if `client` has no provider for
    ///   `config.provider`.
    pub fn new(
        client: Arc<CompletionClient>,
        cache: Arc<ResponseCache<AnalysisResult>>,
        config: AnalysisConfig,
    ) -> Result<Self, PulseError> {
        config.validate()?;
        if !client.has_provider(config.provider) {
            return Err(PulseError::ProviderNotRegistered {
                provider: config.provider,
            });
        }
        Ok(Self {
            client,
            cache,
            config,
        })
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn cache(&self) -> &ResponseCache<AnalysisResult> {
        &self.cache
    }

    /// Analyses one request. Never fails: problems are carried in
    /// [`AnalysisResult::error`].
    #[tracing::instrument(skip_all, fields(request_id = %request.id, provider = %self.config.provider, mode = %self.config.mode))]
    pub async fn analyze(&self, request: AnalysisRequest) -> AnalysisResult {
        if request.is_blank() {
            tracing::debug!("Empty ticket text, skipping provider call");
            return AnalysisResult::empty_content(request.id);
        }

        let fingerprint = Fingerprint::compute(&request.text, self.config.provider, self.config.mode);
        if let Some(cached) = self.cache.get(fingerprint.as_str()).await {
            tracing::debug!(fingerprint = %fingerprint, "Analysis served from cache");
            return cached.for_request(request.id);
        }

        let prompt = build_prompt(&request.text, self.config.mode);
        let options = self.config.completion_options();

        let raw = match self.client.complete(&prompt, self.config.provider, &options).await {
            Ok(raw) => raw,
            Err(err) => {
                tracing::warn!(kind = %err.kind, error = %err.message, "Completion failed");
                return AnalysisResult::failed(request.id, err.into());
            }
        };

        let mut result = normalize(&raw, self.config.mode, request.id);
        if let Some(failure) = &result.error {
            tracing::warn!(kind = %failure.kind, error = %failure.message, "Reply could not be normalised");
            return result;
        }

        result.priority_score = score(&result.sentiment);
        tracing::debug!(
            priority = result.priority_score.get(),
            polarity = %result.sentiment.polarity,
            "Analysis complete"
        );

        self.cache.put(fingerprint.as_str(), result.clone()).await;
        result
    }

    /// Analyses every request with the configured worker and chunk limits.
    pub async fn analyze_batch(
        &self,
        requests: Vec<AnalysisRequest>,
        cancel: &CancellationToken,
        progress: &dyn BatchProgress,
    ) -> BatchReport {
        let limits = BatchLimits::new(self.config.max_workers, self.config.batch_chunk);
        run_batch(
            requests,
            |request| async move { Ok::<_, AnalysisFailure>(self.analyze(request).await) },
            limits,
            cancel,
            progress,
        )
        .await
    }

    /// Analyses the tickets that have no stored successful result, then
    /// stores every new result in `repository`.
    ///
    /// # Errors
    ///
    /// [`PulseError::CollaboratorFailed`] if the repository lookup fails. A
    /// failed `save` is logged and counted, not returned.
    pub async fn analyze_pending(
        &self,
        tickets: &[Ticket],
        repository: &dyn AnalysisRepository,
        cancel: &CancellationToken,
        progress: &dyn BatchProgress,
    ) -> Result<PendingReport, PulseError> {
        let mut pending = Vec::with_capacity(tickets.len());
        let mut already_analyzed = 0;

        for ticket in tickets {
            let request = ticket.to_request();
            match repository.find(&request.id).await? {
                Some(stored) if !stored.is_error() => already_analyzed += 1,
                _ => pending.push(request),
            }
        }

        tracing::info!(
            tickets = tickets.len(),
            pending = pending.len(),
            already_analyzed,
            "Pending tickets selected"
        );

        let batch = self.analyze_batch(pending, cancel, progress).await;

        let mut persist_failures = 0;
        for result in &batch.results {
            if let Err(err) = repository.save(result).await {
                persist_failures += 1;
                tracing::error!(request_id = %result.request_id, error = %err, "Failed to store analysis");
            }
        }

        Ok(PendingReport {
            batch,
            already_analyzed,
            persist_failures,
        })
    }
}

/// Outcome of [`TicketAnalyzer::analyze_pending`].
#[derive(Debug, Clone, Serialize)]
pub struct PendingReport {
    pub batch: BatchReport,
    /// Tickets skipped because a successful result was already stored.
    pub already_analyzed: usize,
    /// Results that could not be stored.
    pub persist_failures: usize,
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use pipeline::{CompletionProvider, ErrorKind, Polarity, ProviderError, ProviderId, RequestId};

    use super::*;
    use crate::cache::CachePolicy;
    use crate::testing::{RecordingSleeper, ScriptedProvider};

    const REPLY: &str = r#"{"sentiment":{"polarity":"negative","urgency":5,"frustration":5,
        "technical_expertise":2,"business_impact":{"detected":true,"description":"checkout down"}},
        "category":"outage","component":"payments","confidence":0.9}"#;

    fn analyzer(provider: Arc<ScriptedProvider>) -> TicketAnalyzer {
        let client = CompletionClient::new([provider as Arc<dyn CompletionProvider>])
            .with_sleeper(Arc::new(RecordingSleeper::default()));
        let cache = ResponseCache::new("analyses", CachePolicy::new(100, std::time::Duration::from_secs(60)));
        TicketAnalyzer::new(Arc::new(client), Arc::new(cache), AnalysisConfig::default()).unwrap()
    }

    fn request(id: &str, text: &str) -> AnalysisRequest {
        AnalysisRequest::new(RequestId::new(id).unwrap(), text)
    }

    #[tokio::test]
    async fn test_successful_analysis_is_scored_and_cached() {
        let provider = Arc::new(ScriptedProvider::new(ProviderId::Anthropic, vec![Ok(REPLY.to_string())]));
        let analyzer = analyzer(provider.clone());

        let first = analyzer.analyze(request("T-1", "Checkout is broken!")).await;
        assert!(!first.is_error());
        assert_eq!(first.sentiment.polarity, Polarity::Negative);
        assert!(first.priority_score.get() >= 9);
        assert_eq!(first.category, "outage");

        // Same text (modulo case and spacing) for another ticket hits the cache.
        let second = analyzer.analyze(request("T-2", "  checkout IS broken! ")).await;
        assert_eq!(provider.calls(), 1);
        assert_eq!(second.request_id.as_str(), "T-2");
        assert_eq!(second.priority_score, first.priority_score);
    }

    #[tokio::test]
    async fn test_empty_text_never_reaches_provider() {
        let provider = Arc::new(ScriptedProvider::new(ProviderId::Anthropic, vec![]));
        let analyzer = analyzer(provider.clone());

        let result = analyzer.analyze(request("T-1", "   ")).await;

        assert_eq!(result.error.as_ref().unwrap().message, "Empty content provided");
        assert_eq!(result.priority_score.get(), 1);
        assert_eq!(result.sentiment.polarity, Polarity::Unknown);
        assert_eq!(provider.calls(), 0);
        assert!(analyzer.cache().is_empty().await);
    }

    #[tokio::test]
    async fn test_failures_are_results_and_not_cached() {
        let provider = Arc::new(ScriptedProvider::new(
            ProviderId::Anthropic,
            vec![
                Err(ProviderError::new(ErrorKind::ContentFiltered, "refused")),
                Ok("I cannot help with that.".to_string()),
            ],
        ));
        let analyzer = analyzer(provider);

        let filtered = analyzer.analyze(request("T-1", "text one")).await;
        assert_eq!(filtered.error.unwrap().kind, ErrorKind::ContentFiltered);

        let unparseable = analyzer.analyze(request("T-2", "text two")).await;
        assert_eq!(unparseable.error.unwrap().kind, ErrorKind::UnparseableResponse);
        assert_eq!(unparseable.priority_score.get(), 1);

        assert!(analyzer.cache().is_empty().await);
    }

    #[test]
    fn test_unregistered_provider_rejected() {
        let provider = Arc::new(ScriptedProvider::new(ProviderId::Ollama, vec![]));
        let client = CompletionClient::new([provider as Arc<dyn CompletionProvider>]);
        let cache = ResponseCache::new("analyses", CachePolicy::new(1, std::time::Duration::from_secs(1)));

        let err = TicketAnalyzer::new(Arc::new(client), Arc::new(cache), AnalysisConfig::default())
            .err()
            .unwrap();
        assert!(matches!(err, PulseError::ProviderNotRegistered { provider: ProviderId::Anthropic }));
    }

    #[derive(Default)]
    struct MemoryRepository {
        stored: Mutex<HashMap<String, AnalysisResult>>,
    }

    #[async_trait]
    impl AnalysisRepository for MemoryRepository {
        async fn find(&self, id: &RequestId) -> Result<Option<AnalysisResult>, PulseError> {
            Ok(self.stored.lock().unwrap().get(id.as_str()).cloned())
        }

        async fn save(&self, result: &AnalysisResult) -> Result<(), PulseError> {
            self.stored
                .lock()
                .unwrap()
                .insert(result.request_id.as_str().to_string(), result.clone());
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_analyze_pending_skips_stored_successes() {
        let provider = Arc::new(ScriptedProvider::responding(ProviderId::Anthropic, |_| Ok(REPLY.to_string())));
        let analyzer = analyzer(provider.clone());
        let repository = MemoryRepository::default();

        let ticket = |id: &str, subject: &str| Ticket {
            id: RequestId::new(id).unwrap(),
            subject: subject.to_string(),
            body: "details".to_string(),
        };
        let tickets = vec![ticket("T-1", "first"), ticket("T-2", "second"), ticket("T-3", "")];

        // T-2 already has a good result; T-3 has a stored failure and is retried.
        let mut stored = analyzer.analyze(request("T-2", "second\n\ndetails")).await;
        stored.category = "kept".to_string();
        repository.save(&stored).await.unwrap();
        repository
            .save(&AnalysisResult::empty_content(RequestId::new("T-3").unwrap()))
            .await
            .unwrap();
        let calls_before = provider.calls();

        let report = analyzer
            .analyze_pending(&tickets, &repository, &CancellationToken::new(), &crate::LogProgress)
            .await
            .unwrap();

        assert_eq!(report.already_analyzed, 1);
        assert_eq!(report.batch.results.len(), 2);
        assert_eq!(report.persist_failures, 0);
        assert_eq!(provider.calls() - calls_before, 2);
        let map = repository.stored.lock().unwrap();
        assert_eq!(map["T-2"].category, "kept");
        assert!(!map["T-3"].is_error());
    }
}
