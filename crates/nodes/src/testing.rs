//! Test doubles for the completion path.
//!
//! [`ScriptedProvider`] replays a fixed sequence of outcomes (then falls back
//! to an optional responder) and records what it was asked. [`RecordingSleeper`]
//! records backoff sleeps without waiting.
//!
//! Compiled for this crate's unit tests and, through the `testing` feature,
//! for integration tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use pipeline::{CompletionProvider, CompletionRequest, ErrorKind, ModelName, ProviderError, ProviderId};

use crate::Sleeper;

type Responder = Box<dyn Fn(&CompletionRequest) -> Result<String, ProviderError> + Send + Sync>;

/// A [`CompletionProvider`] that answers from a script.
pub struct ScriptedProvider {
    id: ProviderId,
    model: ModelName,
    script: Mutex<VecDeque<Result<String, ProviderError>>>,
    responder: Option<Responder>,
    latency: Option<Duration>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedProvider {
    /// Replays `script` in order; once exhausted every call fails with
    /// [`ErrorKind::Unexpected`] unless a responder is set.
    pub fn new(id: ProviderId, script: Vec<Result<String, ProviderError>>) -> Self {
        Self {
            id,
            model: ModelName::new("scripted-model").expect("literal is non-empty"),
            script: Mutex::new(script.into()),
            responder: None,
            latency: None,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Answers every call (after the script) with `responder`.
    pub fn responding(
        id: ProviderId,
        responder: impl Fn(&CompletionRequest) -> Result<String, ProviderError> + Send + Sync + 'static,
    ) -> Self {
        let mut provider = Self::new(id, Vec::new());
        provider.responder = Some(Box::new(responder));
        provider
    }

    /// Delays every reply by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Number of calls received.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of calls that were in flight at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Calls currently in flight.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Per-attempt timeouts of every call received, in order.
    pub fn timeouts(&self) -> Vec<Duration> {
        self.requests
            .lock()
            .map(|r| r.iter().map(|req| req.timeout).collect())
            .unwrap_or_default()
    }

    /// Prompts of every call received, in order.
    pub fn prompts(&self) -> Vec<String> {
        self.requests
            .lock()
            .map(|r| r.iter().map(|req| req.prompt.clone()).collect())
            .unwrap_or_default()
    }

    fn next_outcome(&self, request: &CompletionRequest) -> Result<String, ProviderError> {
        let scripted = self.script.lock().ok().and_then(|mut s| s.pop_front());
        match (scripted, &self.responder) {
            (Some(outcome), _) => outcome,
            (None, Some(responder)) => responder(request),
            (None, None) => Err(ProviderError::new(ErrorKind::Unexpected, "script exhausted")),
        }
    }
}

/// Counts one call as in flight until dropped, including when the caller's
/// timeout drops the call mid-sleep.
struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    fn enter(counter: &'a AtomicUsize, peak: &AtomicUsize) -> Self {
        let now = counter.fetch_add(1, Ordering::SeqCst) + 1;
        peak.fetch_max(now, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl CompletionProvider for ScriptedProvider {
    fn id(&self) -> ProviderId {
        self.id
    }

    fn default_model(&self) -> &ModelName {
        &self.model
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }

        let _in_flight = InFlight::enter(&self.in_flight, &self.max_in_flight);

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        self.next_outcome(request)
    }
}

/// A [`Sleeper`] that records durations and returns immediately.
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    sleeps: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    /// Every duration slept, in order.
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        if let Ok(mut sleeps) = self.sleeps.lock() {
            sleeps.push(duration);
        }
    }
}
