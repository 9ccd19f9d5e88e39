//! Error taxonomy and retry-policy types for the analysis domain.
//!
//! [`ErrorKind`] is the shared vocabulary of failure kinds. Provider adapters
//! classify their transport- and API-specific failures into it exactly once,
//! at the provider-call boundary, by returning a [`ProviderError`]. Every retry
//! decision downstream keys off [`ErrorKind::retry_policy`]; no call site
//! inspects error text.
//!
//! [`AnalysisFailure`] is the serialisable form of an error carried inside an
//! [`crate::AnalysisResult`]. [`PulseError`] covers conditions that stop the
//! application itself (bad configuration, unreadable collaborator files).

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ProviderId;

// ---------------------------------------------------------------------------
// Retry semantics
// ---------------------------------------------------------------------------

/// Whether an error condition is safe to retry and, if so, after what delay.
///
/// ## Rules
///
/// - `Retryable` errors: rate limits, timeouts, connection failures.
/// - `NonRetryable` errors: token limit exceeded, content filtered, malformed
///   requests, unparseable responses, anything unclassified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RetryPolicy {
    /// The operation may be retried.
    ///
    /// `after` optionally specifies the minimum delay before retrying (e.g.
    /// derived from a `Retry-After` response header).
    Retryable {
        /// Minimum back-off before the next attempt. `None` means apply the
        /// caller's own back-off schedule.
        after: Option<Duration>,
    },
    /// The operation must not be retried; the error is terminal.
    NonRetryable,
}

impl RetryPolicy {
    /// Returns `true` for [`RetryPolicy::Retryable`].
    pub fn is_retryable(&self) -> bool {
        matches!(self, RetryPolicy::Retryable { .. })
    }
}

// ---------------------------------------------------------------------------
// Error kinds
// ---------------------------------------------------------------------------

/// Closed set of failure kinds shared by every component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The provider throttled the request.
    RateLimited,
    /// The prompt (or prompt plus completion budget) exceeds the model's context.
    TokenLimitExceeded,
    /// The provider refused or filtered the content.
    ContentFiltered,
    /// The call did not complete within its per-attempt timeout.
    Timeout,
    /// The provider could not be reached or failed transiently on its side.
    ConnectionFailed,
    /// The request was rejected as malformed or unauthorised, or had no content.
    BadRequest,
    /// The reply could not be interpreted.
    UnparseableResponse,
    /// Anything not covered above. Never retried so programming errors are not
    /// masked as transient faults.
    Unexpected,
}

impl ErrorKind {
    /// The fixed retry policy for this kind of failure.
    pub fn retry_policy(self) -> RetryPolicy {
        match self {
            ErrorKind::RateLimited | ErrorKind::Timeout | ErrorKind::ConnectionFailed => {
                RetryPolicy::Retryable { after: None }
            }
            ErrorKind::TokenLimitExceeded
            | ErrorKind::ContentFiltered
            | ErrorKind::BadRequest
            | ErrorKind::UnparseableResponse
            | ErrorKind::Unexpected => RetryPolicy::NonRetryable,
        }
    }

    /// Returns the snake_case name of this kind.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::TokenLimitExceeded => "token_limit_exceeded",
            ErrorKind::ContentFiltered => "content_filtered",
            ErrorKind::Timeout => "timeout",
            ErrorKind::ConnectionFailed => "connection_failed",
            ErrorKind::BadRequest => "bad_request",
            ErrorKind::UnparseableResponse => "unparseable_response",
            ErrorKind::Unexpected => "unexpected",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Provider errors
// ---------------------------------------------------------------------------

/// A provider failure, already classified into an [`ErrorKind`].
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{kind}: {message}")]
pub struct ProviderError {
    /// Classified kind; drives the retry decision.
    pub kind: ErrorKind,
    /// Human-readable detail for logs and the result's `error` field.
    pub message: String,
    /// Server-suggested minimum wait (e.g. from `Retry-After`).
    pub retry_after: Option<Duration>,
}

impl ProviderError {
    /// Creates a [`ProviderError`] without a retry hint.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            retry_after: None,
        }
    }

    /// Attaches a server-suggested minimum wait.
    pub fn with_retry_after(mut self, after: Option<Duration>) -> Self {
        self.retry_after = after;
        self
    }

    /// Retry policy for this error, carrying the `retry_after` hint when the
    /// kind is retryable.
    pub fn retry_policy(&self) -> RetryPolicy {
        match self.kind.retry_policy() {
            RetryPolicy::Retryable { .. } => RetryPolicy::Retryable {
                after: self.retry_after,
            },
            RetryPolicy::NonRetryable => RetryPolicy::NonRetryable,
        }
    }
}

// ---------------------------------------------------------------------------
// Result-carried failure
// ---------------------------------------------------------------------------

/// The `error` field of an [`crate::AnalysisResult`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisFailure {
    /// Classified kind of the failure.
    pub kind: ErrorKind,
    /// Human-readable description.
    pub message: String,
}

impl AnalysisFailure {
    /// Creates an [`AnalysisFailure`].
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl From<ProviderError> for AnalysisFailure {
    fn from(err: ProviderError) -> Self {
        Self {
            kind: err.kind,
            message: err.message,
        }
    }
}

impl std::fmt::Display for AnalysisFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

// ---------------------------------------------------------------------------
// Application-level errors
// ---------------------------------------------------------------------------

/// Errors that stop the application rather than a single analysis.
#[derive(Debug, Error)]
pub enum PulseError {
    /// The analysis or runtime configuration is invalid.
    ///
    /// Produced at load time; a batch never starts with an invalid config.
    #[error("Configuration error: {message}")]
    ConfigurationError {
        /// Description of the configuration problem.
        message: String,
    },

    /// A request named a provider that was never registered with the client.
    #[error("Provider '{provider}' is not registered")]
    ProviderNotRegistered {
        /// The provider that was asked for.
        provider: ProviderId,
    },

    /// A collaborator (ticket source, result repository) failed.
    #[error("Collaborator '{collaborator}' failed: {message}")]
    CollaboratorFailed {
        /// Which collaborator failed (e.g. `"ticket source"`).
        collaborator: String,
        /// Description of the failure.
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_kinds_are_retryable() {
        for kind in [ErrorKind::RateLimited, ErrorKind::Timeout, ErrorKind::ConnectionFailed] {
            assert!(kind.retry_policy().is_retryable(), "{kind} should retry");
        }
    }

    #[test]
    fn test_terminal_kinds_are_not_retryable() {
        for kind in [
            ErrorKind::TokenLimitExceeded,
            ErrorKind::ContentFiltered,
            ErrorKind::BadRequest,
            ErrorKind::UnparseableResponse,
            ErrorKind::Unexpected,
        ] {
            assert_eq!(kind.retry_policy(), RetryPolicy::NonRetryable, "{kind}");
        }
    }

    #[test]
    fn test_provider_error_carries_retry_after_only_when_retryable() {
        let hint = Some(Duration::from_secs(7));
        let throttled = ProviderError::new(ErrorKind::RateLimited, "slow down").with_retry_after(hint);
        assert_eq!(throttled.retry_policy(), RetryPolicy::Retryable { after: hint });

        let filtered = ProviderError::new(ErrorKind::ContentFiltered, "refused").with_retry_after(hint);
        assert_eq!(filtered.retry_policy(), RetryPolicy::NonRetryable);
    }

    #[test]
    fn test_error_kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::TokenLimitExceeded).unwrap();
        assert_eq!(json, "\"token_limit_exceeded\"");
    }
}
