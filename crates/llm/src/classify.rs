//! Maps provider failures onto [`ErrorKind`].
//!
//! This is the only place HTTP statuses, provider error `type`/`code` fields
//! and transport errors are inspected. Everything downstream keys off the
//! resulting [`ProviderError::kind`].

use std::time::Duration;

use pipeline::{ErrorKind, ProviderError};
use reqwest::header::HeaderValue;
use reqwest::StatusCode;
use serde_json::Value;

/// Anthropic returns 529 when the API is overloaded.
const STATUS_OVERLOADED: u16 = 529;

/// Structured fields pulled out of a provider's error body.
///
/// Handles the three envelope shapes in use:
/// `{"error": {"type", "message"}}` (Anthropic),
/// `{"error": {"message", "type", "code"}}` (OpenAI) and
/// `{"error": "message"}` (Ollama).
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ErrorDetails {
    pub error_type: Option<String>,
    pub code: Option<String>,
    pub message: Option<String>,
}

impl ErrorDetails {
    pub fn parse(body: &str) -> Self {
        let Ok(json) = serde_json::from_str::<Value>(body) else {
            return Self::default();
        };
        match json.get("error") {
            Some(Value::String(message)) => Self {
                message: Some(message.clone()),
                ..Self::default()
            },
            Some(Value::Object(error)) => {
                let field = |name: &str| error.get(name).and_then(Value::as_str).map(str::to_string);
                Self {
                    error_type: field("type"),
                    code: field("code"),
                    message: field("message"),
                }
            }
            _ => Self::default(),
        }
    }

    fn is(&self, marker: &str) -> bool {
        self.code.as_deref() == Some(marker) || self.error_type.as_deref() == Some(marker)
    }

    fn is_token_limit(&self) -> bool {
        if self.is("context_length_exceeded") || self.is("string_above_max_length") {
            return true;
        }
        // Anthropic reports oversized prompts as a plain invalid_request_error.
        self.error_type.as_deref() == Some("invalid_request_error")
            && self
                .message
                .as_deref()
                .is_some_and(|m| m.starts_with("prompt is too long"))
    }

    fn is_content_filter(&self) -> bool {
        self.is("content_filter") || self.is("content_policy_violation")
    }
}

/// Classifies a non-success HTTP response.
pub fn classify_status(
    provider: &str,
    status: StatusCode,
    body: &str,
    retry_after: Option<Duration>,
) -> ProviderError {
    let details = ErrorDetails::parse(body);
    let kind = kind_for_status(status, &details);

    let detail = details
        .message
        .clone()
        .unwrap_or_else(|| truncate(body.trim(), 300));
    let message = format!("{provider} returned {status}: {detail}");

    let err = ProviderError::new(kind, message);
    if kind.retry_policy().is_retryable() {
        err.with_retry_after(retry_after)
    } else {
        err
    }
}

fn kind_for_status(status: StatusCode, details: &ErrorDetails) -> ErrorKind {
    if details.is("rate_limit_error") || details.is("overloaded_error") {
        return ErrorKind::RateLimited;
    }
    if details.is_content_filter() {
        return ErrorKind::ContentFiltered;
    }
    if details.is_token_limit() {
        return ErrorKind::TokenLimitExceeded;
    }

    match status.as_u16() {
        429 | STATUS_OVERLOADED => ErrorKind::RateLimited,
        408 | 504 => ErrorKind::Timeout,
        413 => ErrorKind::TokenLimitExceeded,
        500..=599 => ErrorKind::ConnectionFailed,
        400..=499 => ErrorKind::BadRequest,
        _ => ErrorKind::Unexpected,
    }
}

/// Classifies a `reqwest` error raised before a status was available, or
/// while reading the body.
pub fn classify_transport(provider: &str, err: &reqwest::Error) -> ProviderError {
    let kind = if err.is_timeout() {
        ErrorKind::Timeout
    } else if err.is_connect() || err.is_request() || err.is_body() {
        ErrorKind::ConnectionFailed
    } else if err.is_decode() {
        ErrorKind::UnparseableResponse
    } else if err.is_builder() {
        ErrorKind::BadRequest
    } else {
        ErrorKind::Unexpected
    };
    ProviderError::new(kind, format!("{provider} request failed: {err}"))
}

/// Reads a delay-seconds `Retry-After` header. HTTP-date values are ignored.
pub fn parse_retry_after(header: Option<&HeaderValue>) -> Option<Duration> {
    let value = header?.to_str().ok()?.trim();
    value.parse::<u64>().ok().map(Duration::from_secs)
}

/// Error for a 2xx body that did not match the provider's envelope.
pub fn malformed_envelope(provider: &str, err: &serde_json::Error) -> ProviderError {
    ProviderError::new(
        ErrorKind::UnparseableResponse,
        format!("{provider} response envelope could not be decoded: {err}"),
    )
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}…", &text[..idx]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kind(status: u16, body: &str) -> ErrorKind {
        classify_status("test", StatusCode::from_u16(status).unwrap(), body, None).kind
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(kind(429, ""), ErrorKind::RateLimited);
        assert_eq!(kind(529, ""), ErrorKind::RateLimited);
        assert_eq!(kind(408, ""), ErrorKind::Timeout);
        assert_eq!(kind(504, ""), ErrorKind::Timeout);
        assert_eq!(kind(500, ""), ErrorKind::ConnectionFailed);
        assert_eq!(kind(503, "<html>down</html>"), ErrorKind::ConnectionFailed);
        assert_eq!(kind(413, ""), ErrorKind::TokenLimitExceeded);
        assert_eq!(kind(401, ""), ErrorKind::BadRequest);
        assert_eq!(kind(404, ""), ErrorKind::BadRequest);
    }

    #[test]
    fn test_openai_structured_codes() {
        let context = r#"{"error":{"message":"This model's maximum context length is 8192 tokens","type":"invalid_request_error","code":"context_length_exceeded"}}"#;
        assert_eq!(kind(400, context), ErrorKind::TokenLimitExceeded);

        let filtered = r#"{"error":{"message":"blocked","type":"invalid_request_error","code":"content_policy_violation"}}"#;
        assert_eq!(kind(400, filtered), ErrorKind::ContentFiltered);

        let other = r#"{"error":{"message":"bad param","type":"invalid_request_error","code":null}}"#;
        assert_eq!(kind(400, other), ErrorKind::BadRequest);
    }

    #[test]
    fn test_anthropic_error_types() {
        let overloaded = r#"{"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}"#;
        assert_eq!(kind(529, overloaded), ErrorKind::RateLimited);

        let too_long = r#"{"type":"error","error":{"type":"invalid_request_error","message":"prompt is too long: 210000 tokens > 200000 maximum"}}"#;
        assert_eq!(kind(400, too_long), ErrorKind::TokenLimitExceeded);
    }

    #[test]
    fn test_ollama_string_error_message_is_kept() {
        let err = classify_status(
            "ollama",
            StatusCode::NOT_FOUND,
            r#"{"error":"model 'llama9' not found"}"#,
            None,
        );
        assert_eq!(err.kind, ErrorKind::BadRequest);
        assert!(err.message.contains("model 'llama9' not found"));
    }

    #[test]
    fn test_retry_after_only_kept_for_retryable_kinds() {
        let hint = Some(Duration::from_secs(12));
        let limited = classify_status("test", StatusCode::TOO_MANY_REQUESTS, "", hint);
        assert_eq!(limited.retry_after, hint);

        let bad = classify_status("test", StatusCode::BAD_REQUEST, "", hint);
        assert_eq!(bad.retry_after, None);
    }

    #[test]
    fn test_parse_retry_after() {
        let secs = HeaderValue::from_static("17");
        assert_eq!(parse_retry_after(Some(&secs)), Some(Duration::from_secs(17)));

        let date = HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT");
        assert_eq!(parse_retry_after(Some(&date)), None);
        assert_eq!(parse_retry_after(None), None);
    }

    #[test]
    fn test_long_unstructured_body_is_truncated() {
        let body = "x".repeat(1000);
        let err = classify_status("test", StatusCode::BAD_GATEWAY, &body, None);
        assert!(err.message.len() < 400);
    }
}
