//! OpenAI Chat Completions adapter.

use async_trait::async_trait;
use pipeline::{CompletionProvider, CompletionRequest, ErrorKind, ModelName, ProviderError, ProviderId};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::transport::send_json;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// [`CompletionProvider`] for `POST /v1/chat/completions`.
#[derive(Debug, Clone)]
pub struct OpenAiProvider {
    client: Client,
    base_url: String,
    api_key: String,
    model: ModelName,
}

impl OpenAiProvider {
    pub fn new(client: Client, base_url: impl Into<String>, api_key: impl Into<String>, model: ModelName) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model,
        }
    }

    fn body<'a>(&'a self, request: &'a CompletionRequest) -> ChatRequest<'a> {
        ChatRequest {
            model: request.model.as_ref().unwrap_or(&self.model).as_str(),
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            messages: [ChatMessage {
                role: "user",
                content: &request.prompt,
            }],
        }
    }
}

#[async_trait]
impl CompletionProvider for OpenAiProvider {
    fn id(&self) -> ProviderId {
        ProviderId::OpenAi
    }

    fn default_model(&self) -> &ModelName {
        &self.model
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String, ProviderError> {
        let http = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&self.body(request));

        let response: ChatResponse = send_json("openai", http, request.timeout).await?;
        extract_text(response)
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    messages: [ChatMessage<'a>; 1],
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ReplyMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ReplyMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    refusal: Option<String>,
}

fn extract_text(response: ChatResponse) -> Result<String, ProviderError> {
    let Some(choice) = response.choices.into_iter().next() else {
        return Err(ProviderError::new(
            ErrorKind::UnparseableResponse,
            "openai returned no choices",
        ));
    };

    if choice.finish_reason.as_deref() == Some("content_filter") {
        return Err(ProviderError::new(
            ErrorKind::ContentFiltered,
            "openai filtered the completion (finish_reason=content_filter)",
        ));
    }
    if let Some(refusal) = choice.message.refusal.filter(|r| !r.is_empty()) {
        return Err(ProviderError::new(
            ErrorKind::ContentFiltered,
            format!("openai refused: {refusal}"),
        ));
    }

    match choice.message.content.filter(|c| !c.is_empty()) {
        Some(text) => Ok(text),
        None if choice.finish_reason.as_deref() == Some("length") => Err(ProviderError::new(
            ErrorKind::TokenLimitExceeded,
            "openai hit the token limit before producing content",
        )),
        None => Err(ProviderError::new(
            ErrorKind::UnparseableResponse,
            "openai returned an empty message",
        )),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn decode(json: &str) -> Result<String, ProviderError> {
        extract_text(serde_json::from_str(json).unwrap())
    }

    #[test]
    fn test_body_defaults_to_provider_model() {
        let provider = OpenAiProvider::new(
            Client::new(),
            DEFAULT_BASE_URL,
            "sk-test",
            ModelName::new(DEFAULT_MODEL).unwrap(),
        );
        let request = CompletionRequest {
            prompt: "classify".to_string(),
            model: None,
            temperature: 0.0,
            max_tokens: 100,
            timeout: Duration::from_secs(10),
        };

        let body = serde_json::to_value(provider.body(&request)).unwrap();
        assert_eq!(body["model"], DEFAULT_MODEL);
        assert_eq!(body["messages"][0]["content"], "classify");
    }

    #[test]
    fn test_first_choice_content_returned() {
        let text = decode(
            r#"{"choices":[{"message":{"role":"assistant","content":"{}"},"finish_reason":"stop"}]}"#,
        )
        .unwrap();
        assert_eq!(text, "{}");
    }

    #[test]
    fn test_content_filter_and_refusal() {
        let filtered = decode(r#"{"choices":[{"message":{"content":null},"finish_reason":"content_filter"}]}"#);
        assert_eq!(filtered.unwrap_err().kind, ErrorKind::ContentFiltered);

        let refused = decode(r#"{"choices":[{"message":{"content":null,"refusal":"I can't"},"finish_reason":"stop"}]}"#);
        assert_eq!(refused.unwrap_err().kind, ErrorKind::ContentFiltered);
    }

    #[test]
    fn test_empty_and_truncated_replies() {
        let none = decode(r#"{"choices":[]}"#);
        assert_eq!(none.unwrap_err().kind, ErrorKind::UnparseableResponse);

        let cut = decode(r#"{"choices":[{"message":{"content":""},"finish_reason":"length"}]}"#);
        assert_eq!(cut.unwrap_err().kind, ErrorKind::TokenLimitExceeded);
    }
}
