//! Anthropic Messages API adapter.

use async_trait::async_trait;
use pipeline::{CompletionProvider, CompletionRequest, ErrorKind, ModelName, ProviderError, ProviderId};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::transport::send_json;

pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// [`CompletionProvider`] for `POST /v1/messages`.
#[derive(Debug, Clone)]
pub struct AnthropicProvider {
    client: Client,
    base_url: String,
    api_key: String,
    model: ModelName,
}

impl AnthropicProvider {
    pub fn new(client: Client, base_url: impl Into<String>, api_key: impl Into<String>, model: ModelName) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model,
        }
    }

    fn body<'a>(&'a self, request: &'a CompletionRequest) -> MessagesRequest<'a> {
        MessagesRequest {
            model: request.model.as_ref().unwrap_or(&self.model).as_str(),
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            messages: [Message {
                role: "user",
                content: &request.prompt,
            }],
        }
    }
}

#[async_trait]
impl CompletionProvider for AnthropicProvider {
    fn id(&self) -> ProviderId {
        ProviderId::Anthropic
    }

    fn default_model(&self) -> &ModelName {
        &self.model
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String, ProviderError> {
        let http = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&self.body(request));

        let response: MessagesResponse = send_json("anthropic", http, request.timeout).await?;
        extract_text(response)
    }
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    messages: [Message<'a>; 1],
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Deserialize)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(other)]
    Other,
}

fn extract_text(response: MessagesResponse) -> Result<String, ProviderError> {
    if response.stop_reason.as_deref() == Some("refusal") {
        return Err(ProviderError::new(
            ErrorKind::ContentFiltered,
            "anthropic declined to answer (stop_reason=refusal)",
        ));
    }

    let text: String = response
        .content
        .into_iter()
        .filter_map(|block| match block {
            ContentBlock::Text { text } => Some(text),
            ContentBlock::Other => None,
        })
        .collect();

    if text.is_empty() {
        let kind = if response.stop_reason.as_deref() == Some("max_tokens") {
            ErrorKind::TokenLimitExceeded
        } else {
            ErrorKind::UnparseableResponse
        };
        return Err(ProviderError::new(kind, "anthropic returned no text content"));
    }
    Ok(text)
}
