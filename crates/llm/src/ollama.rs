//! Ollama chat adapter for locally hosted models.

use async_trait::async_trait;
use pipeline::{CompletionProvider, CompletionRequest, ErrorKind, ModelName, ProviderError, ProviderId};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::transport::send_json;

pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";
pub const DEFAULT_MODEL: &str = "llama3.1";

/// [`CompletionProvider`] for `POST /api/chat` with streaming disabled.
///
/// Ollama needs no API key.
#[derive(Debug, Clone)]
pub struct OllamaProvider {
    client: Client,
    base_url: String,
    model: ModelName,
}

impl OllamaProvider {
    pub fn new(client: Client, base_url: impl Into<String>, model: ModelName) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model,
        }
    }

    fn body<'a>(&'a self, request: &'a CompletionRequest) -> ChatRequest<'a> {
        ChatRequest {
            model: request.model.as_ref().unwrap_or(&self.model).as_str(),
            stream: false,
            messages: [ChatMessage {
                role: "user",
                content: &request.prompt,
            }],
            options: Options {
                temperature: request.temperature,
                num_predict: request.max_tokens,
            },
        }
    }
}

#[async_trait]
impl CompletionProvider for OllamaProvider {
    fn id(&self) -> ProviderId {
        ProviderId::Ollama
    }

    fn default_model(&self) -> &ModelName {
        &self.model
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String, ProviderError> {
        let http = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(&self.body(request));

        let response: ChatResponse = send_json("ollama", http, request.timeout).await?;
        match response.message.map(|m| m.content).filter(|c| !c.trim().is_empty()) {
            Some(text) => Ok(text),
            None => Err(ProviderError::new(
                ErrorKind::UnparseableResponse,
                "ollama returned an empty message",
            )),
        }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    stream: bool,
    messages: [ChatMessage<'a>; 1],
    options: Options,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct Options {
    temperature: f32,
    num_predict: u32,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    message: Option<ReplyMessage>,
}

#[derive(Deserialize)]
struct ReplyMessage {
    #[serde(default)]
    content: String,
}
