//! OpenAI-compatible chat-completion client.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use research_core::ModelCandidate;

use super::UpstreamError;

/// Longest upstream error body kept in an error message.
const MAX_ERROR_BODY_CHARS: usize = 500;

const SYSTEM_MESSAGE: &str =
    "You write research task definitions. Reply with a single JSON object and nothing else.";

/// A chat-completion backend that answers in JSON-object mode.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Send one request to `model` and return the raw message content.
    async fn complete_json(
        &self,
        model: &ModelCandidate,
        prompt: &str,
    ) -> Result<String, UpstreamError>;
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [Message<'a>; 2],
    response_format: ResponseFormat,
    temperature: f32,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    type_: &'static str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

/// Chat client for `{base_url}/chat/completions`.
pub struct OpenAiChatClient {
    inner: Client,
    base_url: String,
    api_key: Option<String>,
    temperature: f32,
}

impl OpenAiChatClient {
    /// Create a new chat client.
    pub fn new(inner: Client, base_url: &str, api_key: Option<String>, temperature: f32) -> Self {
        Self {
            inner,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            temperature,
        }
    }
}

#[async_trait]
impl ChatBackend for OpenAiChatClient {
    async fn complete_json(
        &self,
        model: &ModelCandidate,
        prompt: &str,
    ) -> Result<String, UpstreamError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(UpstreamError::NotConfigured("chat API key"))?;

        let url = format!("{}/chat/completions", self.base_url);
        debug!(url = %url, model = %model, "Chat completion request");

        let body = ChatRequest {
            model: model.as_str(),
            messages: [
                Message {
                    role: "system",
                    content: SYSTEM_MESSAGE,
                },
                Message {
                    role: "user",
                    content: prompt,
                },
            ],
            response_format: ResponseFormat {
                type_: "json_object",
            },
            temperature: self.temperature,
        };

        let response = self
            .inner
            .post(&url)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(UpstreamError::Status {
                status: status.as_u16(),
                body: truncate(&text, MAX_ERROR_BODY_CHARS),
            });
        }

        let parsed: ChatResponse =
            serde_json::from_str(&text).map_err(|e| UpstreamError::Decode(e.to_string()))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| UpstreamError::Decode("response has no message content".to_string()))
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
