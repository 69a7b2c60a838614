// forge-providers/src/llm.rs
// ============================================================================
// Module: LLM Client
// Description: Chat-completion client for procedure step functions that
//              summarize or transform content (e.g. SAM opportunity
//              summarization).
// Dependencies: reqwest, async-trait
// ============================================================================

use async_trait::async_trait;
use serde::Deserialize;
use serde::Serialize;

use crate::error::ProviderError;

/// One message in a chat-completion request.
#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    /// `"system"`, `"user"`, or `"assistant"`.
    pub role: String,
    /// Message text.
    pub content: String,
}

/// A chat-completion request. `model` and `temperature` are resolved
/// per-task from §6.5's LLM task table before a request is built.
#[derive(Debug, Clone, Serialize)]
pub struct ChatCompletionRequest {
    /// Model identifier.
    pub model: String,
    /// Sampling temperature.
    pub temperature: f32,
    /// Conversation so far, in order.
    pub messages: Vec<ChatMessage>,
}

/// Calls the configured LLM service (§6.4, §6.5 per-task model/temperature).
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Requests a chat completion and returns the assistant's reply text.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError`] when the service is unreachable or
    /// responds unexpectedly.
    async fn chat_completion(&self, request: ChatCompletionRequest) -> Result<String, ProviderError>;
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

/// HTTP-backed [`LlmClient`] speaking an OpenAI-compatible chat-completions
/// API.
pub struct HttpLlmClient {
    http: reqwest::Client,
    base_url: String,
}

impl HttpLlmClient {
    /// Builds a client bound to `base_url`.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self { http: reqwest::Client::new(), base_url: base_url.into() }
    }
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn chat_completion(&self, request: ChatCompletionRequest) -> Result<String, ProviderError> {
        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(|error| ProviderError::from_reqwest("llm", &error))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Rejected { service: "llm", status, body });
        }

        let parsed: CompletionResponse = response
            .json()
            .await
            .map_err(|error| ProviderError::InvalidResponse { service: "llm", message: error.to_string() })?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| ProviderError::InvalidResponse { service: "llm", message: "empty choices list".into() })
    }
}
