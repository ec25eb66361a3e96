//! OpenAI-compatible chat-completion backend.
//!
//! Works against any endpoint exposing `POST {base_url}/chat/completions`
//! (Groq, OpenAI, local gateways). The bearer credential is passed in by the
//! caller and never read from the environment here.

use super::Completer;
use crate::error::{CompletionError, ConfigError};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Completer backed by an OpenAI-compatible HTTP API.
pub struct OpenAiCompleter {
    model: String,
    endpoint: String,
    api_key: String,
    client: Client,
}

impl OpenAiCompleter {
    /// Create a new completer. `base_url` is the API root, e.g.
    /// `https://api.groq.com/openai/v1`.
    pub fn new(
        base_url: String,
        model: String,
        api_key: String,
        timeout: Duration,
    ) -> Result<Self, ConfigError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ConfigError::Invalid(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            model,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            api_key,
            client,
        })
    }

    async fn send(
        &self,
        system: Option<&str>,
        prompt: &str,
        max_tokens: u32,
    ) -> Result<String, CompletionError> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = system {
            messages.push(ChatMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: prompt,
        });

        let request = ChatRequest {
            model: &self.model,
            messages,
            max_tokens,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| CompletionError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiError>(&body)
                .map(|e| e.error.message)
                .unwrap_or_else(|_| {
                    if body.is_empty() {
                        "Unknown error".to_string()
                    } else {
                        body
                    }
                });
            return Err(CompletionError::Upstream {
                status: status.as_u16(),
                message,
            });
        }

        let body: ChatResponse = response.json().await?;

        body.choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or(CompletionError::EmptyResponse)
    }
}

#[async_trait]
impl Completer for OpenAiCompleter {
    async fn complete(
        &self,
        cancel: &CancellationToken,
        system: Option<&str>,
        prompt: &str,
        max_tokens: u32,
    ) -> Result<String, CompletionError> {
        debug!(model = %self.model, prompt_len = prompt.len(), "Sending completion request");

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(CompletionError::Cancelled),
            result = self.send(system, prompt, max_tokens) => result,
        };

        if let Ok(text) = &result {
            debug!(model = %self.model, response_len = text.len(), "Received completion");
        }
        result
    }

    fn model(&self) -> &str {
        &self.model
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Debug, Deserialize)]
struct ChatMessageResponse {
    content: String,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}
