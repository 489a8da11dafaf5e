//! Text-completion backend for the drafting pipeline
//!
//! [`ChatCompletionClient`] speaks the OpenAI-compatible chat completions
//! protocol, which DeepSeek and most hosted models accept.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::config::DraftingConfig;
use crate::error::Error;

#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub prompt: String,
    pub max_tokens: u32,
}

#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("no API key configured for the completion service")]
    NotConfigured,

    #[error("request failed: {0}")]
    Transport(String),

    #[error("request timed out")]
    Timeout,

    #[error("completion service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("completion response had no choices")]
    EmptyResponse,

    #[error("completion response malformed: {0}")]
    Decode(String),
}

impl CompletionError {
    /// Failures worth another attempt: transport, timeouts, 429 and 5xx
    pub fn is_transient(&self) -> bool {
        match self {
            CompletionError::Transport(_) | CompletionError::Timeout => true,
            CompletionError::Status { status, .. } => *status == 429 || *status >= 500,
            CompletionError::NotConfigured
            | CompletionError::EmptyResponse
            | CompletionError::Decode(_) => false,
        }
    }
}

impl From<CompletionError> for Error {
    fn from(err: CompletionError) -> Self {
        Error::ExternalService(err.to_string())
    }
}

impl From<reqwest::Error> for CompletionError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            CompletionError::Timeout
        } else if err.is_decode() {
            CompletionError::Decode(err.to_string())
        } else {
            CompletionError::Transport(err.to_string())
        }
    }
}

#[async_trait]
pub trait CompletionService: Send + Sync {
    /// Send one prompt, return the reply text
    async fn complete(&self, request: CompletionRequest) -> Result<String, CompletionError>;
}

pub struct ChatCompletionClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    temperature: f64,
}

impl ChatCompletionClient {
    pub fn new(config: &DraftingConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build HTTP client: {}", e))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone().filter(|key| !key.is_empty()),
            model: config.model.clone(),
            temperature: config.temperature,
        })
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

#[async_trait]
impl CompletionService for ChatCompletionClient {
    async fn complete(&self, request: CompletionRequest) -> Result<String, CompletionError> {
        let api_key = self.api_key.as_ref().ok_or(CompletionError::NotConfigured)?;

        let body = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: request.prompt,
            }],
            temperature: self.temperature,
            max_tokens: request.max_tokens,
        };

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(CompletionError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let reply: ChatResponse = response.json().await?;
        reply
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or(CompletionError::EmptyResponse)
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f64,
    max_tokens: u32,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChatMessage,
}
