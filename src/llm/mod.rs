//! Request/response flavor: OpenAI-compatible chat completions.
//!
//! Language-model workers are served over plain HTTP through the same tunnel
//! machinery. Only the endpoint normalisation and a minimal completion call
//! live here; streaming chat is out of scope.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::auth::{Credential, DEFAULT_WORKER_TOKEN};
use crate::health::{self, HealthConfig, HealthError, HealthReport};

/// Model served by the default language-model worker.
pub const DEFAULT_MODEL: &str = "CohereForAI/aya-101";

#[derive(Error, Debug)]
pub enum LlmError {
    #[error("Invalid endpoint URL: {0}")]
    InvalidUrl(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Worker returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Response contained no choices")]
    EmptyResponse,

    #[error("Health check failed: {0}")]
    Health(#[from] HealthError),
}

/// Base URL and credential of an OpenAI-compatible worker.
#[derive(Debug, Clone)]
pub struct LlmEndpoint {
    base_url: String,
    credential: Credential,
}

impl LlmEndpoint {
    /// Normalise `base_url` so it ends in `/v1`. Falls back to the workers'
    /// shared default token when no credential is given.
    pub fn new(base_url: &str, credential: Option<Credential>) -> Result<Self, LlmError> {
        let trimmed = base_url.trim().trim_end_matches('/');
        if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
            return Err(LlmError::InvalidUrl(base_url.to_string()));
        }
        let base_url = if trimmed.ends_with("/v1") {
            trimmed.to_string()
        } else {
            format!("{}/v1", trimmed)
        };
        Ok(Self {
            base_url,
            credential: credential.unwrap_or_else(|| Credential::new(DEFAULT_WORKER_TOKEN)),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn credential(&self) -> &Credential {
        &self.credential
    }

    pub fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".into(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".into(),
            content: content.into(),
        }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    stream: bool,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChatMessage,
}

/// Minimal chat-completions client.
pub struct ChatClient {
    http: reqwest::Client,
    endpoint: LlmEndpoint,
    model: String,
    max_tokens: Option<u32>,
}

impl ChatClient {
    pub fn new(endpoint: LlmEndpoint) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint,
            model: DEFAULT_MODEL.to_string(),
            max_tokens: None,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn endpoint(&self) -> &LlmEndpoint {
        &self.endpoint
    }

    /// Wait for the worker's health endpoint before the first request.
    pub async fn wait_until_ready(&self, config: &HealthConfig) -> Result<HealthReport, LlmError> {
        Ok(health::wait_until_ready(self.endpoint.base_url(), config).await?)
    }

    /// Send `messages` and return the first choice's content.
    pub async fn complete(&self, messages: &[ChatMessage]) -> Result<String, LlmError> {
        let url = self.endpoint.completions_url();
        debug!(
            url = %url,
            model = %self.model,
            messages = messages.len(),
            credential = %self.endpoint.credential.fingerprint(),
            "chat completion request"
        );

        let request = ChatRequest {
            model: &self.model,
            messages,
            max_tokens: self.max_tokens,
            stream: false,
        };
        let response = self
            .http
            .post(&url)
            .header(
                reqwest::header::AUTHORIZATION,
                self.endpoint.credential.bearer(),
            )
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatResponse = response.json().await?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or(LlmError::EmptyResponse)?;
        info!(chars = content.chars().count(), "chat completion received");
        Ok(content)
    }
}
