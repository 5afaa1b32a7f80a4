//! Generative text backends.
//!
//! The synthesizer talks to a [`TextBackend`]; production uses
//! [`AnthropicBackend`] (the Messages API over reqwest), tests use a scripted
//! fake.

use std::future::Future;
use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Default Messages API endpoint.
pub const DEFAULT_ANTHROPIC_URL: &str = "https://api.anthropic.com";

/// Messages API version header value.
pub const ANTHROPIC_VERSION: &str = "2023-06-01";

/// A single generation call: one system instruction, one user message.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub system: String,
    pub user: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

/// Errors from a generation call.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("backend returned no usable text")]
    EmptyResponse,

    #[error("failed to serialize prompt input: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl GenerationError {
    /// True if the backend was unreachable or overloaded rather than
    /// rejecting the request.
    pub fn is_unavailable(&self) -> bool {
        match self {
            GenerationError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            GenerationError::Api { status, .. } => *status >= 500 || *status == 429,
            GenerationError::EmptyResponse | GenerationError::Serialize(_) => false,
        }
    }
}

/// A generative text backend.
pub trait TextBackend: Send + Sync {
    /// Runs one generation and returns the produced text.
    fn generate(
        &self,
        request: &GenerationRequest,
    ) -> impl Future<Output = Result<String, GenerationError>> + Send;
}

// ─── Anthropic Messages API ───────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    system: &'a str,
    messages: [Message<'a>; 1],
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

impl MessagesResponse {
    /// Returns the first text block, if any.
    fn into_text(self) -> Option<String> {
        self.content
            .into_iter()
            .find(|block| block.kind == "text")
            .and_then(|block| block.text)
    }
}

/// Backend for the Anthropic Messages API.
#[derive(Debug, Clone)]
pub struct AnthropicBackend {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl AnthropicBackend {
    /// Creates a backend whose every call is bounded by `timeout`.
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, GenerationError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(AnthropicBackend {
            client,
            base_url: DEFAULT_ANTHROPIC_URL.to_string(),
            api_key: api_key.into(),
            model: model.into(),
        })
    }

    /// Points the backend at a different endpoint.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn build_body<'a>(&'a self, request: &'a GenerationRequest) -> MessagesRequest<'a> {
        MessagesRequest {
            model: &self.model,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            system: &request.system,
            messages: [Message {
                role: "user",
                content: &request.user,
            }],
        }
    }
}

impl TextBackend for AnthropicBackend {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        let url = format!("{}/v1/messages", self.base_url.trim_end_matches('/'));
        debug!(model = %self.model, max_tokens = request.max_tokens, "Calling Messages API");

        let resp = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&self.build_body(request))
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(GenerationError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let response: MessagesResponse = resp.json().await?;
        response
            .into_text()
            .filter(|text| !text.trim().is_empty())
            .ok_or(GenerationError::EmptyResponse)
    }
}
