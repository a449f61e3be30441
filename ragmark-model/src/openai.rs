//! OpenAI-compatible answer generator.

use std::time::Duration;

use async_trait::async_trait;
use ragmark_core::generation::AnswerGenerator;
use ragmark_core::net::{RetryPolicy, with_retry};
use ragmark_core::{RagError, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{DEFAULT_TIMEOUT, build_client, classify_transport_error, status_error};

/// The default OpenAI API base URL.
const DEFAULT_BASE_URL: &str = "https://api.openai.com";

/// The default chat model.
const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// An [`AnswerGenerator`] backed by the OpenAI chat API or any
/// compatible server (vLLM, llama.cpp server, etc.).
pub struct OpenAiGenerator {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
    timeout: Duration,
    retry: RetryPolicy,
    name: String,
}

impl OpenAiGenerator {
    /// Create a generator with the given API key and the default model.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::GenerationError`] if the key is empty or the
    /// HTTP client cannot be constructed.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.is_empty() {
            return Err(RagError::GenerationError {
                provider: "openai".into(),
                message: "API key must not be empty".into(),
            });
        }
        Ok(Self {
            client: build_client(DEFAULT_TIMEOUT)?,
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            temperature: 0.7,
            max_tokens: None,
            timeout: DEFAULT_TIMEOUT,
            retry: RetryPolicy::default(),
            name: format!("openai:{DEFAULT_MODEL}"),
        })
    }

    /// Create a generator using the `OPENAI_API_KEY` environment variable.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY").map_err(|_| RagError::GenerationError {
            provider: "openai".into(),
            message: "OPENAI_API_KEY environment variable not set".into(),
        })?;
        Self::new(api_key)
    }

    /// Point the generator at a compatible server instead of api.openai.com.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Set the model name.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self.name = format!("openai:{}", self.model);
        self
    }

    /// Set the sampling temperature (default 0.7).
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Cap the completion length.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Set the per-request timeout.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::GenerationError`] if the HTTP client cannot be
    /// rebuilt.
    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self> {
        self.timeout = timeout;
        self.client = build_client(timeout)?;
        Ok(self)
    }

    /// Set the bounded retry policy for transient failures.
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    async fn request_completion(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let body = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage { role: "user", content: prompt }],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| classify_transport_error("openai", self.timeout, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let detail = serde_json::from_str::<ErrorResponse>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            return Err(status_error("openai", status, detail));
        }

        let parsed: ChatResponse = response.json().await.map_err(|e| {
            RagError::GenerationError {
                provider: "openai".into(),
                message: format!("failed to parse response: {e}"),
            }
        })?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| RagError::GenerationError {
                provider: "openai".into(),
                message: "API returned no choices".into(),
            })
    }
}

// ── API request/response types ─────────────────────────────────────

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: String,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

#[async_trait]
impl AnswerGenerator for OpenAiGenerator {
    async fn generate(&self, prompt: &str) -> Result<String> {
        debug!(provider = "openai", model = %self.model, prompt_len = prompt.len(), "generating");
        with_retry(&self.retry, "openai.generate", || self.request_completion(prompt)).await
    }

    fn name(&self) -> &str {
        &self.name
    }
}
