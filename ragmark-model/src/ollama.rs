//! Ollama answer generator.

use std::time::Duration;

use async_trait::async_trait;
use ragmark_core::generation::AnswerGenerator;
use ragmark_core::net::{RetryPolicy, with_retry};
use ragmark_core::{RagError, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{DEFAULT_TIMEOUT, build_client, classify_transport_error, status_error};

/// An [`AnswerGenerator`] backed by a local Ollama server.
///
/// Uses the non-streaming `/api/generate` endpoint: the whole completion
/// comes back in one response.
pub struct OllamaGenerator {
    client: reqwest::Client,
    base_url: String,
    model: String,
    temperature: f32,
    timeout: Duration,
    retry: RetryPolicy,
    name: String,
}

impl OllamaGenerator {
    /// Create a generator for `model` served at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::GenerationError`] if the HTTP client cannot be
    /// constructed.
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Result<Self> {
        let model = model.into();
        let name = format!("ollama:{model}");
        Ok(Self {
            client: build_client(DEFAULT_TIMEOUT)?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model,
            temperature: 0.7,
            timeout: DEFAULT_TIMEOUT,
            retry: RetryPolicy::default(),
            name,
        })
    }

    /// Set the sampling temperature (default 0.7).
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
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
        let url = format!("{}/api/generate", self.base_url);
        let body = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
            options: GenerateOptions { temperature: self.temperature },
        };

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| classify_transport_error("ollama", self.timeout, e))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(status_error("ollama", status, detail));
        }

        let parsed: GenerateResponse = response.json().await.map_err(|e| {
            RagError::GenerationError {
                provider: "ollama".into(),
                message: format!("failed to parse response: {e}"),
            }
        })?;
        Ok(parsed.response)
    }
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Serialize)]
struct GenerateOptions {
    temperature: f32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

#[async_trait]
impl AnswerGenerator for OllamaGenerator {
    async fn generate(&self, prompt: &str) -> Result<String> {
        debug!(provider = "ollama", model = %self.model, prompt_len = prompt.len(), "generating");
        with_retry(&self.retry, "ollama.generate", || self.request_completion(prompt)).await
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_tracks_the_model() {
        let generator = OllamaGenerator::new("http://localhost:11434", "llama3").unwrap();
        assert_eq!(generator.name(), "ollama:llama3");
    }

    #[test]
    fn base_url_is_normalized() {
        let generator = OllamaGenerator::new("http://localhost:11434/", "llama3").unwrap();
        assert_eq!(generator.base_url, "http://localhost:11434");
    }
}
