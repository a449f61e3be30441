//! OpenAI-compatible embedding provider.
//!
//! Calls the `/v1/embeddings` endpoint of the OpenAI API or any
//! compatible server. Only available when the `openai` feature is
//! enabled.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::net::{RetryPolicy, build_client, classify_transport_error, with_retry};

/// The default OpenAI API base URL.
const DEFAULT_BASE_URL: &str = "https://api.openai.com";

/// The default embedding model.
const DEFAULT_MODEL: &str = "text-embedding-3-small";

/// The default dimensionality for `text-embedding-3-small`.
const DEFAULT_DIMENSIONS: usize = 1536;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// An [`EmbeddingProvider`] backed by an OpenAI-compatible embeddings API.
///
/// # Example
///
/// ```rust,ignore
/// use ragmark_core::openai::OpenAiEmbedding;
///
/// let provider = OpenAiEmbedding::new("sk-...")?
///     .with_model("text-embedding-3-large", 3072)?;
/// let embedding = provider.embed("hello world").await?;
/// ```
pub struct OpenAiEmbedding {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    dimensions: usize,
    timeout: Duration,
    retry: RetryPolicy,
    name: String,
}

impl OpenAiEmbedding {
    /// Create a provider with the given API key and the default model.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::EmbeddingError`] if the key is empty or the
    /// HTTP client cannot be constructed.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.is_empty() {
            return Err(RagError::EmbeddingError {
                provider: "openai".into(),
                message: "API key must not be empty".into(),
            });
        }

        let client = build_client(DEFAULT_TIMEOUT)?;
        Ok(Self {
            client,
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            dimensions: DEFAULT_DIMENSIONS,
            timeout: DEFAULT_TIMEOUT,
            retry: RetryPolicy::default(),
            name: format!("openai:{DEFAULT_MODEL}"),
        })
    }

    /// Create a provider using the `OPENAI_API_KEY` environment variable.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY").map_err(|_| RagError::EmbeddingError {
            provider: "openai".into(),
            message: "OPENAI_API_KEY environment variable not set".into(),
        })?;
        Self::new(api_key)
    }

    /// Point the provider at a compatible server instead of api.openai.com.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Set the model name and its dimensionality.
    pub fn with_model(mut self, model: impl Into<String>, dimensions: usize) -> Self {
        self.model = model.into();
        self.dimensions = dimensions;
        self.name = format!("openai:{}", self.model);
        self
    }

    /// Set the per-request timeout.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::EmbeddingError`] if the HTTP client cannot be
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

    async fn request_embeddings(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/v1/embeddings", self.base_url);
        let body = EmbeddingRequest { model: &self.model, input: texts.to_vec() };

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
            error!(provider = "openai", %status, "embeddings API error");

            if status.as_u16() == 429 || status.is_server_error() {
                return Err(RagError::UpstreamUnavailable {
                    provider: "openai".into(),
                    message: format!("API returned {status}: {detail}"),
                });
            }
            return Err(RagError::EmbeddingError {
                provider: "openai".into(),
                message: format!("API returned {status}: {detail}"),
            });
        }

        let parsed: EmbeddingResponse = response.json().await.map_err(|e| {
            RagError::EmbeddingError {
                provider: "openai".into(),
                message: format!("failed to parse response: {e}"),
            }
        })?;
        Ok(parsed.data.into_iter().map(|d| d.embedding).collect())
    }
}

// ── API request/response types ─────────────────────────────────────

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: Vec<&'a str>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
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
impl EmbeddingProvider for OpenAiEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let results = self.embed_batch(&[text]).await?;
        results.into_iter().next().ok_or_else(|| RagError::EmbeddingError {
            provider: "openai".into(),
            message: "API returned an empty response".into(),
        })
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        debug!(provider = "openai", batch_size = texts.len(), model = %self.model, "embedding batch");
        with_retry(&self.retry, "openai.embed_batch", || self.request_embeddings(texts)).await
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &str {
        &self.name
    }
}
