//! Ollama embedding provider.
//!
//! Calls a local Ollama server's `/api/embed` endpoint. Device placement
//! comes from the resolved [`AcceleratorConfig`]: on CPU the model is
//! pinned off the GPU (`num_gpu: 0`), on CUDA the selected device index
//! is passed as `main_gpu`. Only available when the `ollama` feature is
//! enabled.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::device::{AcceleratorConfig, Device};
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::net::{RetryPolicy, build_client, classify_transport_error, with_retry};

/// The default Ollama server address.
pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// An [`EmbeddingProvider`] backed by a local Ollama server.
///
/// # Example
///
/// ```rust,ignore
/// use ragmark_core::device::AcceleratorConfig;
/// use ragmark_core::ollama::OllamaEmbedding;
///
/// let accel = AcceleratorConfig::default();
/// let provider = OllamaEmbedding::new("http://localhost:11434", "nomic-embed-text", 768, &accel)?;
/// let embedding = provider.embed("hello world").await?;
/// ```
pub struct OllamaEmbedding {
    client: reqwest::Client,
    base_url: String,
    model: String,
    dimensions: usize,
    options: serde_json::Value,
    timeout: Duration,
    retry: RetryPolicy,
    name: String,
}

impl OllamaEmbedding {
    /// Create a provider for `model` served at `base_url`.
    ///
    /// `dimensions` must match the model's output dimensionality; the
    /// accelerator settings are resolved once here and never mutated.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::EmbeddingError`] if the HTTP client cannot be
    /// constructed.
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        dimensions: usize,
        accelerator: &AcceleratorConfig,
    ) -> Result<Self> {
        let model = model.into();
        let options = device_options(accelerator);
        let name = format!("ollama:{model}");
        Ok(Self {
            client: build_client(DEFAULT_TIMEOUT)?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model,
            dimensions,
            options,
            timeout: DEFAULT_TIMEOUT,
            retry: RetryPolicy::default(),
            name,
        })
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
        let url = format!("{}/api/embed", self.base_url);
        let body = EmbedRequest { model: &self.model, input: texts.to_vec(), options: &self.options };

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
            if status.as_u16() == 429 || status.is_server_error() {
                return Err(RagError::UpstreamUnavailable {
                    provider: "ollama".into(),
                    message: format!("server returned {status}: {detail}"),
                });
            }
            return Err(RagError::EmbeddingError {
                provider: "ollama".into(),
                message: format!("server returned {status}: {detail}"),
            });
        }

        let parsed: EmbedResponse = response.json().await.map_err(|e| {
            RagError::EmbeddingError {
                provider: "ollama".into(),
                message: format!("failed to parse response: {e}"),
            }
        })?;
        Ok(parsed.embeddings)
    }
}

/// Translate the resolved device into Ollama model options.
fn device_options(accelerator: &AcceleratorConfig) -> serde_json::Value {
    match accelerator.device {
        Device::Cpu => json!({ "num_gpu": 0 }),
        Device::Cuda(index) => json!({ "main_gpu": index }),
    }
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: Vec<&'a str>,
    options: &'a serde_json::Value,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[async_trait]
impl EmbeddingProvider for OllamaEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let results = self.embed_batch(&[text]).await?;
        results.into_iter().next().ok_or_else(|| RagError::EmbeddingError {
            provider: "ollama".into(),
            message: "server returned an empty response".into(),
        })
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        debug!(provider = "ollama", batch_size = texts.len(), model = %self.model, "embedding batch");
        with_retry(&self.retry, "ollama.embed_batch", || self.request_embeddings(texts)).await
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &str {
        &self.name
    }

    /// Ask the server to unload the model, releasing accelerator memory.
    ///
    /// Idempotent: unloading an already-unloaded model is a no-op, and a
    /// failure here only logs a warning.
    async fn clear_cache(&self) -> Result<()> {
        let url = format!("{}/api/generate", self.base_url);
        let body = json!({ "model": self.model, "keep_alive": 0 });
        match self.client.post(&url).json(&body).send().await {
            Ok(_) => info!(model = %self.model, "requested model unload"),
            Err(e) => warn!(model = %self.model, error = %e, "model unload request failed"),
        }
        Ok(())
    }
}
