//! # ragmark-model
//!
//! Answer-generator adapters for ragmark.
//!
//! ## Overview
//!
//! Implementations of [`ragmark_core::AnswerGenerator`]:
//!
//! - [`OllamaGenerator`] — a local Ollama server (`/api/generate`)
//! - [`OpenAiGenerator`] — the OpenAI chat API or any compatible server
//!   (`/v1/chat/completions`)
//!
//! Both adapters apply the per-request timeout and the bounded retry
//! policy for transient failures; authentication and other request
//! errors are surfaced immediately.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use ragmark_model::OllamaGenerator;
//!
//! let generator = OllamaGenerator::new("http://localhost:11434", "llama3")?;
//! let answer = generator.generate("Why does feedback reduce error?").await?;
//! ```

pub mod ollama;
pub mod openai;

pub use ollama::OllamaGenerator;
pub use openai::OpenAiGenerator;

use std::time::Duration;

use ragmark_core::{RagError, Result};

pub(crate) const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Map a reqwest transport error to the retryable taxonomy.
pub(crate) fn classify_transport_error(
    provider: &str,
    timeout: Duration,
    e: reqwest::Error,
) -> RagError {
    if e.is_timeout() {
        RagError::UpstreamTimeout { provider: provider.into(), seconds: timeout.as_secs() }
    } else if e.is_connect() {
        RagError::UpstreamUnavailable {
            provider: provider.into(),
            message: format!("connection failed: {e}"),
        }
    } else {
        RagError::GenerationError {
            provider: provider.into(),
            message: format!("request failed: {e}"),
        }
    }
}

/// Build a reqwest client with a per-request timeout.
pub(crate) fn build_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder().timeout(timeout).build().map_err(|e| {
        RagError::GenerationError {
            provider: "http".into(),
            message: format!("failed to build HTTP client: {e}"),
        }
    })
}

/// Classify a non-success HTTP status: 429/5xx are transient, the rest
/// are plain generation errors.
pub(crate) fn status_error(provider: &str, status: reqwest::StatusCode, detail: String) -> RagError {
    if status.as_u16() == 429 || status.is_server_error() {
        RagError::UpstreamUnavailable {
            provider: provider.into(),
            message: format!("server returned {status}: {detail}"),
        }
    } else {
        RagError::GenerationError {
            provider: provider.into(),
            message: format!("server returned {status}: {detail}"),
        }
    }
}
