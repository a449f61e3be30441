//! Configuration for the RAG engine.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::device::AcceleratorConfig;
use crate::error::{RagError, Result};

/// Configuration parameters for the engine, validated at build time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EngineConfig {
    /// Directory holding the knowledge-base documents.
    pub knowledge_dir: PathBuf,
    /// Directory where the persistent vector store lives.
    pub store_dir: PathBuf,
    /// Chunk window in characters.
    pub chunk_size: usize,
    /// Overlap between consecutive chunks in characters.
    pub chunk_overlap: usize,
    /// Number of results returned by retrieval.
    pub top_k: usize,
    /// Inclusive minimum similarity for retrieved chunks, if set.
    pub score_threshold: Option<f32>,
    /// Number of chunks embedded per provider call during a build.
    pub embed_batch_size: usize,
    /// Timeout for each upstream embedding/generation request, in seconds.
    pub request_timeout_secs: u64,
    /// Bounded retry count for transient upstream failures.
    pub max_retries: u32,
    /// Resolved accelerator settings, fixed at startup.
    pub accelerator: AcceleratorConfig,
}

impl EngineConfig {
    /// Create a new builder for constructing an [`EngineConfig`].
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::default()
    }

    /// The upstream request timeout as a [`Duration`].
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            knowledge_dir: PathBuf::from("knowledge_base"),
            store_dir: PathBuf::from("vector_store"),
            chunk_size: 1000,
            chunk_overlap: 200,
            top_k: 4,
            score_threshold: None,
            embed_batch_size: 32,
            request_timeout_secs: 30,
            max_retries: 2,
            accelerator: AcceleratorConfig::default(),
        }
    }
}

/// Builder for a validated [`EngineConfig`].
#[derive(Debug, Clone, Default)]
pub struct EngineConfigBuilder {
    config: EngineConfig,
}

impl EngineConfigBuilder {
    /// Set the knowledge-base directory.
    pub fn knowledge_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.knowledge_dir = dir.into();
        self
    }

    /// Set the vector-store directory.
    pub fn store_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.store_dir = dir.into();
        self
    }

    /// Set the chunk window in characters.
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.config.chunk_size = size;
        self
    }

    /// Set the overlap between consecutive chunks in characters.
    pub fn chunk_overlap(mut self, overlap: usize) -> Self {
        self.config.chunk_overlap = overlap;
        self
    }

    /// Set the number of results returned by retrieval.
    pub fn top_k(mut self, k: usize) -> Self {
        self.config.top_k = k;
        self
    }

    /// Set the inclusive minimum similarity for retrieved chunks.
    pub fn score_threshold(mut self, threshold: f32) -> Self {
        self.config.score_threshold = Some(threshold);
        self
    }

    /// Set the embedding batch size used during builds.
    pub fn embed_batch_size(mut self, size: usize) -> Self {
        self.config.embed_batch_size = size;
        self
    }

    /// Set the upstream request timeout in seconds.
    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.request_timeout_secs = secs;
        self
    }

    /// Set the bounded retry count for transient upstream failures.
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.config.max_retries = retries;
        self
    }

    /// Set the resolved accelerator configuration.
    pub fn accelerator(mut self, accelerator: AcceleratorConfig) -> Self {
        self.config.accelerator = accelerator;
        self
    }

    /// Build the [`EngineConfig`], validating parameter consistency.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidConfig`] if:
    /// - `chunk_size == 0` or `chunk_overlap >= chunk_size`
    /// - `top_k == 0` or `embed_batch_size == 0`
    /// - `request_timeout_secs == 0`
    /// - `score_threshold` is outside `[-1, 1]`
    pub fn build(self) -> Result<EngineConfig> {
        let c = &self.config;
        if c.chunk_size == 0 {
            return Err(RagError::InvalidConfig("chunk_size must be greater than zero".into()));
        }
        if c.chunk_overlap >= c.chunk_size {
            return Err(RagError::InvalidConfig(format!(
                "chunk_overlap ({}) must be less than chunk_size ({})",
                c.chunk_overlap, c.chunk_size
            )));
        }
        if c.top_k == 0 {
            return Err(RagError::InvalidConfig("top_k must be greater than zero".into()));
        }
        if c.embed_batch_size == 0 {
            return Err(RagError::InvalidConfig(
                "embed_batch_size must be greater than zero".into(),
            ));
        }
        if c.request_timeout_secs == 0 {
            return Err(RagError::InvalidConfig(
                "request_timeout_secs must be greater than zero".into(),
            ));
        }
        if let Some(t) = c.score_threshold {
            if !(-1.0..=1.0).contains(&t) {
                return Err(RagError::InvalidConfig(format!(
                    "score_threshold ({t}) must be within [-1, 1]"
                )));
            }
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let config = EngineConfig::builder().build().unwrap();
        assert_eq!(config.chunk_size, 1000);
        assert_eq!(config.chunk_overlap, 200);
        assert_eq!(config.top_k, 4);
    }

    #[test]
    fn overlap_must_be_less_than_window() {
        let err = EngineConfig::builder().chunk_size(100).chunk_overlap(100).build();
        assert!(matches!(err, Err(RagError::InvalidConfig(_))));
    }

    #[test]
    fn zero_top_k_is_rejected() {
        assert!(EngineConfig::builder().top_k(0).build().is_err());
    }

    #[test]
    fn threshold_out_of_range_is_rejected() {
        assert!(EngineConfig::builder().score_threshold(1.5).build().is_err());
        assert!(EngineConfig::builder().score_threshold(0.9).build().is_ok());
    }
}
