//! Embedding provider trait.

use async_trait::async_trait;

use crate::error::Result;

/// A provider that maps text to fixed-dimension vectors.
///
/// Implementations wrap specific backends (a hosted API or a local model
/// server) behind a unified async interface. The default
/// [`embed_batch`](EmbeddingProvider::embed_batch) implementation calls
/// [`embed`](EmbeddingProvider::embed) sequentially; backends with native
/// batching should override it.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate an embedding vector for a single text input.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embedding vectors for a batch of inputs, in input order.
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    /// The dimensionality of vectors produced by this provider.
    ///
    /// Fixed for the lifetime of a store built with this provider.
    fn dimensions(&self) -> usize;

    /// A stable identifier for this provider and model, recorded in the
    /// store manifest.
    fn name(&self) -> &str;

    /// Release any transient compute-backend memory held on this
    /// provider's behalf. Idempotent; persisted data is unaffected.
    async fn clear_cache(&self) -> Result<()> {
        Ok(())
    }
}
