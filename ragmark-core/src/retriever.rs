//! Query-side retrieval: embed the query, search the store.

use std::sync::Arc;

use tracing::debug;

use crate::document::ScoredChunk;
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::vectorstore::VectorStore;

/// Embeds a query and returns the most similar stored chunks.
pub struct Retriever {
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
}

impl Retriever {
    /// Create a retriever over the given provider and store.
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, store: Arc<dyn VectorStore>) -> Self {
        Self { embedder, store }
    }

    /// Retrieve up to `top_k` chunks for `query`, most similar first.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::StoreNotReady`] if the store has not been built
    /// or loaded — an uninitialized store is not the same as "no matches".
    pub async fn retrieve(
        &self,
        query: &str,
        top_k: usize,
        score_threshold: Option<f32>,
    ) -> Result<Vec<ScoredChunk>> {
        if !self.store.is_ready().await {
            return Err(RagError::StoreNotReady);
        }

        let query_vector = self.embedder.embed(query).await?;
        let results = self.store.search(&query_vector, top_k, score_threshold).await?;
        debug!(top_k, result_count = results.len(), "retrieval completed");
        Ok(results)
    }
}
