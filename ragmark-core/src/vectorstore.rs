//! Vector store trait and similarity scoring.

use async_trait::async_trait;

use crate::document::{ScoredChunk, StoreRecord};
use crate::error::Result;

/// A storage backend for chunk vectors with similarity search.
///
/// Implementations enforce a single vector dimensionality per store and
/// keep insertion order, which breaks similarity-score ties so that
/// results stay deterministic.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert records, replacing any with the same `chunk_id`.
    ///
    /// Fails fast with [`RagError::DimensionMismatch`](crate::RagError::DimensionMismatch)
    /// if a vector's length differs from the store's dimensionality.
    async fn upsert(&self, records: Vec<StoreRecord>) -> Result<()>;

    /// Delete records by chunk ID. Unknown IDs are ignored.
    async fn delete(&self, ids: &[String]) -> Result<()>;

    /// Return up to `top_k` records ranked by descending cosine
    /// similarity to `vector`.
    ///
    /// Ties keep insertion order. When `score_threshold` is set it is an
    /// inclusive lower bound, so fewer than `top_k` results (including
    /// zero) may come back. Read-only and safe to call concurrently with
    /// other searches.
    async fn search(
        &self,
        vector: &[f32],
        top_k: usize,
        score_threshold: Option<f32>,
    ) -> Result<Vec<ScoredChunk>>;

    /// Number of records in the store.
    async fn count(&self) -> usize;

    /// Whether the store is attached to its data and can serve searches.
    async fn is_ready(&self) -> bool;

    /// Remove all records.
    async fn clear(&self) -> Result<()>;
}

/// Cosine similarity between two vectors.
///
/// Returns 0.0 if either vector has zero magnitude.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Rank records against a query vector: stable descending sort by score,
/// inclusive threshold filter, then truncate to `top_k`.
///
/// Shared by every backend so ordering semantics cannot drift.
pub(crate) fn rank_records(
    records: &[StoreRecord],
    vector: &[f32],
    top_k: usize,
    score_threshold: Option<f32>,
) -> Vec<ScoredChunk> {
    let mut scored: Vec<ScoredChunk> = records
        .iter()
        .map(|record| ScoredChunk {
            chunk_id: record.chunk_id.clone(),
            text: record.text.clone(),
            source: record.metadata.clone(),
            score: cosine_similarity(&record.vector, vector),
        })
        .collect();

    // sort_by is stable: equal scores keep insertion order.
    scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

    if let Some(threshold) = score_threshold {
        scored.retain(|s| s.score >= threshold);
    }
    scored.truncate(top_k);
    scored
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_of_identical_unit_vectors_is_one() {
        let v = [0.6f32, 0.8];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_of_orthogonal_vectors_is_zero() {
        assert!((cosine_similarity(&[1.0, 0.0], &[0.0, 1.0])).abs() < 1e-6);
    }

    #[test]
    fn zero_vector_scores_zero() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }
}
