//! In-memory vector store.
//!
//! [`InMemoryVectorStore`] keeps records in insertion order behind a
//! `tokio::sync::RwLock`. Suitable for tests and small ephemeral
//! workloads; the persistent backend is [`PersistentVectorStore`]
//! (see [`crate::persist`]).
//!
//! [`PersistentVectorStore`]: crate::persist::PersistentVectorStore

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::document::{ScoredChunk, StoreRecord};
use crate::error::{RagError, Result};
use crate::vectorstore::{VectorStore, rank_records};

#[derive(Debug, Default)]
struct Inner {
    records: Vec<StoreRecord>,
    by_id: HashMap<String, usize>,
    dimensions: Option<usize>,
}

impl Inner {
    fn upsert(&mut self, records: Vec<StoreRecord>) -> Result<()> {
        for record in records {
            let dims = *self.dimensions.get_or_insert(record.vector.len());
            if record.vector.len() != dims {
                return Err(RagError::DimensionMismatch {
                    expected: dims,
                    got: record.vector.len(),
                });
            }
            match self.by_id.get(&record.chunk_id) {
                Some(&i) => self.records[i] = record,
                None => {
                    self.by_id.insert(record.chunk_id.clone(), self.records.len());
                    self.records.push(record);
                }
            }
        }
        Ok(())
    }

    fn delete(&mut self, ids: &[String]) {
        if ids.is_empty() {
            return;
        }
        let doomed: std::collections::HashSet<&String> = ids.iter().collect();
        self.records.retain(|r| !doomed.contains(&r.chunk_id));
        self.by_id =
            self.records.iter().enumerate().map(|(i, r)| (r.chunk_id.clone(), i)).collect();
    }
}

/// An insertion-ordered in-memory vector store using cosine similarity.
#[derive(Debug, Default)]
pub struct InMemoryVectorStore {
    inner: RwLock<Inner>,
}

impl InMemoryVectorStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn upsert(&self, records: Vec<StoreRecord>) -> Result<()> {
        self.inner.write().await.upsert(records)
    }

    async fn delete(&self, ids: &[String]) -> Result<()> {
        self.inner.write().await.delete(ids);
        Ok(())
    }

    async fn search(
        &self,
        vector: &[f32],
        top_k: usize,
        score_threshold: Option<f32>,
    ) -> Result<Vec<ScoredChunk>> {
        let inner = self.inner.read().await;
        Ok(rank_records(&inner.records, vector, top_k, score_threshold))
    }

    async fn count(&self) -> usize {
        self.inner.read().await.records.len()
    }

    async fn is_ready(&self) -> bool {
        true
    }

    async fn clear(&self) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.records.clear();
        inner.by_id.clear();
        inner.dimensions = None;
        Ok(())
    }
}
