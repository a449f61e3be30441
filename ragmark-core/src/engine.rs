//! RAG engine orchestration.
//!
//! [`RagEngine`] owns the initialize-or-load lifecycle of the persistent
//! vector store and composes the loader, chunker, embedding provider,
//! and answer generator into the query pipeline. Construct one via
//! [`RagEngine::builder()`].

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde::Serialize;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::chunking::{Chunker, SlidingWindowChunker};
use crate::config::EngineConfig;
use crate::device::Device;
use crate::document::{AnswerResult, Chunk, ScoredChunk, StoreRecord};
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::generation::AnswerGenerator;
use crate::loader::DocumentLoader;
use crate::persist::PersistentVectorStore;
use crate::prompt;
use crate::retriever::Retriever;
use crate::vectorstore::VectorStore;

/// Concurrent in-flight embedding batches during a build. Results are
/// reassembled in input order regardless of completion order.
const EMBED_CONCURRENCY: usize = 4;

/// Lifecycle state of the engine.
///
/// `Uninitialized` transitions to `Ready` on a successful
/// [`initialize`](RagEngine::initialize) and to `Failed` on an
/// unrecoverable initialization error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineState {
    /// No initialization attempt has completed.
    Uninitialized,
    /// The store is built or loaded; queries are valid.
    Ready,
    /// Initialization failed; the underlying error was surfaced to the caller.
    Failed,
}

/// A snapshot of the engine's configuration and store.
#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    /// Current lifecycle state.
    pub state: EngineState,
    /// Identifier of the embedding provider/model.
    pub embedding_provider: String,
    /// Identifier of the answer generator/model.
    pub generator: String,
    /// Number of records in the store.
    pub records: usize,
    /// Resolved compute device.
    pub device: Device,
    /// Configured accelerator memory fraction.
    pub memory_fraction: f32,
}

/// The RAG engine: retrieval, prompt assembly, and generation over a
/// persistent vector store.
pub struct RagEngine {
    config: EngineConfig,
    loader: DocumentLoader,
    chunker: Arc<dyn Chunker>,
    embedder: Arc<dyn EmbeddingProvider>,
    generator: Arc<dyn AnswerGenerator>,
    store: Arc<PersistentVectorStore>,
    retriever: Retriever,
    state: RwLock<EngineState>,
}

impl RagEngine {
    /// Create a new [`RagEngineBuilder`].
    pub fn builder() -> RagEngineBuilder {
        RagEngineBuilder::default()
    }

    /// Return a reference to the engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Return a reference to the answer generator.
    pub fn generator(&self) -> &Arc<dyn AnswerGenerator> {
        &self.generator
    }

    /// Current lifecycle state.
    pub async fn state(&self) -> EngineState {
        *self.state.read().await
    }

    /// Whether a persisted store exists at the configured location.
    pub fn store_exists(&self) -> bool {
        self.store.exists()
    }

    /// Build or load the vector store and transition to `Ready`.
    ///
    /// When `force_reload` is set, or no persisted store exists at the
    /// configured location, runs the full load → chunk → embed → persist
    /// build; otherwise attaches to the existing store without
    /// re-embedding anything. Any failure transitions the engine to
    /// `Failed` and surfaces the underlying error.
    pub async fn initialize(&self, force_reload: bool) -> Result<()> {
        self.initialize_with(force_reload, &CancellationToken::new()).await
    }

    /// [`initialize`](RagEngine::initialize) with cooperative cancellation,
    /// checked between embedding batches.
    pub async fn initialize_with(
        &self,
        force_reload: bool,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let result = self.initialize_inner(force_reload, cancel).await;
        let mut state = self.state.write().await;
        match &result {
            Ok(()) => *state = EngineState::Ready,
            Err(e) => {
                error!(error = %e, "engine initialization failed");
                *state = EngineState::Failed;
            }
        }
        result
    }

    async fn initialize_inner(
        &self,
        force_reload: bool,
        cancel: &CancellationToken,
    ) -> Result<()> {
        if force_reload || !self.store.exists() {
            self.build_index(cancel).await
        } else {
            self.store.load().await?;
            self.store.check_model(self.embedder.name()).await;
            Ok(())
        }
    }

    async fn build_index(&self, cancel: &CancellationToken) -> Result<()> {
        let documents = self.loader.load_directory(&self.config.knowledge_dir)?;
        let chunks: Vec<Chunk> =
            documents.iter().flat_map(|d| self.chunker.chunk(d)).collect();
        info!(
            documents = documents.len(),
            chunks = chunks.len(),
            "building vector store"
        );
        if chunks.is_empty() {
            warn!("knowledge base produced no chunks; store will be empty");
        }

        let records = self.embed_chunks(&chunks, cancel).await?;
        self.store.rebuild(self.embedder.name(), records).await
    }

    /// Embed chunks in batches with bounded concurrency.
    ///
    /// `buffered` yields batch results in input order, so records land in
    /// chunk order no matter how the provider interleaves completions. A
    /// failed batch fails the whole build, naming the chunks involved.
    async fn embed_chunks(
        &self,
        chunks: &[Chunk],
        cancel: &CancellationToken,
    ) -> Result<Vec<StoreRecord>> {
        if chunks.is_empty() {
            return Ok(Vec::new());
        }

        let batches = chunks.chunks(self.config.embed_batch_size);
        let batch_results: Vec<Result<Vec<StoreRecord>>> = stream::iter(batches)
            .map(|batch| {
                let embedder = Arc::clone(&self.embedder);
                let cancel = cancel.clone();
                async move {
                    if cancel.is_cancelled() {
                        return Err(RagError::Cancelled);
                    }
                    embed_batch_to_records(embedder.as_ref(), batch).await
                }
            })
            .buffered(EMBED_CONCURRENCY)
            .collect()
            .await;

        let mut records = Vec::with_capacity(chunks.len());
        for batch in batch_results {
            records.extend(batch?);
        }
        Ok(records)
    }

    /// Answer a question through retrieve → prompt → generate.
    ///
    /// Valid only in the `Ready` state. When retrieval returns no chunks
    /// the generator is still called, with an explicit no-context marker
    /// in the prompt, so the model can say it does not know.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::NotInitialized`] unless the engine is `Ready`.
    pub async fn query(&self, question: &str, top_k: Option<usize>) -> Result<AnswerResult> {
        self.ensure_ready().await?;
        let top_k = top_k.unwrap_or(self.config.top_k);

        let chunks =
            self.retriever.retrieve(question, top_k, self.config.score_threshold).await?;
        let context = prompt::format_context(&chunks);
        let answer = self.generator.generate(&prompt::answer_prompt(question, &context)).await?;

        info!(sources = chunks.len(), "query answered");
        Ok(AnswerResult {
            answer,
            sources: chunks.iter().map(|c| c.source.clone()).collect(),
        })
    }

    /// Retrieve supporting chunks for `query` using the configured
    /// `top_k` and threshold. Used by the exam grader.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::NotInitialized`] unless the engine is `Ready`.
    pub async fn retrieve(&self, query: &str) -> Result<Vec<ScoredChunk>> {
        self.ensure_ready().await?;
        self.retriever.retrieve(query, self.config.top_k, self.config.score_threshold).await
    }

    /// Snapshot the engine's state, providers, and store size.
    pub async fn status(&self) -> EngineStatus {
        EngineStatus {
            state: self.state().await,
            embedding_provider: self.embedder.name().to_string(),
            generator: self.generator.name().to_string(),
            records: self.store.count().await,
            device: self.config.accelerator.device,
            memory_fraction: self.config.accelerator.memory_fraction,
        }
    }

    /// Release transient compute-backend memory. Idempotent; persisted
    /// records are unaffected.
    pub async fn clear_cache(&self) -> Result<()> {
        self.embedder.clear_cache().await
    }

    async fn ensure_ready(&self) -> Result<()> {
        match self.state().await {
            EngineState::Ready => Ok(()),
            _ => Err(RagError::NotInitialized),
        }
    }
}

async fn embed_batch_to_records(
    embedder: &dyn EmbeddingProvider,
    batch: &[Chunk],
) -> Result<Vec<StoreRecord>> {
    let first = batch.first().map(|c| c.id.as_str()).unwrap_or_default();
    let last = batch.last().map(|c| c.id.as_str()).unwrap_or_default();

    let texts: Vec<&str> = batch.iter().map(|c| c.text.as_str()).collect();
    let vectors = embedder.embed_batch(&texts).await.map_err(|e| RagError::EmbeddingError {
        provider: embedder.name().to_string(),
        message: format!("failed to embed chunks {first}..{last}: {e}"),
    })?;

    if vectors.len() != batch.len() {
        return Err(RagError::EmbeddingError {
            provider: embedder.name().to_string(),
            message: format!(
                "provider returned {} vectors for {} chunks ({first}..{last})",
                vectors.len(),
                batch.len()
            ),
        });
    }

    Ok(batch
        .iter()
        .zip(vectors)
        .map(|(chunk, vector)| StoreRecord {
            chunk_id: chunk.id.clone(),
            vector,
            text: chunk.text.clone(),
            metadata: chunk.metadata.clone(),
        })
        .collect())
}

/// Builder for constructing a [`RagEngine`].
///
/// `config`, `embedder`, and `generator` are required; the chunker
/// defaults to a [`SlidingWindowChunker`] sized from the configuration.
#[derive(Default)]
pub struct RagEngineBuilder {
    config: Option<EngineConfig>,
    chunker: Option<Arc<dyn Chunker>>,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    generator: Option<Arc<dyn AnswerGenerator>>,
}

impl RagEngineBuilder {
    /// Set the engine configuration.
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set a custom chunker.
    pub fn chunker(mut self, chunker: Arc<dyn Chunker>) -> Self {
        self.chunker = Some(chunker);
        self
    }

    /// Set the embedding provider.
    pub fn embedder(mut self, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    /// Set the answer generator.
    pub fn generator(mut self, generator: Arc<dyn AnswerGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    /// Build the [`RagEngine`], validating that required fields are set.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if a required field is missing.
    pub fn build(self) -> Result<RagEngine> {
        let config =
            self.config.ok_or_else(|| RagError::ConfigError("config is required".into()))?;
        let embedder =
            self.embedder.ok_or_else(|| RagError::ConfigError("embedder is required".into()))?;
        let generator =
            self.generator.ok_or_else(|| RagError::ConfigError("generator is required".into()))?;
        let chunker = match self.chunker {
            Some(chunker) => chunker,
            None => Arc::new(SlidingWindowChunker::new(config.chunk_size, config.chunk_overlap)?),
        };

        let store = Arc::new(PersistentVectorStore::new(&config.store_dir));
        let retriever = Retriever::new(
            Arc::clone(&embedder),
            Arc::clone(&store) as Arc<dyn VectorStore>,
        );

        Ok(RagEngine {
            config,
            loader: DocumentLoader::new(),
            chunker,
            embedder,
            generator,
            store,
            retriever,
            state: RwLock::new(EngineState::Uninitialized),
        })
    }
}
