//! Engine lifecycle and query pipeline tests, driven end to end with
//! deterministic mock providers.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use ragmark_core::error::{RagError, Result};
use ragmark_core::mock::{MockEmbeddingProvider, MockGenerator};
use ragmark_core::prompt::NO_CONTEXT_MARKER;
use ragmark_core::{EmbeddingProvider, EngineConfig, EngineState, RagEngine};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

const PID_SENTENCE: &str =
    "A PID controller has proportional, integral, and derivative terms.";

/// Wraps the mock embedder and counts batch calls, so tests can assert
/// that loading an existing store never re-embeds.
struct CountingEmbedder {
    inner: MockEmbeddingProvider,
    batch_calls: AtomicUsize,
}

impl CountingEmbedder {
    fn new(dimensions: usize) -> Self {
        Self { inner: MockEmbeddingProvider::new(dimensions), batch_calls: AtomicUsize::new(0) }
    }
}

#[async_trait]
impl EmbeddingProvider for CountingEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.inner.embed(text).await
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        self.batch_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.embed_batch(texts).await
    }

    fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}

struct Fixture {
    knowledge: TempDir,
    store: TempDir,
}

impl Fixture {
    fn new() -> Self {
        Self { knowledge: tempfile::tempdir().unwrap(), store: tempfile::tempdir().unwrap() }
    }

    fn write_doc(&self, name: &str, text: &str) {
        std::fs::write(self.knowledge.path().join(name), text).unwrap();
    }

    fn config(&self) -> EngineConfig {
        EngineConfig::builder()
            .knowledge_dir(self.knowledge.path())
            .store_dir(self.store.path().join("store"))
            .chunk_size(200)
            .chunk_overlap(40)
            .build()
            .unwrap()
    }

    fn engine_with(&self, generator: Arc<MockGenerator>) -> RagEngine {
        RagEngine::builder()
            .config(self.config())
            .embedder(Arc::new(MockEmbeddingProvider::new(32)))
            .generator(generator)
            .build()
            .unwrap()
    }
}

#[tokio::test]
async fn query_before_initialize_is_rejected() {
    let fixture = Fixture::new();
    let engine = fixture.engine_with(Arc::new(MockGenerator::new("answer")));

    assert_eq!(engine.state().await, EngineState::Uninitialized);
    let err = engine.query("What is a PID controller?", None).await.unwrap_err();
    assert!(matches!(err, RagError::NotInitialized));
}

#[tokio::test]
async fn missing_knowledge_dir_fails_initialization() {
    let store = tempfile::tempdir().unwrap();
    let config = EngineConfig::builder()
        .knowledge_dir("/nonexistent/knowledge")
        .store_dir(store.path())
        .build()
        .unwrap();
    let engine = RagEngine::builder()
        .config(config)
        .embedder(Arc::new(MockEmbeddingProvider::new(8)))
        .generator(Arc::new(MockGenerator::new("answer")))
        .build()
        .unwrap();

    let err = engine.initialize(false).await.unwrap_err();
    assert!(matches!(err, RagError::ConfigError(_)));
    assert_eq!(engine.state().await, EngineState::Failed);

    // Failed is terminal for queries too.
    let err = engine.query("anything", None).await.unwrap_err();
    assert!(matches!(err, RagError::NotInitialized));
}

#[tokio::test]
async fn pid_question_retrieves_the_pid_document() {
    let fixture = Fixture::new();
    fixture.write_doc("pid.txt", PID_SENTENCE);
    let generator = Arc::new(MockGenerator::new(
        "A PID controller has proportional, integral, and derivative components.",
    ));
    let engine = fixture.engine_with(Arc::clone(&generator));

    engine.initialize(false).await.unwrap();
    assert_eq!(engine.state().await, EngineState::Ready);

    let result =
        engine.query("What are the components of a PID controller?", Some(1)).await.unwrap();

    assert_eq!(result.sources.len(), 1);
    assert_eq!(result.sources[0]["source"], "pid.txt");
    assert!(!result.answer.is_empty());

    // The retrieved sentence must appear in the generation prompt.
    let prompt = generator.last_prompt().unwrap();
    assert!(prompt.contains(PID_SENTENCE));
    assert!(prompt.contains("What are the components of a PID controller?"));
}

#[tokio::test]
async fn empty_retrieval_still_calls_the_generator_with_a_marker() {
    let fixture = Fixture::new();
    // No documents at all: the store builds empty.
    let generator = Arc::new(MockGenerator::new("I do not know."));
    let engine = fixture.engine_with(Arc::clone(&generator));

    engine.initialize(false).await.unwrap();
    let result = engine.query("What is a transfer function?", None).await.unwrap();

    assert!(result.sources.is_empty());
    assert_eq!(result.answer, "I do not know.");
    let prompt = generator.last_prompt().unwrap();
    assert!(prompt.contains(NO_CONTEXT_MARKER));
}

#[tokio::test]
async fn initialize_twice_loads_without_reembedding() {
    let fixture = Fixture::new();
    fixture.write_doc("pid.txt", PID_SENTENCE);
    fixture.write_doc("loops.txt", "An open-loop system has no feedback path.");

    // First engine builds the store.
    let engine = fixture.engine_with(Arc::new(MockGenerator::new("answer")));
    engine.initialize(false).await.unwrap();
    let before = engine.retrieve("feedback path").await.unwrap();

    // Second engine over the same store location must load, not rebuild.
    let counting = Arc::new(CountingEmbedder::new(32));
    let reloaded = RagEngine::builder()
        .config(fixture.config())
        .embedder(Arc::clone(&counting) as Arc<dyn EmbeddingProvider>)
        .generator(Arc::new(MockGenerator::new("answer")))
        .build()
        .unwrap();
    reloaded.initialize(false).await.unwrap();
    assert_eq!(reloaded.state().await, EngineState::Ready);
    assert_eq!(counting.batch_calls.load(Ordering::SeqCst), 0);

    // And identical queries return identical results.
    let after = reloaded.retrieve("feedback path").await.unwrap();
    assert_eq!(before.len(), after.len());
    for (x, y) in before.iter().zip(after.iter()) {
        assert_eq!(x.chunk_id, y.chunk_id);
        assert_eq!(x.score, y.score);
    }
}

#[tokio::test]
async fn force_reload_picks_up_new_documents() {
    let fixture = Fixture::new();
    fixture.write_doc("pid.txt", PID_SENTENCE);
    let engine = fixture.engine_with(Arc::new(MockGenerator::new("answer")));
    engine.initialize(false).await.unwrap();
    assert_eq!(engine.status().await.records, 1);

    fixture.write_doc("bode.txt", "A Bode plot shows gain and phase against frequency.");
    engine.initialize(true).await.unwrap();
    assert_eq!(engine.status().await.records, 2);
}

#[tokio::test]
async fn cancelled_build_aborts_between_batches() {
    let fixture = Fixture::new();
    fixture.write_doc("pid.txt", PID_SENTENCE);
    let engine = fixture.engine_with(Arc::new(MockGenerator::new("answer")));

    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = engine.initialize_with(false, &cancel).await.unwrap_err();
    assert!(matches!(err, RagError::Cancelled));
    assert_eq!(engine.state().await, EngineState::Failed);
}

#[tokio::test]
async fn status_reports_providers_and_store_size() {
    let fixture = Fixture::new();
    fixture.write_doc("pid.txt", PID_SENTENCE);
    let engine = fixture.engine_with(Arc::new(MockGenerator::new("answer")));
    engine.initialize(false).await.unwrap();

    let status = engine.status().await;
    assert_eq!(status.state, EngineState::Ready);
    assert_eq!(status.embedding_provider, "mock-embedding");
    assert_eq!(status.generator, "mock-generator");
    assert_eq!(status.records, 1);
}

#[tokio::test]
async fn clear_cache_is_idempotent() {
    let fixture = Fixture::new();
    fixture.write_doc("pid.txt", PID_SENTENCE);
    let engine = fixture.engine_with(Arc::new(MockGenerator::new("answer")));
    engine.initialize(false).await.unwrap();

    engine.clear_cache().await.unwrap();
    engine.clear_cache().await.unwrap();
    // Persisted records are untouched.
    assert_eq!(engine.status().await.records, 1);
}
