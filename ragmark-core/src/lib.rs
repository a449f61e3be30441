//! # ragmark-core
//!
//! Retrieval-augmented question answering and exam grading over a
//! control-systems knowledge base.
//!
//! ## Overview
//!
//! The pipeline loads text/PDF/DOCX documents, splits them into
//! overlapping chunks, embeds them through a swappable
//! [`EmbeddingProvider`], and persists the vectors in a file-backed
//! store. Queries embed the question, retrieve the top-k most similar
//! chunks, and hand the assembled prompt to a swappable
//! [`AnswerGenerator`]; the [`ExamGrader`] layers a structured scoring
//! prompt on the same retrieval.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use ragmark_core::{EngineConfig, RagEngine};
//!
//! let engine = RagEngine::builder()
//!     .config(EngineConfig::builder().knowledge_dir("notes").store_dir("store").build()?)
//!     .embedder(Arc::new(my_embedder))
//!     .generator(Arc::new(my_generator))
//!     .build()?;
//!
//! engine.initialize(false).await?;
//! let result = engine.query("What are the components of a PID controller?", None).await?;
//! println!("{}", result.answer);
//! ```
//!
//! ## Feature flags
//!
//! - `openai` — OpenAI-compatible embedding provider
//! - `ollama` — Ollama embedding provider
//! - `full` — everything above

pub mod chunking;
pub mod config;
pub mod device;
pub mod document;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod grader;
pub mod loader;
pub mod memory;
pub mod mock;
pub mod net;
#[cfg(feature = "ollama")]
pub mod ollama;
#[cfg(feature = "openai")]
pub mod openai;
pub mod generation;
pub mod persist;
pub mod prompt;
pub mod retriever;
pub mod vectorstore;

pub use chunking::{Chunker, SlidingWindowChunker};
pub use config::{EngineConfig, EngineConfigBuilder};
pub use device::{AcceleratorConfig, Device, DeviceRequest, detect_gpu_count, select_device};
pub use document::{AnswerResult, Chunk, Document, ScoredChunk, StoreRecord};
pub use embedding::EmbeddingProvider;
pub use engine::{EngineState, EngineStatus, RagEngine, RagEngineBuilder};
pub use error::{RagError, Result};
pub use generation::AnswerGenerator;
pub use grader::{ExamGrader, ExamItem, ExamOutcome, GradedItem, GradingResult, render_report};
pub use loader::DocumentLoader;
pub use memory::InMemoryVectorStore;
pub use net::RetryPolicy;
pub use persist::{PersistentVectorStore, StoreManifest};
pub use retriever::Retriever;
pub use vectorstore::{VectorStore, cosine_similarity};
