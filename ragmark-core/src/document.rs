//! Data types for documents, chunks, store records, and results.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// A source document loaded from the knowledge base.
///
/// Documents are created at load time and never mutated; a reindex
/// replaces them wholesale.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    /// Unique identifier, derived from the path relative to the
    /// knowledge-base root.
    pub id: String,
    /// Where the document was read from.
    pub source_path: PathBuf,
    /// The extracted plain text.
    pub text: String,
    /// Key-value metadata attached to every chunk derived from this document.
    pub metadata: HashMap<String, String>,
}

/// A bounded segment of a [`Document`], the unit of embedding and retrieval.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    /// Unique identifier, `{document_id}_{chunk_index}`.
    pub id: String,
    /// The ID of the parent [`Document`].
    pub document_id: String,
    /// The text content of the chunk.
    pub text: String,
    /// Start of the chunk in the document, in characters.
    pub start_offset: usize,
    /// End of the chunk in the document, in characters (exclusive).
    pub end_offset: usize,
    /// Metadata inherited from the parent document plus `chunk_index`.
    pub metadata: HashMap<String, String>,
}

/// The persisted unit of the vector store: a chunk's vector, text, and
/// metadata. Never mutated in place; removed only on full reindex or
/// explicit delete-by-id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoreRecord {
    /// The ID of the chunk this record was built from.
    pub chunk_id: String,
    /// The embedding vector. All vectors in one store share a dimension.
    pub vector: Vec<f32>,
    /// The chunk text, kept alongside the vector for prompt assembly.
    pub text: String,
    /// Source metadata carried through retrieval into answer citations.
    pub metadata: HashMap<String, String>,
}

/// A retrieved chunk paired with its similarity score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredChunk {
    /// The ID of the matching chunk.
    pub chunk_id: String,
    /// The chunk text.
    pub text: String,
    /// Source metadata of the chunk.
    pub source: HashMap<String, String>,
    /// Cosine similarity to the query (higher is more relevant).
    pub score: f32,
}

/// The result of a question answered through the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerResult {
    /// The generated answer text.
    pub answer: String,
    /// One source entry per retrieved chunk, in retrieval order.
    pub sources: Vec<HashMap<String, String>>,
}
