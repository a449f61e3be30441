//! Error types for the `ragmark-core` crate.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur in the retrieval and grading pipeline.
#[derive(Debug, Error)]
pub enum RagError {
    /// A bad path or setting discovered at startup. Fatal, surfaced immediately.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Inconsistent parameters (e.g. `chunk_overlap >= chunk_size`).
    /// Raised before any I/O happens.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A filesystem operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// The path involved in the failed operation.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// No persisted store exists at the configured location.
    /// Recoverable by running a build.
    #[error("No vector store found at {path}")]
    StoreNotFound {
        /// The location that was probed.
        path: PathBuf,
    },

    /// The store has not been built or loaded yet. Callers must not
    /// mistake this for "no matches".
    #[error("Vector store is not ready; build or load it first")]
    StoreNotReady,

    /// The engine has not reached the `Ready` state.
    #[error("Engine is not initialized")]
    NotInitialized,

    /// An error in the vector store backend.
    #[error("Vector store error ({backend}): {message}")]
    StoreError {
        /// The store backend that produced the error.
        backend: String,
        /// A description of the failure.
        message: String,
    },

    /// A vector's dimensionality does not match the store's.
    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch {
        /// The dimensionality the store was created with.
        expected: usize,
        /// The dimensionality of the offending vector.
        got: usize,
    },

    /// The embedding provider failed. Not retried unless transient
    /// (see [`UpstreamUnavailable`](RagError::UpstreamUnavailable)).
    #[error("Embedding error ({provider}): {message}")]
    EmbeddingError {
        /// The embedding provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// The answer generator failed.
    #[error("Generation error ({provider}): {message}")]
    GenerationError {
        /// The generator that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// An upstream call exceeded the configured timeout. Retryable.
    #[error("{provider} timed out after {seconds}s")]
    UpstreamTimeout {
        /// The provider that timed out.
        provider: String,
        /// The timeout that was exceeded, in seconds.
        seconds: u64,
    },

    /// An upstream service returned a transient failure (connection
    /// refused, 429, 5xx). Retryable.
    #[error("{provider} unavailable: {message}")]
    UpstreamUnavailable {
        /// The provider that was unavailable.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// The generator's grading output violated the score contract
    /// (no extractable number, or a number outside 0–100). Surfaced
    /// per item; never coerced to a default score.
    #[error("Grading output could not be parsed: {message}")]
    GradingParse {
        /// Why extraction failed.
        message: String,
    },

    /// A batch operation was cancelled between items.
    #[error("Operation cancelled")]
    Cancelled,
}

impl RagError {
    /// Whether the operation that produced this error may be retried.
    ///
    /// Only transient upstream failures qualify; authentication and
    /// other request errors must not be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RagError::UpstreamTimeout { .. } | RagError::UpstreamUnavailable { .. }
        )
    }
}

/// A convenience result type for pipeline operations.
pub type Result<T> = std::result::Result<T, RagError>;
