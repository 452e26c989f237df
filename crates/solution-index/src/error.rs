//! Error types for solution-index

use thiserror::Error;

/// Errors that can occur in the solution index layer
#[derive(Error, Debug)]
pub enum IndexError {
    /// Corpus record failed validation
    #[error("Invalid corpus record #{position}: {reason}")]
    InvalidRecord { position: usize, reason: String },

    /// Corpus file is not a JSON array of records
    #[error("Invalid corpus file: {0}")]
    InvalidCorpus(String),

    /// Embedding backend failed
    #[error("Embedding failed: {0}")]
    Embedding(String),

    /// Vector length does not match the index dimension
    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Persisted collection was built with another embedder
    #[error("Collection '{collection}' was built with embedder '{found}', not '{expected}'")]
    EmbedderMismatch {
        collection: String,
        expected: String,
        found: String,
    },

    /// Persisted collection bytes do not match their digest
    #[error("Digest mismatch: expected {expected}, got {actual}")]
    DigestMismatch { expected: String, actual: String },

    /// Unknown solution id
    #[error("Solution not found: {0}")]
    NotFound(String),

    /// Serialization error
    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<ollama_client::OllamaError> for IndexError {
    fn from(err: ollama_client::OllamaError) -> Self {
        IndexError::Embedding(err.to_string())
    }
}
