//! Vector index error types.

use thiserror::Error;

/// Errors that can occur during index operations.
#[derive(Debug, Error)]
pub enum VectorError {
    /// `embedding` is missing, not an array, or holds a non-finite/non-numeric value
    #[error("Invalid embedding: {0}")]
    InvalidEmbedding(String),

    /// Record lacks fields established by the first record
    #[error("Schema mismatch: missing fields {missing:?}")]
    SchemaMismatch { missing: Vec<String> },

    /// No record matches the filter
    #[error("No record matches filter {0}")]
    NotFound(String),

    /// Vectors compared with different lengths
    #[error("Length mismatch: {left} vs {right}")]
    LengthMismatch { left: usize, right: usize },

    /// Save requested for an index with no records
    #[error("Index is empty, nothing to save")]
    EmptyIndex,

    /// Value is not a field map
    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Durable store error
    #[error("Storage error: {0}")]
    Storage(#[from] recall_storage::StorageError),
}
