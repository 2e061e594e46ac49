//! Storage layer error types.

use thiserror::Error;

/// Errors that can occur in the storage layer
#[derive(Error, Debug)]
pub enum StorageError {
    /// Opening or upgrading the underlying database was refused
    #[error("Failed to open store {name}: {reason}")]
    Open { name: String, reason: String },

    /// Operation requires an open store
    #[error("Store not initialized")]
    NotInitialized,

    /// Collection (or one of its indexes) does not exist
    #[error("Collection not found: {0}")]
    CollectionMissing(String),

    /// Underlying write failed; nothing is retried
    #[error("Insert into {collection} failed: {reason}")]
    Insert { collection: String, reason: String },

    /// Collection or index name cannot be used as a column family
    #[error("Invalid collection name: {0}")]
    InvalidName(String),

    /// Filesystem error while preparing the store directory
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// RocksDB operation failed
    #[error("RocksDB error: {0}")]
    RocksDb(#[from] rocksdb::Error),

    /// Key encoding/decoding error
    #[error("Key error: {0}")]
    Key(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Blocking storage task panicked or was cancelled
    #[error("Storage task failed: {0}")]
    Task(String),
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

impl From<tokio::task::JoinError> for StorageError {
    fn from(err: tokio::task::JoinError) -> Self {
        StorageError::Task(err.to_string())
    }
}
