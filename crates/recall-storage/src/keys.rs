//! Key encoding and decoding for the storage layer.
//!
//! Record keys are auto-assigned per collection, starting at 1, and stored
//! big-endian so RocksDB iteration order equals insertion order.
//!
//! Secondary index keys: `{json(field value)}\0{record key:8 bytes BE}`.
//! Serialized JSON never contains a raw NUL byte, so the NUL terminates the
//! value prefix unambiguously.

use crate::error::StorageError;

/// Auto-assigned key of a persisted record
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RecordKey(pub u64);

impl RecordKey {
    /// Key that follows this one
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }

    /// Encode key to bytes for storage
    pub fn to_bytes(self) -> [u8; 8] {
        self.0.to_be_bytes()
    }

    /// Decode key from bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, StorageError> {
        let raw: [u8; 8] = bytes
            .try_into()
            .map_err(|_| StorageError::Key(format!("Expected 8 key bytes, got {}", bytes.len())))?;
        Ok(Self(u64::from_be_bytes(raw)))
    }
}

/// Prefix shared by every index entry for `value`.
pub fn index_prefix(value: &serde_json::Value) -> Result<Vec<u8>, StorageError> {
    let mut prefix = serde_json::to_vec(value)?;
    prefix.push(0);
    Ok(prefix)
}

/// Full index key for `value` pointing at `key`.
pub fn index_key(value: &serde_json::Value, key: RecordKey) -> Result<Vec<u8>, StorageError> {
    let mut bytes = index_prefix(value)?;
    bytes.extend_from_slice(&key.to_bytes());
    Ok(bytes)
}
