//! Durable storage layer for recall.
//!
//! Provides a RocksDB-backed store of named collections with:
//! - One column family per collection, plus one per secondary index
//! - An explicit open/upgrade lifecycle (`StoreState`)
//! - A schema version bumped by every collection creation
//! - Auto-incrementing record keys, never derived from record content
//! - Cursor-driven streamed reads over a bounded channel

pub mod collections;
pub mod cursor;
pub mod error;
mod fault;
pub mod keys;
pub mod schema;
pub mod store;

pub use cursor::RecordCursor;
pub use error::StorageError;
pub use keys::RecordKey;
pub use schema::{plan_upgrade, SchemaChange, StoreState, UpgradePlan, INITIAL_VERSION};
pub use store::DurableStore;
