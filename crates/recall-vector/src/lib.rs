//! # recall-vector
//!
//! In-memory vector index with exhaustive cosine-similarity search.
//!
//! Every search compares the query against every surviving record; there is
//! no approximate structure to build or tune. Records are schema-homogeneous
//! field maps carrying an `embedding` field, and the whole index can be saved
//! to and streamed back from a [`recall_storage::DurableStore`] collection.
//!
//! ## Features
//! - Field-equality filters for update/remove/get/search
//! - Stable ranking with configurable score precision
//! - Typed records through serde
//! - Sequential save and cursor-driven reload

pub mod error;
pub mod index;
pub mod persistence;
pub mod record;
pub mod similarity;

pub use error::VectorError;
pub use index::{SearchOptions, SimilarityResult, VectorIndex};
pub use persistence::IndexPersistence;
pub use record::{Filter, Record, Schema, EMBEDDING_FIELD};
pub use similarity::{cosine_similarity, round_to, DEFAULT_PRECISION, MAX_PRECISION};
