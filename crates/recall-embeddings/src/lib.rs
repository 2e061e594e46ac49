//! # recall-embeddings
//!
//! The seam between recall and whatever turns text into vectors.
//!
//! The model itself is supplied by the caller through [`EmbeddingModel`];
//! this crate adds the memo layer so each distinct text reaches the provider
//! once while it stays cached.
//!
//! ## Features
//! - Provider trait with pooling/normalization options
//! - Bounded LRU memo cache keyed by text and options
//! - Output dimension checked against the model's declared dimension

pub mod cache;
pub mod embedder;
pub mod error;
pub mod model;

pub use cache::{CacheStats, EmbeddingCache};
pub use embedder::CachedEmbedder;
pub use error::EmbeddingError;
pub use model::{EmbedOptions, Embedding, EmbeddingModel, ModelInfo, Pooling};
