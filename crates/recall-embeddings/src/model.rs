//! Embedding model trait and types.
//!
//! Defines the interface for generating vector embeddings from text.

use serde::{Deserialize, Serialize};

use crate::error::EmbeddingError;

/// Vector embedding.
#[derive(Debug, Clone, PartialEq)]
pub struct Embedding {
    pub values: Vec<f32>,
}

impl Embedding {
    /// Create an embedding scaled to unit length.
    /// Zero vectors are kept as they are.
    pub fn normalized(values: Vec<f32>) -> Self {
        let norm: f32 = values.iter().map(|x| x * x).sum::<f32>().sqrt();
        let values = if norm > 0.0 {
            values.iter().map(|x| x / norm).collect()
        } else {
            values
        };
        Self { values }
    }

    /// Create an embedding without touching the values.
    pub fn raw(values: Vec<f32>) -> Self {
        Self { values }
    }

    pub fn dimension(&self) -> usize {
        self.values.len()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.values
    }

    pub fn into_vec(self) -> Vec<f32> {
        self.values
    }
}

/// How token vectors are collapsed into one sentence vector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Pooling {
    #[default]
    Mean,
    Cls,
}

/// Options forwarded to the provider with every request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EmbedOptions {
    #[serde(default)]
    pub pooling: Pooling,

    /// Scale the output to unit length
    #[serde(default = "default_normalize")]
    pub normalize: bool,
}

fn default_normalize() -> bool {
    true
}

impl Default for EmbedOptions {
    fn default() -> Self {
        Self {
            pooling: Pooling::default(),
            normalize: default_normalize(),
        }
    }
}

/// Model information
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelInfo {
    /// Model name (e.g., "all-MiniLM-L6-v2")
    pub name: String,
    /// Embedding dimension
    pub dimension: usize,
}

/// Trait for embedding providers.
///
/// Implementations must be thread-safe (Send + Sync) for concurrent use.
pub trait EmbeddingModel: Send + Sync {
    /// Get model information
    fn info(&self) -> &ModelInfo;

    /// Generate embedding for a single text.
    fn embed(&self, text: &str, options: &EmbedOptions) -> Result<Embedding, EmbeddingError>;

    /// Generate embeddings for multiple texts (batch).
    /// Default implementation calls embed() for each text.
    fn embed_batch(
        &self,
        texts: &[&str],
        options: &EmbedOptions,
    ) -> Result<Vec<Embedding>, EmbeddingError> {
        texts.iter().map(|text| self.embed(text, options)).collect()
    }
}
