//! End-to-end test infrastructure for recall.
//!
//! Provides a shared TestHarness and helper functions for tests that cross
//! the index, store and embedding crates.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::Context;
use rand::Rng;

use recall_embeddings::{EmbedOptions, Embedding, EmbeddingError, EmbeddingModel, ModelInfo};
use recall_types::Settings;
use recall_vector::{IndexPersistence, Record, VectorIndex};

/// Shared test harness for E2E tests.
///
/// Owns a temp data directory and settings pointing into it.
pub struct TestHarness {
    /// Keeps temp dir alive for the lifetime of the harness
    pub _temp_dir: tempfile::TempDir,
    /// Directory holding every store created by the test
    pub data_dir: PathBuf,
    /// Defaults with `data_dir` redirected to the temp dir
    pub settings: Settings,
}

impl TestHarness {
    /// Create a new test harness with a fresh temp directory.
    pub fn new() -> Self {
        let temp_dir = tempfile::TempDir::new().expect("Failed to create temp dir");
        let data_dir = temp_dir.path().join("db");
        let settings = Settings {
            data_dir: data_dir.to_string_lossy().to_string(),
            ..Default::default()
        };
        let _ = init_tracing(&settings.log_level);

        Self {
            _temp_dir: temp_dir,
            data_dir,
            settings,
        }
    }

    /// Persistence bridge over the harness data directory.
    pub fn persistence(&self) -> IndexPersistence {
        IndexPersistence::from_settings(&self.settings)
    }

    /// Fresh index configured from the harness settings.
    pub fn index(&self) -> VectorIndex {
        VectorIndex::from_settings(&self.settings.search)
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Install a test-writer subscriber. `RUST_LOG` wins over `default_level`.
///
/// Only the first call in a process installs anything; later calls return an error.
pub fn init_tracing(default_level: &str) -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_test_writer()
        .try_init()
        .map_err(|e| anyhow::anyhow!(e))
        .context("Failed to set tracing subscriber")
}

/// Record with an integer `id`, a `title` and the given embedding.
pub fn doc(id: i64, embedding: &[f32]) -> Record {
    Record::new()
        .with_field("id", id)
        .with_field("title", format!("document {}", id))
        .with_embedding(embedding.iter().copied())
}

/// `count` records with random embeddings of `dimension` components.
pub fn random_docs(count: usize, dimension: usize) -> Vec<Record> {
    let mut rng = rand::rng();
    (0..count)
        .map(|i| {
            let embedding: Vec<f32> = (0..dimension)
                .map(|_| rng.random_range(-1.0..1.0))
                .collect();
            doc(i as i64, &embedding)
        })
        .collect()
}

/// Deterministic provider: counts byte occurrences into `dimension` buckets.
///
/// Texts sharing characters land close together, which is enough for ranking
/// assertions without a real model.
pub struct BucketModel {
    info: ModelInfo,
    calls: AtomicUsize,
}

impl BucketModel {
    pub fn new(dimension: usize) -> Self {
        Self {
            info: ModelInfo {
                name: "bucket".to_string(),
                dimension,
            },
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of provider invocations so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl EmbeddingModel for BucketModel {
    fn info(&self) -> &ModelInfo {
        &self.info
    }

    fn embed(&self, text: &str, options: &EmbedOptions) -> Result<Embedding, EmbeddingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut buckets = vec![0.0f32; self.info.dimension];
        for byte in text.to_lowercase().bytes().filter(u8::is_ascii_alphabetic) {
            buckets[usize::from(byte) % self.info.dimension] += 1.0;
        }
        Ok(if options.normalize {
            Embedding::normalized(buckets)
        } else {
            Embedding::raw(buckets)
        })
    }
}
