//! Exhaustive vector index.
//!
//! Records are kept in insertion order. Search scores every record that
//! passes the filter, so cost is O(n * d) per query; this index targets small
//! to moderate collections where building an approximate structure does not
//! pay off.

use recall_types::SearchSettings;
use tracing::{debug, info};

use crate::error::VectorError;
use crate::record::{Filter, Record, Schema};
use crate::similarity::{cosine_similarity, DEFAULT_PRECISION};

/// Results returned by a search when the caller does not say otherwise.
pub const DEFAULT_TOP_K: usize = 3;

/// One ranked match. Borrows the record from the index.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimilarityResult<'a> {
    /// Cosine similarity in [-1, 1], rounded to the index precision
    pub similarity: f64,
    pub record: &'a Record,
}

/// Search parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchOptions {
    /// Maximum number of results
    pub top_k: usize,
    /// Only records matching every pair are scored
    pub filter: Filter,
    /// Drop results scoring below this value
    pub min_similarity: Option<f64>,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            filter: Filter::new(),
            min_similarity: None,
        }
    }
}

impl SearchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_settings(settings: &SearchSettings) -> Self {
        Self {
            top_k: settings.top_k,
            ..Default::default()
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_min_similarity(mut self, min: f64) -> Self {
        self.min_similarity = Some(min);
        self
    }
}

/// A record plus its validated embedding, decoded once on insert.
#[derive(Debug, Clone)]
struct IndexedRecord {
    record: Record,
    embedding: Vec<f32>,
}

/// Ordered, schema-homogeneous collection of records.
///
/// Not shared across threads; callers serialize mutation externally.
#[derive(Debug, Clone)]
pub struct VectorIndex {
    entries: Vec<IndexedRecord>,
    schema: Option<Schema>,
    precision: u32,
}

impl Default for VectorIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl VectorIndex {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            schema: None,
            precision: DEFAULT_PRECISION,
        }
    }

    pub fn from_settings(settings: &SearchSettings) -> Self {
        Self::new().with_precision(settings.precision)
    }

    /// Decimal digits kept in similarity scores.
    pub fn with_precision(mut self, precision: u32) -> Self {
        self.precision = precision;
        self
    }

    /// Build an index from an initial batch, validating record by record.
    pub fn from_records(records: impl IntoIterator<Item = Record>) -> Result<Self, VectorError> {
        let mut index = Self::new();
        for record in records {
            index.add(record)?;
        }
        Ok(index)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn precision(&self) -> u32 {
        self.precision
    }

    /// Schema established by the first record, `None` while empty.
    pub fn schema(&self) -> Option<&Schema> {
        self.schema.as_ref()
    }

    /// Records in insertion order.
    pub fn records(&self) -> impl Iterator<Item = &Record> {
        self.entries.iter().map(|entry| &entry.record)
    }

    /// Append a record.
    ///
    /// The first record establishes the schema; later records must carry
    /// every established field but may add more.
    pub fn add(&mut self, record: Record) -> Result<(), VectorError> {
        let entry = self.validate(record)?;
        if self.schema.is_none() {
            let schema = Schema::from_record(&entry.record);
            debug!(fields = schema.len(), "Established index schema");
            self.schema = Some(schema);
        }
        self.entries.push(entry);
        Ok(())
    }

    /// Replace the first record matching `filter`, keeping its position.
    pub fn update(&mut self, filter: &Filter, record: Record) -> Result<(), VectorError> {
        let position = self
            .position(filter)
            .ok_or_else(|| VectorError::NotFound(filter.to_string()))?;
        let entry = self.validate(record)?;
        self.entries[position] = entry;
        debug!(position, "Updated record");
        Ok(())
    }

    /// Remove and return the first record matching `filter`.
    pub fn remove(&mut self, filter: &Filter) -> Result<Record, VectorError> {
        let position = self
            .position(filter)
            .ok_or_else(|| VectorError::NotFound(filter.to_string()))?;
        let removed = self.entries.remove(position);
        self.reset_schema_if_empty();
        Ok(removed.record)
    }

    /// Remove the first match of each filter, skipping filters with no match.
    ///
    /// Unlike [`remove`](Self::remove) this never fails; it returns how many
    /// records were removed.
    pub fn remove_batch(&mut self, filters: &[Filter]) -> usize {
        let mut removed = 0;
        for filter in filters {
            match self.position(filter) {
                Some(position) => {
                    self.entries.remove(position);
                    removed += 1;
                }
                None => debug!(filter = %filter, "No match, skipping"),
            }
        }
        self.reset_schema_if_empty();
        removed
    }

    /// First record matching `filter`.
    pub fn get(&self, filter: &Filter) -> Option<&Record> {
        self.position(filter).map(|position| &self.entries[position].record)
    }

    /// Rank filtered records by cosine similarity to `query`, best first.
    ///
    /// Equal scores keep insertion order. Returns at most `top_k` results.
    pub fn search(
        &self,
        query: &[f32],
        options: &SearchOptions,
    ) -> Result<Vec<SimilarityResult<'_>>, VectorError> {
        if let Some(i) = query.iter().position(|x| !x.is_finite()) {
            return Err(VectorError::InvalidEmbedding(format!(
                "query value at index {} is not finite: {}",
                i, query[i]
            )));
        }
        if options.top_k == 0 {
            return Ok(Vec::new());
        }

        let mut results = Vec::new();
        for entry in &self.entries {
            if !entry.record.matches(&options.filter) {
                continue;
            }
            let similarity = cosine_similarity(query, &entry.embedding, self.precision)?;
            if options.min_similarity.is_some_and(|min| similarity < min) {
                continue;
            }
            results.push(SimilarityResult {
                similarity,
                record: &entry.record,
            });
        }

        results.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        results.truncate(options.top_k);

        debug!(
            top_k = options.top_k,
            found = results.len(),
            scanned = self.entries.len(),
            "Search complete"
        );
        Ok(results)
    }

    /// Drop every record and the schema.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.schema = None;
    }

    /// Debug dump of every record.
    pub fn print_index(&self) {
        info!(records = self.entries.len(), "Index dump");
        for (position, entry) in self.entries.iter().enumerate() {
            info!(position, record = %serde_json::Value::Object(entry.record.fields().clone()));
        }
    }

    fn position(&self, filter: &Filter) -> Option<usize> {
        self.entries
            .iter()
            .position(|entry| entry.record.matches(filter))
    }

    fn validate(&self, record: Record) -> Result<IndexedRecord, VectorError> {
        let embedding = record.embedding()?;
        if let Some(schema) = &self.schema {
            let missing = schema.missing_from(&record);
            if !missing.is_empty() {
                return Err(VectorError::SchemaMismatch { missing });
            }
        }
        Ok(IndexedRecord { record, embedding })
    }

    fn reset_schema_if_empty(&mut self) {
        if self.entries.is_empty() {
            self.schema = None;
        }
    }
}
