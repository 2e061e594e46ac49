//! Records, filters and the index schema.
//!
//! A [`Record`] is a field-name-to-JSON-value map with one required field,
//! `embedding`, holding an array of finite numbers. Typed structs convert in
//! and out through serde, so a caller's own struct definition acts as the
//! schema description; the index still checks every record structurally.

use std::collections::BTreeSet;
use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::VectorError;

/// Name of the required vector field.
pub const EMBEDDING_FIELD: &str = "embedding";

/// A labeled embedding: arbitrary metadata fields plus `embedding`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(Map<String, Value>);

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a field (builder pattern).
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }

    /// Set the embedding (builder pattern).
    ///
    /// NaN and infinite values become JSON `null` and fail validation on insert.
    pub fn with_embedding(self, embedding: impl IntoIterator<Item = f32>) -> Self {
        let values: Vec<Value> = embedding.into_iter().map(Value::from).collect();
        self.with_field(EMBEDDING_FIELD, Value::Array(values))
    }

    /// Convert any serde struct (or map) into a record.
    pub fn from_serializable<T: Serialize + ?Sized>(value: &T) -> Result<Self, VectorError> {
        match serde_json::to_value(value)? {
            Value::Object(map) => Ok(Self(map)),
            other => Err(VectorError::InvalidRecord(format!(
                "expected a field map, got {}",
                json_kind(&other)
            ))),
        }
    }

    /// Convert back into a caller-defined type.
    pub fn deserialize_into<T: DeserializeOwned>(&self) -> Result<T, VectorError> {
        Ok(serde_json::from_value(Value::Object(self.0.clone()))?)
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn contains_field(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_fields(self) -> Map<String, Value> {
        self.0
    }

    /// Extract and validate the embedding.
    pub fn embedding(&self) -> Result<Vec<f32>, VectorError> {
        let value = self
            .0
            .get(EMBEDDING_FIELD)
            .ok_or_else(|| VectorError::InvalidEmbedding("missing embedding field".to_string()))?;
        let items = value.as_array().ok_or_else(|| {
            VectorError::InvalidEmbedding(format!("expected an array, got {}", json_kind(value)))
        })?;

        items
            .iter()
            .enumerate()
            .map(|(i, item)| {
                let number = item.as_f64().ok_or_else(|| {
                    VectorError::InvalidEmbedding(format!(
                        "non-numeric value at index {}: {}",
                        i, item
                    ))
                })?;
                let narrowed = number as f32;
                if !narrowed.is_finite() {
                    return Err(VectorError::InvalidEmbedding(format!(
                        "value at index {} does not fit in f32: {}",
                        i, number
                    )));
                }
                Ok(narrowed)
            })
            .collect()
    }

    /// True if every filter pair equals the record's field value.
    pub fn matches(&self, filter: &Filter) -> bool {
        filter
            .iter()
            .all(|(field, expected)| self.0.get(field) == Some(expected))
    }
}

impl From<Map<String, Value>> for Record {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Exact-match field filter. An empty filter matches every record.
///
/// Values compare as JSON: `1` and `1.0` are different values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter(Map<String, Value>);

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Require `field == value` (builder pattern).
    pub fn equals(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(field.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }
}

impl From<Map<String, Value>> for Filter {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", Value::Object(self.0.clone()))
    }
}

/// Field names every record of an index must carry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schema {
    fields: BTreeSet<String>,
}

impl Schema {
    /// Schema established by the first record of an index.
    pub fn from_record(record: &Record) -> Self {
        Self {
            fields: record.field_names().map(str::to_string).collect(),
        }
    }

    /// Established fields the record lacks, sorted. Extra fields are fine.
    pub fn missing_from(&self, record: &Record) -> Vec<String> {
        self.fields
            .iter()
            .filter(|field| !record.contains_field(field))
            .cloned()
            .collect()
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains(field)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(String::as_str)
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
