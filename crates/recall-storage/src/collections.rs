//! Collection naming.
//!
//! Every collection is a RocksDB column family named after it. A secondary
//! index over `field` lives in a companion family `{collection}.by.{field}`.
//! The default column family holds store metadata only.

use crate::error::StorageError;

/// RocksDB's always-present column family
pub const DEFAULT_CF: &str = rocksdb::DEFAULT_COLUMN_FAMILY_NAME;

/// Metadata key holding the schema version (u32 BE) in the default family
pub const META_SCHEMA_VERSION: &[u8] = b"meta:schema_version";

const INDEX_SEPARATOR: &str = ".by.";

/// Column family name for the index of `collection` over `field`.
pub fn index_cf_name(collection: &str, field: &str) -> String {
    format!("{}{}{}", collection, INDEX_SEPARATOR, field)
}

/// True if the column family backs a secondary index.
pub fn is_index_cf(cf_name: &str) -> bool {
    cf_name.contains(INDEX_SEPARATOR)
}

/// Fields indexed for `collection`, given every column family name.
pub fn index_fields<'a>(
    collection: &str,
    cf_names: impl IntoIterator<Item = &'a String>,
) -> Vec<String> {
    let prefix = format!("{}{}", collection, INDEX_SEPARATOR);
    cf_names
        .into_iter()
        .filter_map(|name| name.strip_prefix(&prefix).map(str::to_string))
        .collect()
}

/// Reject names that would clash with metadata or index families.
pub fn validate_name(name: &str) -> Result<(), StorageError> {
    if name.is_empty() || name == DEFAULT_CF || is_index_cf(name) {
        return Err(StorageError::InvalidName(name.to_string()));
    }
    Ok(())
}

/// Reject store names that are not a single path component.
pub fn validate_store_name(name: &str) -> Result<(), StorageError> {
    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
        return Err(StorageError::InvalidName(name.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_fields_only_match_own_collection() {
        let names = vec![
            "notes".to_string(),
            index_cf_name("notes", "id"),
            index_cf_name("notes", "tag"),
            index_cf_name("notes_archive", "id"),
        ];
        let mut fields = index_fields("notes", &names);
        fields.sort();
        assert_eq!(fields, vec!["id".to_string(), "tag".to_string()]);
    }

    #[test]
    fn test_validate_name() {
        assert!(validate_name("notes").is_ok());
        assert!(validate_name("").is_err());
        assert!(validate_name("default").is_err());
        assert!(validate_name("notes.by.id").is_err());
    }

    #[test]
    fn test_validate_store_name() {
        assert!(validate_store_name("clientVectorDB").is_ok());
        assert!(validate_store_name("../escape").is_err());
        assert!(validate_store_name("..").is_err());
    }
}
