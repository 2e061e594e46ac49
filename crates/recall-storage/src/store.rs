//! RocksDB wrapper exposing named collections.
//!
//! Provides:
//! - Lazy open with idempotent `initialize`
//! - Collection creation through a reopen at `version + 1`
//! - Auto-keyed inserts with optional secondary index maintenance
//! - Bulk reads and cursor-driven streamed reads
//!
//! Every engine call runs on the blocking pool; awaiting it is the only
//! suspension point of each operation. Nothing is retried.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use recall_types::Settings;
use rocksdb::{ColumnFamily, Direction, IteratorMode, Options, WriteBatch, DB};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinError;
use tracing::{debug, info, instrument, warn};

use crate::collections::{
    index_cf_name, index_fields, is_index_cf, validate_name, validate_store_name, DEFAULT_CF,
    META_SCHEMA_VERSION,
};
use crate::cursor::RecordCursor;
use crate::error::StorageError;
use crate::fault::FaultPlan;
use crate::keys::{index_key, index_prefix, RecordKey};
use crate::schema::{plan_upgrade, SchemaChange, StoreState, INITIAL_VERSION};

const DEFAULT_CURSOR_BUFFER: usize = 64;

/// Versioned store of named collections, one RocksDB instance per store name.
///
/// The connection is owned exclusively by this value. Two instances pointed at
/// the same directory do not coordinate: the second open is refused by
/// RocksDB's file lock and surfaces as [`StorageError::Open`].
pub struct DurableStore {
    name: String,
    path: PathBuf,
    cursor_buffer: usize,
    state: StoreState,
    db: Option<Arc<DB>>,
    /// Every column family except the default one
    column_families: BTreeSet<String>,
    /// Last key handed out per collection
    sequences: Arc<DashMap<String, u64>>,
    faults: Arc<FaultPlan>,
}

/// Result of a blocking open.
struct Opened {
    db: DB,
    column_families: BTreeSet<String>,
    version: u32,
}

impl DurableStore {
    /// Describe a store at `data_dir/name`. Nothing is opened until
    /// [`initialize`](Self::initialize).
    pub fn new(data_dir: impl AsRef<Path>, name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            path: data_dir.as_ref().join(&name),
            name,
            cursor_buffer: DEFAULT_CURSOR_BUFFER,
            state: StoreState::Uninitialized,
            db: None,
            column_families: BTreeSet::new(),
            sequences: Arc::new(DashMap::new()),
            faults: Arc::new(FaultPlan::default()),
        }
    }

    /// Store under the configured data directory, tuned from settings.
    pub fn from_settings(settings: &Settings, name: impl Into<String>) -> Self {
        Self::new(settings.expanded_data_dir(), name).with_cursor_buffer(settings.store.cursor_buffer)
    }

    /// Set the bounded channel capacity used by [`db_generator`](Self::db_generator).
    pub fn with_cursor_buffer(mut self, capacity: usize) -> Self {
        self.cursor_buffer = capacity.max(1);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn state(&self) -> &StoreState {
        &self.state
    }

    /// Schema version of the open connection.
    pub fn version(&self) -> Option<u32> {
        self.state.version()
    }

    /// Names of all collections, sorted. Index families are not listed.
    pub fn collection_names(&self) -> Vec<String> {
        self.column_families
            .iter()
            .filter(|name| !is_index_cf(name))
            .cloned()
            .collect()
    }

    pub fn has_collection(&self, name: &str) -> bool {
        !is_index_cf(name) && self.column_families.contains(name)
    }

    /// Make the next inserts fail once `successes` more have gone through.
    #[cfg(any(test, feature = "testing"))]
    pub fn fail_inserts_after(&self, successes: usize) {
        self.faults.arm(successes);
    }

    /// Open the store at its current version. Resolves immediately if already open.
    #[instrument(skip(self), fields(store = %self.name))]
    pub async fn initialize(&mut self) -> Result<(), StorageError> {
        if self.state.is_ready() {
            debug!("Store already open");
            return Ok(());
        }
        validate_store_name(&self.name)?;

        self.state = StoreState::Opening;
        let path = self.path.clone();
        let result = tokio::task::spawn_blocking(move || open_blocking(&path, &[], None)).await;
        self.finish_open(result)
    }

    /// Create a collection, optionally indexed on `index` field.
    ///
    /// Reopens the store at `version + 1` so the new column families exist.
    /// If the collection already exists this logs a notice and does nothing.
    #[instrument(skip(self), fields(store = %self.name))]
    pub async fn make_object_store(
        &mut self,
        name: &str,
        index: Option<&str>,
    ) -> Result<(), StorageError> {
        let version = self.state.version().ok_or(StorageError::NotInitialized)?;
        validate_name(name)?;
        if let Some(field) = index {
            if field.is_empty() {
                return Err(StorageError::InvalidName(index_cf_name(name, field)));
            }
        }

        let change = SchemaChange::CreateCollection {
            name: name.to_string(),
            index: index.map(str::to_string),
        };
        let Some(plan) = plan_upgrade(version, &self.column_families, &change) else {
            info!(collection = name, "Collection already exists, skipping creation");
            return Ok(());
        };

        info!(
            collection = name,
            from = plan.from,
            to = plan.to,
            "Upgrading store schema"
        );
        self.state = StoreState::Upgrading {
            from: plan.from,
            to: plan.to,
        };
        // Release our handle; RocksDB closes once no cursor still holds it.
        self.db = None;

        let path = self.path.clone();
        let to = plan.to;
        let new_cfs = plan.new_column_families;
        let result =
            tokio::task::spawn_blocking(move || open_blocking(&path, &new_cfs, Some(to))).await;
        self.finish_open(result)
    }

    /// Insert `record` with the next auto-assigned key.
    #[instrument(skip(self, record), fields(store = %self.name))]
    pub async fn add_to_db<T>(&self, collection: &str, record: &T) -> Result<RecordKey, StorageError>
    where
        T: Serialize + ?Sized,
    {
        let db = self.ready_db()?;
        self.require_collection(collection)?;

        let value = serde_json::to_value(record)?;
        let bytes = serde_json::to_vec(&value)?;
        let fields = index_fields(collection, &self.column_families);
        let sequences = Arc::clone(&self.sequences);
        let faults = Arc::clone(&self.faults);
        let collection = collection.to_string();

        tokio::task::spawn_blocking(move || {
            let insert_error = |reason: String| StorageError::Insert {
                collection: collection.clone(),
                reason,
            };
            if !faults.allow_insert() {
                return Err(insert_error("injected write failure".to_string()));
            }

            let cf = column_family(&db, &collection)?;
            let key = next_key(&db, cf, &sequences, &collection)?;

            let mut batch = WriteBatch::default();
            batch.put_cf(cf, key.to_bytes(), &bytes);
            for field in &fields {
                if let Some(field_value) = value.get(field) {
                    let index_cf = column_family(&db, &index_cf_name(&collection, field))?;
                    batch.put_cf(index_cf, index_key(field_value, key)?, key.to_bytes());
                }
            }
            db.write(batch).map_err(|e| insert_error(e.to_string()))?;

            debug!(collection = %collection, key = key.0, "Inserted record");
            Ok(key)
        })
        .await?
    }

    /// Read every record of a collection in key order.
    #[instrument(skip(self), fields(store = %self.name))]
    pub async fn get_all_from_db<T>(&self, collection: &str) -> Result<Vec<T>, StorageError>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let db = self.ready_db()?;
        self.require_collection(collection)?;
        let collection = collection.to_string();

        tokio::task::spawn_blocking(move || {
            let cf = column_family(&db, &collection)?;
            let mut records = Vec::new();
            for item in db.iterator_cf(cf, IteratorMode::Start) {
                let (_, value) = item?;
                records.push(serde_json::from_slice(&value)?);
            }
            debug!(collection = %collection, count = records.len(), "Read collection");
            Ok(records)
        })
        .await?
    }

    /// Records whose indexed `field` equals `value`, in key order.
    #[instrument(skip(self, value), fields(store = %self.name))]
    pub async fn get_by_index<T>(
        &self,
        collection: &str,
        field: &str,
        value: &serde_json::Value,
    ) -> Result<Vec<T>, StorageError>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let db = self.ready_db()?;
        self.require_collection(collection)?;
        let index_name = index_cf_name(collection, field);
        if !self.column_families.contains(&index_name) {
            return Err(StorageError::CollectionMissing(index_name));
        }
        let prefix = index_prefix(value)?;
        let collection = collection.to_string();

        tokio::task::spawn_blocking(move || {
            let cf = column_family(&db, &collection)?;
            let index_cf = column_family(&db, &index_name)?;
            let mut records = Vec::new();
            let iter = db.iterator_cf(index_cf, IteratorMode::From(&prefix, Direction::Forward));
            for item in iter {
                let (key, primary) = item?;
                if !key.starts_with(&prefix) {
                    break;
                }
                match db.get_cf(cf, &primary)? {
                    Some(bytes) => records.push(serde_json::from_slice(&bytes)?),
                    None => warn!(index = %index_name, "Dangling index entry"),
                }
            }
            Ok(records)
        })
        .await?
    }

    /// Number of records in a collection.
    pub async fn count(&self, collection: &str) -> Result<usize, StorageError> {
        let db = self.ready_db()?;
        self.require_collection(collection)?;
        let collection = collection.to_string();

        tokio::task::spawn_blocking(move || {
            let cf = column_family(&db, &collection)?;
            let mut count = 0;
            for item in db.iterator_cf(cf, IteratorMode::Start) {
                item?;
                count += 1;
            }
            Ok(count)
        })
        .await?
    }

    /// Stream a collection through a forward cursor.
    ///
    /// At most `cursor_buffer` decoded records are held ahead of the consumer.
    /// A decode or read error is delivered as the final item.
    /// Must be called within a Tokio runtime.
    pub fn db_generator<T>(&self, collection: &str) -> Result<RecordCursor<T>, StorageError>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let db = self.ready_db()?;
        self.require_collection(collection)?;
        let collection = collection.to_string();
        let (tx, rx) = mpsc::channel(self.cursor_buffer);

        tokio::task::spawn_blocking(move || {
            let cf = match column_family(&db, &collection) {
                Ok(cf) => cf,
                Err(e) => {
                    let _ = tx.blocking_send(Err(e));
                    return;
                }
            };

            let mut sent = 0usize;
            for item in db.iterator_cf(cf, IteratorMode::Start) {
                let next = item
                    .map_err(StorageError::from)
                    .and_then(|(_, value)| serde_json::from_slice::<T>(&value).map_err(Into::into));
                let failed = next.is_err();
                if tx.blocking_send(next).is_err() {
                    debug!(collection = %collection, sent, "Cursor dropped before end");
                    return;
                }
                if failed {
                    return;
                }
                sent += 1;
            }
            debug!(collection = %collection, sent, "Cursor exhausted");
        });

        Ok(RecordCursor::new(rx))
    }

    /// Release the connection. The next `initialize` reopens at the stored version.
    pub fn close(&mut self) {
        if self.db.take().is_some() {
            info!(store = %self.name, "Closed store");
        }
        self.column_families.clear();
        self.sequences.clear();
        self.state = StoreState::Uninitialized;
    }

    fn ready_db(&self) -> Result<Arc<DB>, StorageError> {
        match (&self.state, &self.db) {
            (StoreState::Ready { .. }, Some(db)) => Ok(Arc::clone(db)),
            _ => Err(StorageError::NotInitialized),
        }
    }

    fn require_collection(&self, collection: &str) -> Result<(), StorageError> {
        if self.has_collection(collection) {
            Ok(())
        } else {
            Err(StorageError::CollectionMissing(collection.to_string()))
        }
    }

    fn finish_open(
        &mut self,
        result: Result<Result<Opened, StorageError>, JoinError>,
    ) -> Result<(), StorageError> {
        match result.map_err(StorageError::from).and_then(|opened| opened) {
            Ok(opened) => {
                info!(
                    store = %self.name,
                    version = opened.version,
                    collections = opened.column_families.len(),
                    "Store ready"
                );
                // Another handle may have written since; reseed from disk.
                self.sequences.clear();
                self.db = Some(Arc::new(opened.db));
                self.column_families = opened.column_families;
                self.state = StoreState::Ready {
                    version: opened.version,
                };
                Ok(())
            }
            Err(e) => {
                let reason = e.to_string();
                warn!(store = %self.name, error = %reason, "Store open failed");
                self.db = None;
                self.state = StoreState::Failed {
                    reason: reason.clone(),
                };
                Err(StorageError::Open {
                    name: self.name.clone(),
                    reason,
                })
            }
        }
    }
}

/// Open the database with every existing column family plus `new_cfs`.
///
/// With `bump_to` set, the schema version is rewritten to it; otherwise the
/// stored version is read back (and initialized for a fresh store).
fn open_blocking(
    path: &Path,
    new_cfs: &[String],
    bump_to: Option<u32>,
) -> Result<Opened, StorageError> {
    std::fs::create_dir_all(path)?;

    let mut opts = Options::default();
    opts.create_if_missing(true);
    opts.create_missing_column_families(true);

    let mut column_families: BTreeSet<String> = if path.join("CURRENT").exists() {
        DB::list_cf(&opts, path)?
            .into_iter()
            .filter(|name| name != DEFAULT_CF)
            .collect()
    } else {
        BTreeSet::new()
    };
    column_families.extend(new_cfs.iter().cloned());

    let db = DB::open_cf(&opts, path, column_families.iter())?;

    let version = match bump_to {
        Some(version) => {
            db.put(META_SCHEMA_VERSION, version.to_be_bytes())?;
            version
        }
        None => match db.get(META_SCHEMA_VERSION)? {
            Some(bytes) => decode_version(&bytes)?,
            None => {
                db.put(META_SCHEMA_VERSION, INITIAL_VERSION.to_be_bytes())?;
                INITIAL_VERSION
            }
        },
    };

    Ok(Opened {
        db,
        column_families,
        version,
    })
}

fn decode_version(bytes: &[u8]) -> Result<u32, StorageError> {
    let raw: [u8; 4] = bytes
        .try_into()
        .map_err(|_| StorageError::Key(format!("Bad schema version length: {}", bytes.len())))?;
    Ok(u32::from_be_bytes(raw))
}

fn column_family<'a>(db: &'a DB, name: &str) -> Result<&'a ColumnFamily, StorageError> {
    db.cf_handle(name)
        .ok_or_else(|| StorageError::CollectionMissing(name.to_string()))
}

/// Reserve the next key of `collection`, seeding the counter from the last
/// stored key the first time the collection is written on this connection.
fn next_key(
    db: &DB,
    cf: &ColumnFamily,
    sequences: &DashMap<String, u64>,
    collection: &str,
) -> Result<RecordKey, StorageError> {
    let mut last = sequences
        .entry(collection.to_string())
        .or_try_insert_with(|| last_key(db, cf))?;
    let key = RecordKey(*last).next();
    *last = key.0;
    Ok(key)
}

fn last_key(db: &DB, cf: &ColumnFamily) -> Result<u64, StorageError> {
    let mut iter = db.iterator_cf(cf, IteratorMode::End);
    match iter.next() {
        Some(item) => {
            let (key, _) = item?;
            Ok(RecordKey::from_bytes(&key)?.0)
        }
        None => Ok(0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use serde::Deserialize;
    use tempfile::TempDir;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Note {
        id: u32,
        tag: String,
    }

    fn note(id: u32, tag: &str) -> Note {
        Note {
            id,
            tag: tag.to_string(),
        }
    }

    async fn open_store(temp: &TempDir) -> DurableStore {
        let mut store = DurableStore::new(temp.path(), "test-db");
        store.initialize().await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_initialize_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let mut store = DurableStore::new(temp.path(), "test-db");
        assert_eq!(store.state(), &StoreState::Uninitialized);

        store.initialize().await.unwrap();
        assert_eq!(store.state(), &StoreState::Ready { version: 1 });

        store.initialize().await.unwrap();
        assert_eq!(store.version(), Some(1));
        assert!(store.collection_names().is_empty());
    }

    #[tokio::test]
    async fn test_operations_require_initialize() {
        let temp = TempDir::new().unwrap();
        let mut store = DurableStore::new(temp.path(), "test-db");

        let result = store.make_object_store("notes", None).await;
        assert!(matches!(result, Err(StorageError::NotInitialized)));

        let result = store.add_to_db("notes", &note(1, "a")).await;
        assert!(matches!(result, Err(StorageError::NotInitialized)));

        assert!(matches!(
            store.db_generator::<Note>("notes"),
            Err(StorageError::NotInitialized)
        ));
    }

    #[tokio::test]
    async fn test_make_object_store_twice_creates_one_collection() {
        let temp = TempDir::new().unwrap();
        let mut store = open_store(&temp).await;

        store.make_object_store("A", None).await.unwrap();
        assert_eq!(store.version(), Some(2));

        store.make_object_store("A", None).await.unwrap();
        assert_eq!(store.version(), Some(2));
        assert_eq!(store.collection_names(), vec!["A".to_string()]);
    }

    #[tokio::test]
    async fn test_each_new_collection_bumps_version() {
        let temp = TempDir::new().unwrap();
        let mut store = open_store(&temp).await;

        store.make_object_store("A", None).await.unwrap();
        store.make_object_store("B", Some("id")).await.unwrap();
        assert_eq!(store.version(), Some(3));
        assert_eq!(
            store.collection_names(),
            vec!["A".to_string(), "B".to_string()]
        );
    }

    #[tokio::test]
    async fn test_reserved_collection_names_rejected() {
        let temp = TempDir::new().unwrap();
        let mut store = open_store(&temp).await;

        let result = store.make_object_store("default", None).await;
        assert!(matches!(result, Err(StorageError::InvalidName(_))));
        let result = store.make_object_store("x.by.y", None).await;
        assert!(matches!(result, Err(StorageError::InvalidName(_))));
        assert_eq!(store.version(), Some(1));
    }

    #[tokio::test]
    async fn test_add_requires_collection() {
        let temp = TempDir::new().unwrap();
        let store = open_store(&temp).await;

        let result = store.add_to_db("missing", &note(1, "a")).await;
        assert!(matches!(result, Err(StorageError::CollectionMissing(name)) if name == "missing"));

        let result = store.get_all_from_db::<Note>("missing").await;
        assert!(matches!(result, Err(StorageError::CollectionMissing(_))));
    }

    #[tokio::test]
    async fn test_add_assigns_sequential_keys_and_reads_in_order() {
        let temp = TempDir::new().unwrap();
        let mut store = open_store(&temp).await;
        store.make_object_store("notes", None).await.unwrap();

        let mut keys = Vec::new();
        for i in 0..5 {
            keys.push(store.add_to_db("notes", &note(i, "t")).await.unwrap());
        }
        assert_eq!(keys, (1..=5).map(RecordKey).collect::<Vec<_>>());

        let all: Vec<Note> = store.get_all_from_db("notes").await.unwrap();
        assert_eq!(all, (0..5).map(|i| note(i, "t")).collect::<Vec<_>>());
        assert_eq!(store.count("notes").await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_duplicate_records_are_not_deduplicated() {
        let temp = TempDir::new().unwrap();
        let mut store = open_store(&temp).await;
        store.make_object_store("notes", None).await.unwrap();

        store.add_to_db("notes", &note(1, "same")).await.unwrap();
        store.add_to_db("notes", &note(1, "same")).await.unwrap();
        assert_eq!(store.count("notes").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_cursor_streams_every_record_then_ends() {
        let temp = TempDir::new().unwrap();
        let mut store = open_store(&temp).await.with_cursor_buffer(2);
        store.make_object_store("notes", None).await.unwrap();
        for i in 0..10 {
            store.add_to_db("notes", &note(i, "c")).await.unwrap();
        }

        let mut cursor = store.db_generator::<Note>("notes").unwrap();
        let mut seen = Vec::new();
        while let Some(item) = cursor.next().await {
            seen.push(item.unwrap().id);
        }
        assert_eq!(seen, (0..10).collect::<Vec<_>>());
        assert_eq!(cursor.delivered(), 10);

        // Not restartable
        assert!(cursor.next().await.is_none());
    }

    #[tokio::test]
    async fn test_cursor_as_stream() {
        let temp = TempDir::new().unwrap();
        let mut store = open_store(&temp).await;
        store.make_object_store("notes", None).await.unwrap();
        store.add_to_db("notes", &note(1, "a")).await.unwrap();
        store.add_to_db("notes", &note(2, "b")).await.unwrap();

        let cursor = store.db_generator::<Note>("notes").unwrap();
        let items: Vec<Note> = cursor.map(|item| item.unwrap()).collect().await;
        assert_eq!(items, vec![note(1, "a"), note(2, "b")]);
    }

    #[tokio::test]
    async fn test_cursor_on_empty_collection() {
        let temp = TempDir::new().unwrap();
        let mut store = open_store(&temp).await;
        store.make_object_store("empty", None).await.unwrap();

        let mut cursor = store.db_generator::<Note>("empty").unwrap();
        assert!(cursor.next().await.is_none());
    }

    #[tokio::test]
    async fn test_cursor_reports_decode_error() {
        #[derive(Debug, Deserialize)]
        #[allow(dead_code)]
        struct Other {
            missing_field: String,
        }

        let temp = TempDir::new().unwrap();
        let mut store = open_store(&temp).await;
        store.make_object_store("notes", None).await.unwrap();
        store.add_to_db("notes", &note(1, "a")).await.unwrap();

        let mut cursor = store.db_generator::<Other>("notes").unwrap();
        assert!(matches!(
            cursor.next().await,
            Some(Err(StorageError::Serialization(_)))
        ));
        assert!(cursor.next().await.is_none());
    }

    #[tokio::test]
    async fn test_secondary_index_lookup() {
        let temp = TempDir::new().unwrap();
        let mut store = open_store(&temp).await;
        store.make_object_store("notes", Some("tag")).await.unwrap();

        store.add_to_db("notes", &note(1, "rust")).await.unwrap();
        store.add_to_db("notes", &note(2, "go")).await.unwrap();
        store.add_to_db("notes", &note(3, "rust")).await.unwrap();

        let rust: Vec<Note> = store
            .get_by_index("notes", "tag", &serde_json::json!("rust"))
            .await
            .unwrap();
        assert_eq!(rust, vec![note(1, "rust"), note(3, "rust")]);

        let none: Vec<Note> = store
            .get_by_index("notes", "tag", &serde_json::json!("zig"))
            .await
            .unwrap();
        assert!(none.is_empty());

        let result = store
            .get_by_index::<Note>("notes", "id", &serde_json::json!(1))
            .await;
        assert!(matches!(result, Err(StorageError::CollectionMissing(_))));
    }

    #[tokio::test]
    async fn test_reopen_resumes_version_and_keys() {
        let temp = TempDir::new().unwrap();
        {
            let mut store = open_store(&temp).await;
            store.make_object_store("notes", None).await.unwrap();
            store.add_to_db("notes", &note(1, "a")).await.unwrap();
            store.add_to_db("notes", &note(2, "b")).await.unwrap();
            store.close();
            assert_eq!(store.state(), &StoreState::Uninitialized);
        }

        let store = open_store(&temp).await;
        assert_eq!(store.version(), Some(2));
        assert!(store.has_collection("notes"));

        let key = store.add_to_db("notes", &note(3, "c")).await.unwrap();
        assert_eq!(key, RecordKey(3));
        assert_eq!(store.count("notes").await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_reinitialize_reseeds_keys_written_by_another_handle() {
        let temp = TempDir::new().unwrap();
        let mut first = open_store(&temp).await;
        first.make_object_store("notes", None).await.unwrap();
        first.add_to_db("notes", &note(1, "a")).await.unwrap();
        first.add_to_db("notes", &note(2, "a")).await.unwrap();
        first.close();

        {
            let second = open_store(&temp).await;
            let key = second.add_to_db("notes", &note(3, "b")).await.unwrap();
            assert_eq!(key, RecordKey(3));
        }

        first.initialize().await.unwrap();
        let key = first.add_to_db("notes", &note(4, "a")).await.unwrap();
        assert_eq!(key, RecordKey(4));

        let all: Vec<Note> = first.get_all_from_db("notes").await.unwrap();
        let ids: Vec<u32> = all.iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_failed_upgrade_can_be_retried() {
        let temp = TempDir::new().unwrap();
        let mut store = DurableStore::new(temp.path(), "test-db").with_cursor_buffer(1);
        store.initialize().await.unwrap();
        store.make_object_store("notes", None).await.unwrap();
        for id in 0..5 {
            store.add_to_db("notes", &note(id, "a")).await.unwrap();
        }

        // The producer blocks on the full channel while holding the connection.
        let cursor = store.db_generator::<Note>("notes").unwrap();
        let result = store.make_object_store("tags", None).await;
        assert!(matches!(result, Err(StorageError::Open { .. })));
        assert!(matches!(store.state(), StoreState::Failed { .. }));
        assert!(matches!(
            store.add_to_db("notes", &note(9, "a")).await,
            Err(StorageError::NotInitialized)
        ));

        drop(cursor);
        let mut attempts = 0;
        while store.initialize().await.is_err() {
            attempts += 1;
            assert!(attempts < 100, "store stayed locked after the cursor was dropped");
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        assert_eq!(store.version(), Some(2));
        assert!(!store.has_collection("tags"));

        store.make_object_store("tags", None).await.unwrap();
        assert_eq!(store.version(), Some(3));
        assert_eq!(
            store.collection_names(),
            vec!["notes".to_string(), "tags".to_string()]
        );
        assert_eq!(store.count("notes").await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_second_instance_on_same_store_is_refused() {
        let temp = TempDir::new().unwrap();
        let _first = open_store(&temp).await;

        let mut second = DurableStore::new(temp.path(), "test-db");
        let result = second.initialize().await;
        assert!(matches!(result, Err(StorageError::Open { .. })));
        assert!(matches!(second.state(), StoreState::Failed { .. }));
    }

    #[tokio::test]
    async fn test_failed_open_can_be_retried() {
        let temp = TempDir::new().unwrap();
        // A plain file where the store directory should go blocks the open.
        let blocker = temp.path().join("test-db");
        std::fs::write(&blocker, b"not a database").unwrap();

        let mut store = DurableStore::new(temp.path(), "test-db");
        assert!(matches!(
            store.initialize().await,
            Err(StorageError::Open { .. })
        ));
        assert!(matches!(store.state(), StoreState::Failed { .. }));

        std::fs::remove_file(&blocker).unwrap();
        store.initialize().await.unwrap();
        assert!(store.state().is_ready());
    }

    #[tokio::test]
    async fn test_invalid_store_name() {
        let temp = TempDir::new().unwrap();
        let mut store = DurableStore::new(temp.path(), "../escape");
        assert!(matches!(
            store.initialize().await,
            Err(StorageError::InvalidName(_))
        ));
    }

    #[tokio::test]
    async fn test_injected_insert_failure_keeps_earlier_writes() {
        let temp = TempDir::new().unwrap();
        let mut store = open_store(&temp).await;
        store.make_object_store("notes", None).await.unwrap();
        store.fail_inserts_after(2);

        store.add_to_db("notes", &note(1, "a")).await.unwrap();
        store.add_to_db("notes", &note(2, "b")).await.unwrap();
        let result = store.add_to_db("notes", &note(3, "c")).await;
        assert!(matches!(result, Err(StorageError::Insert { .. })));
        assert_eq!(store.count("notes").await.unwrap(), 2);
    }
}
