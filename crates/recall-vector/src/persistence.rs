//! Save and reload a [`VectorIndex`] through a [`DurableStore`].
//!
//! Saving writes every record to a named collection, one awaited insert at a
//! time, so durable order matches index order. Loading drains the store's
//! cursor into a cleared index.

use std::path::{Path, PathBuf};

use recall_storage::DurableStore;
use recall_types::Settings;
use tracing::{debug, info, instrument};

use crate::error::VectorError;
use crate::index::VectorIndex;
use crate::record::Record;

/// Store name used by [`IndexPersistence::new`].
pub const DEFAULT_DB_NAME: &str = "clientVectorDB";

const DEFAULT_CURSOR_BUFFER: usize = 64;

/// Owns at most one open store and moves indexes in and out of it.
pub struct IndexPersistence {
    data_dir: PathBuf,
    default_db_name: String,
    cursor_buffer: usize,
    store: Option<DurableStore>,
}

impl IndexPersistence {
    /// Stores live under `data_dir`, one directory per store name.
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
            default_db_name: DEFAULT_DB_NAME.to_string(),
            cursor_buffer: DEFAULT_CURSOR_BUFFER,
            store: None,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            data_dir: settings.expanded_data_dir(),
            default_db_name: settings.db_name.clone(),
            cursor_buffer: settings.store.cursor_buffer,
            store: None,
        }
    }

    /// The currently attached store, if one has been opened.
    pub fn store(&self) -> Option<&DurableStore> {
        self.store.as_ref()
    }

    /// Attach and initialize the store called `db_name`.
    ///
    /// Reuses the attached store when the name matches; otherwise the attached
    /// store is closed first.
    pub async fn open(&mut self, db_name: &str) -> Result<&mut DurableStore, VectorError> {
        let reuse = self
            .store
            .as_ref()
            .is_some_and(|store| store.name() == db_name);
        if !reuse {
            if let Some(mut previous) = self.store.take() {
                previous.close();
            }
        }

        let store = match self.store.take() {
            Some(store) => store,
            None => DurableStore::new(&self.data_dir, db_name).with_cursor_buffer(self.cursor_buffer),
        };
        let store = self.store.insert(store);
        store.initialize().await?;
        Ok(store)
    }

    /// Write every record of `index` to `collection` in store `db_name`.
    ///
    /// Fails with [`VectorError::EmptyIndex`] before touching the store when the
    /// index has no records. A failed insert aborts the save; records written
    /// before it stay in the store.
    #[instrument(skip(self, index), fields(records = index.len()))]
    pub async fn save_index_to_db(
        &mut self,
        index: &VectorIndex,
        db_name: &str,
        collection: &str,
    ) -> Result<usize, VectorError> {
        if index.is_empty() {
            return Err(VectorError::EmptyIndex);
        }

        let store = self.open(db_name).await?;
        store.make_object_store(collection, None).await?;

        let mut saved = 0;
        for record in index.records() {
            store.add_to_db(collection, record).await?;
            saved += 1;
        }

        info!(saved, "Saved index");
        Ok(saved)
    }

    /// Replace the contents of `index` with the records stored in `collection`.
    ///
    /// Uses the attached store, or opens the default store when none is
    /// attached. The index is cleared only once the cursor is established; a
    /// record that fails validation mid-stream leaves the records loaded so far.
    #[instrument(skip(self, index))]
    pub async fn load_index_from_db(
        &mut self,
        index: &mut VectorIndex,
        collection: &str,
    ) -> Result<usize, VectorError> {
        let db_name = match &self.store {
            Some(store) => store.name().to_string(),
            None => self.default_db_name.clone(),
        };
        let store = self.open(&db_name).await?;
        let mut cursor = store.db_generator::<Record>(collection)?;

        index.clear();
        while let Some(record) = cursor.next().await {
            index.add(record?)?;
        }

        let loaded = cursor.delivered();
        debug!(loaded, db = %db_name, "Loaded index");
        Ok(loaded)
    }

    /// Release the attached store.
    pub fn close(&mut self) {
        if let Some(mut store) = self.store.take() {
            store.close();
        }
    }
}
