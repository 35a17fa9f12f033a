//! Redb (Rust embedded database) backend for FaceAuth snapshots.
//!
//! Every snapshot blob lives in a single table keyed by blob name. Writes go
//! through redb write transactions, so a multi-blob snapshot either commits
//! completely or not at all, and a commit is durable when it returns.

use crate::{SnapshotBackend, StoreError};
use redb::{Database, ReadableDatabase, TableDefinition};
use std::path::Path;
use std::sync::Arc;

const SNAPSHOT_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("faceauth_snapshots");

/// Redb backend for persistent snapshot storage.
///
/// The `Arc<Database>` allows sharing across threads; redb serializes write
/// transactions internally.
pub struct RedbBackend {
    db: Arc<Database>,
}

impl RedbBackend {
    /// Open or create a Redb database at the given path.
    ///
    /// Parent directories are created when missing.
    ///
    /// ```no_run
    /// use store::RedbBackend;
    ///
    /// let backend = RedbBackend::open("/tmp/faceauth.redb").unwrap();
    /// ```
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(StoreError::backend)?;
            }
        }

        let db = Database::create(path).map_err(StoreError::backend)?;

        // Accessing the table in a write txn creates it, so later reads never
        // hit a missing-table error.
        let write_txn = db.begin_write().map_err(StoreError::backend)?;
        {
            let _table = write_txn
                .open_table(SNAPSHOT_TABLE)
                .map_err(StoreError::backend)?;
        }
        write_txn.commit().map_err(StoreError::backend)?;

        tracing::debug!(path = %path.display(), "redb_backend_opened");
        Ok(Self { db: Arc::new(db) })
    }
}

impl SnapshotBackend for RedbBackend {
    fn put(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        self.put_many(vec![(key.to_string(), value.to_vec())])
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let read_txn = self.db.begin_read().map_err(StoreError::backend)?;
        let table = read_txn
            .open_table(SNAPSHOT_TABLE)
            .map_err(StoreError::backend)?;

        Ok(table
            .get(key)
            .map_err(StoreError::backend)?
            .map(|value| value.value().to_vec()))
    }

    fn put_many(&self, entries: Vec<(String, Vec<u8>)>) -> Result<(), StoreError> {
        let write_txn = self.db.begin_write().map_err(StoreError::backend)?;
        {
            let mut table = write_txn
                .open_table(SNAPSHOT_TABLE)
                .map_err(StoreError::backend)?;
            for (key, value) in &entries {
                table
                    .insert(key.as_str(), value.as_slice())
                    .map_err(StoreError::backend)?;
            }
        }
        write_txn.commit().map_err(StoreError::backend)?;
        Ok(())
    }
}
