//! # tally-store
//! RocksDB-backed persistent backing database for Tally state tables.
//!
//! Implements [`TableStore`] with a dedicated column family for committed
//! table blobs, keyed by content digest. Each `put` is a single atomic
//! RocksDB write; cross-table commit ordering and its partial-failure
//! contract live in `tally-core`.

use std::path::Path;

use rocksdb::{ColumnFamilyDescriptor, DB, Options};
use tracing::{debug, warn};

use tally_core::error::StoreError;
use tally_core::table::TableStore;
use tally_core::types::Hash256;

/// Column family holding committed table blobs (digest → content).
const CF_TABLES: &str = "tables";

/// RocksDB-backed [`TableStore`].
///
/// Blobs are content-addressed, so writes are idempotent and never
/// overwrite divergent data; compaction-friendly and safe to share between
/// one committing aggregate and any number of readers.
pub struct RocksTableStore {
    db: DB,
}

impl RocksTableStore {
    /// Open or create a RocksDB database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        let cf_descriptors = vec![ColumnFamilyDescriptor::new(CF_TABLES, Options::default())];
        let db = DB::open_cf_descriptors(&db_opts, path.as_ref(), cf_descriptors)
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        debug!(path = %path.as_ref().display(), "opened table store");
        Ok(Self { db })
    }

    fn cf_tables(&self) -> Result<&rocksdb::ColumnFamily, StoreError> {
        self.db
            .cf_handle(CF_TABLES)
            .ok_or_else(|| StoreError::Backend(format!("missing column family {CF_TABLES}")))
    }
}

impl TableStore for RocksTableStore {
    fn get_blob(&self, root: &Hash256) -> Result<Option<Vec<u8>>, StoreError> {
        let cf = self.cf_tables()?;
        let blob = self
            .db
            .get_cf(cf, root.as_bytes())
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        // A miss is reported as `Ok(None)`; whether it is fatal is the
        // caller's call.
        if blob.is_none() {
            warn!(%root, "no blob for requested root");
        }
        Ok(blob)
    }

    fn put_blob(&self, root: &Hash256, blob: Vec<u8>) -> Result<(), StoreError> {
        let cf = self.cf_tables()?;
        debug!(%root, size = blob.len(), "flushing table blob");
        self.db
            .put_cf(cf, root.as_bytes(), blob)
            .map_err(|e| StoreError::Backend(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_then_get_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = RocksTableStore::open(dir.path().join("state")).unwrap();
        let root = Hash256([3; 32]);

        assert_eq!(store.get_blob(&root).unwrap(), None);
        store.put_blob(&root, vec![1, 2, 3]).unwrap();
        assert_eq!(store.get_blob(&root).unwrap(), Some(vec![1, 2, 3]));
    }

    #[test]
    fn put_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = RocksTableStore::open(dir.path().join("state")).unwrap();
        let root = Hash256([4; 32]);

        store.put_blob(&root, vec![9]).unwrap();
        store.put_blob(&root, vec![9]).unwrap();
        assert_eq!(store.get_blob(&root).unwrap(), Some(vec![9]));
    }
}
