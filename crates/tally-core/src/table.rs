//! Authenticated state tables and their backing database.
//!
//! A [`StateTable`] is an ordered key-value table summarized by a BLAKE3
//! digest; any change to its content changes the digest. Committed content
//! is persisted as a content-addressed blob in a [`TableStore`], so a table
//! can later be reopened at any committed digest. Digests are
//! domain-separated by a per-table namespace tag, mirroring the per-table
//! key prefixes of the on-chain state layout.
//!
//! The table is the unit of copy-on-write versioning: cloning a handle
//! yields an independently mutable table, and an aggregate snapshot is a
//! field-wise copy of its table handles.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::StoreError;
use crate::types::Hash256;

/// Backing database for committed table content.
///
/// Stores canonical table blobs keyed by their digest. Implementations must
/// write each blob atomically; cross-table atomicity is the aggregate's
/// documented partial-failure contract, not the backend's.
pub trait TableStore: Send + Sync {
    /// Fetch the blob committed under `root`. Returns `None` if the backend
    /// has no content for that digest.
    fn get_blob(&self, root: &Hash256) -> Result<Option<Vec<u8>>, StoreError>;

    /// Persist `blob` under `root`. Idempotent: content is addressed by its
    /// digest, so rewriting the same blob is harmless.
    fn put_blob(&self, root: &Hash256, blob: Vec<u8>) -> Result<(), StoreError>;
}

/// In-memory backing database for testing and light-weight nodes.
///
/// No persistence across process restarts. Interior locking makes a shared
/// `Arc<MemoryTableStore>` usable from several aggregates at once.
pub struct MemoryTableStore {
    blobs: RwLock<HashMap<Hash256, Vec<u8>>>,
}

impl MemoryTableStore {
    /// Create an empty in-memory store.
    pub fn new() -> Self {
        Self {
            blobs: RwLock::new(HashMap::new()),
        }
    }

    /// Number of committed blobs held.
    pub fn blob_count(&self) -> usize {
        self.blobs.read().len()
    }
}

impl Default for MemoryTableStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TableStore for MemoryTableStore {
    fn get_blob(&self, root: &Hash256) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.blobs.read().get(root).cloned())
    }

    fn put_blob(&self, root: &Hash256, blob: Vec<u8>) -> Result<(), StoreError> {
        self.blobs.write().insert(*root, blob);
        Ok(())
    }
}

/// An ordered, authenticated key-value table.
///
/// Mutations stay in memory until [`commit`](Self::commit) canonically
/// encodes the content and computes its digest, and
/// [`flush`](Self::flush) persists the committed blob to the backing
/// database. [`open_at`](Self::open_at) reconstructs a table from any
/// previously flushed digest against the same database.
#[derive(Clone)]
pub struct StateTable {
    /// Namespace tag folded into the digest, so equal contents in different
    /// tables commit to different roots.
    tag: &'static [u8],
    entries: BTreeMap<Vec<u8>, Vec<u8>>,
    backend: Arc<dyn TableStore>,
    /// Last committed (digest, blob) pair awaiting flush.
    staged: Option<(Hash256, Vec<u8>)>,
}

impl fmt::Debug for StateTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateTable")
            .field("tag", &self.tag)
            .field("entries", &self.entries)
            .field("staged", &self.staged)
            .finish_non_exhaustive()
    }
}

impl StateTable {
    /// Create an empty table (root digest [`Hash256::ZERO`]).
    pub fn empty(backend: Arc<dyn TableStore>, tag: &'static [u8]) -> Self {
        Self {
            tag,
            entries: BTreeMap::new(),
            backend,
            staged: None,
        }
    }

    /// Reopen a table at a previously committed digest.
    ///
    /// A zero `root` yields an empty table without touching the backend.
    ///
    /// # Errors
    ///
    /// - [`StoreError::MissingData`] if the backend holds no blob for `root`
    /// - [`StoreError::Corrupt`] if the blob fails to decode, or its content
    ///   does not re-hash to `root`
    pub fn open_at(
        backend: Arc<dyn TableStore>,
        tag: &'static [u8],
        root: Hash256,
    ) -> Result<Self, StoreError> {
        if root.is_zero() {
            return Ok(Self::empty(backend, tag));
        }
        let blob = backend
            .get_blob(&root)?
            .ok_or(StoreError::MissingData(root))?;
        let entries = decode_entries(&blob)?;
        let actual = content_root(tag, &entries);
        if actual != root {
            return Err(StoreError::Corrupt(format!(
                "table content hashes to {actual}, expected {root}"
            )));
        }
        Ok(Self {
            tag,
            entries,
            backend,
            staged: None,
        })
    }

    /// Look up a key. Returns `None` if absent; never an error.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.entries.get(key).cloned())
    }

    /// Check whether a key is present.
    pub fn contains(&self, key: &[u8]) -> Result<bool, StoreError> {
        Ok(self.entries.contains_key(key))
    }

    /// Insert or overwrite an entry.
    pub fn insert(&mut self, key: &[u8], value: Vec<u8>) -> Result<(), StoreError> {
        self.entries.insert(key.to_vec(), value);
        Ok(())
    }

    /// Remove an entry. Returns `false` if the key was absent — callers
    /// running cascading deletes tolerate that outcome.
    pub fn remove(&mut self, key: &[u8]) -> Result<bool, StoreError> {
        Ok(self.entries.remove(key).is_some())
    }

    /// All entries whose key starts with `prefix`, in key order.
    pub fn iter_prefix(&self, prefix: &[u8]) -> Vec<(Vec<u8>, Vec<u8>)> {
        self.entries
            .range(prefix.to_vec()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Current content digest. Pure and in-memory: reflects uncommitted
    /// mutations, and returns [`Hash256::ZERO`] for an empty table.
    pub fn root_hash(&self) -> Hash256 {
        if self.entries.is_empty() {
            return Hash256::ZERO;
        }
        content_root(self.tag, &self.entries)
    }

    /// Canonically encode the current content and stage it for
    /// [`flush`](Self::flush). Returns the content digest.
    ///
    /// Committing an empty table stages nothing: the zero digest needs no
    /// backend content to reopen.
    pub fn commit(&mut self) -> Result<Hash256, StoreError> {
        let root = self.root_hash();
        if root.is_zero() {
            self.staged = None;
            return Ok(root);
        }
        let blob = encode_entries(&self.entries)?;
        self.staged = Some((root, blob));
        Ok(root)
    }

    /// Persist the last committed blob to the backing database.
    ///
    /// A no-op when nothing has been committed since the table was opened.
    pub fn flush(&self) -> Result<(), StoreError> {
        match &self.staged {
            Some((root, blob)) => self.backend.put_blob(root, blob.clone()),
            None => Ok(()),
        }
    }
}

/// Digest of a table's full ordered content under its namespace tag.
///
/// Length-prefixes every key and value so entry boundaries are unambiguous.
fn content_root(tag: &[u8], entries: &BTreeMap<Vec<u8>, Vec<u8>>) -> Hash256 {
    let mut hasher = blake3::Hasher::new();
    hasher.update(tag);
    hasher.update(&(entries.len() as u64).to_le_bytes());
    for (key, value) in entries {
        hasher.update(&(key.len() as u32).to_le_bytes());
        hasher.update(key);
        hasher.update(&(value.len() as u32).to_le_bytes());
        hasher.update(value);
    }
    Hash256(hasher.finalize().into())
}

fn encode_entries(entries: &BTreeMap<Vec<u8>, Vec<u8>>) -> Result<Vec<u8>, StoreError> {
    let pairs: Vec<(&[u8], &[u8])> = entries
        .iter()
        .map(|(k, v)| (k.as_slice(), v.as_slice()))
        .collect();
    bincode::encode_to_vec(&pairs, bincode::config::standard())
        .map_err(|e| StoreError::Corrupt(e.to_string()))
}

fn decode_entries(blob: &[u8]) -> Result<BTreeMap<Vec<u8>, Vec<u8>>, StoreError> {
    let (pairs, _): (Vec<(Vec<u8>, Vec<u8>)>, _) =
        bincode::decode_from_slice(blob, bincode::config::standard())
            .map_err(|e| StoreError::Corrupt(e.to_string()))?;
    Ok(pairs.into_iter().collect())
}
