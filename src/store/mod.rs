mod durable;
mod memory;
mod wal;

pub use durable::WalStore;
pub use memory::MemoryStore;

use std::collections::BTreeMap;
use std::io;
use std::ops::Bound;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Two-part key of the sorted store. Orders by partition, then sort component,
/// so every partition is one contiguous, ordered range.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StoreKey {
    pub partition: String,
    pub sort: String,
}

impl StoreKey {
    pub fn new(partition: impl Into<String>, sort: impl Into<String>) -> Self {
        Self {
            partition: partition.into(),
            sort: sort.into(),
        }
    }
}

pub type Entry = (StoreKey, Vec<u8>);

#[derive(Debug)]
pub enum StorageError {
    Io(io::Error),
    /// A stored value could not be decoded.
    Corrupt(String),
    /// The store's background writer is gone.
    Unavailable(String),
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageError::Io(e) => write!(f, "storage I/O error: {e}"),
            StorageError::Corrupt(msg) => write!(f, "corrupt record: {msg}"),
            StorageError::Unavailable(msg) => write!(f, "storage unavailable: {msg}"),
        }
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StorageError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for StorageError {
    fn from(e: io::Error) -> Self {
        StorageError::Io(e)
    }
}

/// A sorted key-value store with partition-scoped prefix scans.
///
/// Writes are unconditional (last writer wins). Implementations must make a
/// completed `put`/`delete` visible to every later `scan_prefix`.
#[async_trait]
pub trait SortedStore: Send + Sync {
    async fn put(&self, key: StoreKey, value: Vec<u8>) -> Result<(), StorageError>;

    /// Remove `key`. Returns whether it existed.
    async fn delete(&self, key: &StoreKey) -> Result<bool, StorageError>;

    /// All entries of `partition` whose sort component starts with
    /// `sort_prefix`, in ascending key order.
    async fn scan_prefix(&self, partition: &str, sort_prefix: &str) -> Result<Vec<Entry>, StorageError>;
}

/// Range scan shared by the map-backed stores: seek to the first key at or
/// after `(partition, sort_prefix)` and stop at the first key outside it.
pub(crate) fn scan_map(map: &BTreeMap<StoreKey, Vec<u8>>, partition: &str, sort_prefix: &str) -> Vec<Entry> {
    let from = StoreKey::new(partition, sort_prefix);
    map.range((Bound::Included(from), Bound::Unbounded))
        .take_while(|(k, _)| k.partition == partition && k.sort.starts_with(sort_prefix))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}
