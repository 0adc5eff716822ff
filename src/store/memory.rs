use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{scan_map, Entry, SortedStore, StorageError, StoreKey};

/// Volatile ordered map. Backs tests and `DAYBLOCKS_STORE=memory`.
#[derive(Default)]
pub struct MemoryStore {
    map: RwLock<BTreeMap<StoreKey, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.map.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.map.read().await.is_empty()
    }
}

#[async_trait]
impl SortedStore for MemoryStore {
    async fn put(&self, key: StoreKey, value: Vec<u8>) -> Result<(), StorageError> {
        self.map.write().await.insert(key, value);
        Ok(())
    }

    async fn delete(&self, key: &StoreKey) -> Result<bool, StorageError> {
        Ok(self.map.write().await.remove(key).is_some())
    }

    async fn scan_prefix(&self, partition: &str, sort_prefix: &str) -> Result<Vec<Entry>, StorageError> {
        Ok(scan_map(&*self.map.read().await, partition, sort_prefix))
    }
}
