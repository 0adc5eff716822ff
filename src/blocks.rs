use std::sync::Arc;

use chrono::NaiveDate;
use ulid::Ulid;

use crate::model::*;
use crate::store::{SortedStore, StorageError, StoreKey};

/// Sort-key prefix of block entries. Other entity types may share a partition
/// under different prefixes; day scans never see them.
pub const BLOCK_PREFIX: &str = "BLOCK#";

/// `USER#{userId}#DATE#{YYYY-MM-DD}`
pub fn partition_key(user_id: &str, date: NaiveDate) -> String {
    format!("USER#{user_id}#DATE#{}", date.format("%Y-%m-%d"))
}

/// `BLOCK#{HH:MM}#{blockId}`. The fixed-width start sorts chronologically;
/// the id keeps two blocks with the same start on distinct keys.
pub fn sort_key(start: TimeOfDay, block_id: Ulid) -> String {
    format!("{BLOCK_PREFIX}{start}#{block_id}")
}

pub fn block_key(user_id: &str, block: &Block) -> StoreKey {
    StoreKey::new(partition_key(user_id, block.date), sort_key(block.start, block.block_id))
}

fn decode(key: &StoreKey, value: &[u8]) -> Result<Block, StorageError> {
    let block: Block = bincode::deserialize(value)
        .map_err(|e| StorageError::Corrupt(format!("{}/{}: {e}", key.partition, key.sort)))?;
    if block.start >= block.end {
        return Err(StorageError::Corrupt(format!(
            "{}/{}: empty or inverted range {}",
            key.partition,
            key.sort,
            block.range_label()
        )));
    }
    Ok(block)
}

fn encode(block: &Block) -> Result<Vec<u8>, StorageError> {
    bincode::serialize(block).map_err(|e| StorageError::Corrupt(format!("encode {}: {e}", block.block_id)))
}

/// Maps Day Buckets onto a sorted key-value store.
#[derive(Clone)]
pub struct BlockStore {
    store: Arc<dyn SortedStore>,
}

impl BlockStore {
    pub fn new(store: Arc<dyn SortedStore>) -> Self {
        Self { store }
    }

    /// All blocks of the bucket, ascending by start time. Empty if none.
    pub async fn load_day(&self, bucket: &BucketKey) -> Result<Vec<Block>, StorageError> {
        let partition = partition_key(&bucket.user_id, bucket.date);
        let entries = self.store.scan_prefix(&partition, BLOCK_PREFIX).await?;
        entries.iter().map(|(key, value)| decode(key, value)).collect()
    }

    /// Unconditional write of the block's key.
    pub async fn put(&self, user_id: &str, block: &Block) -> Result<(), StorageError> {
        self.store.put(block_key(user_id, block), encode(block)?).await
    }

    /// Resolve `block_id` to its full key by scanning the bucket, then delete
    /// that key. `None` if no block in the bucket carries that id.
    pub async fn delete_by_block_id(&self, bucket: &BucketKey, block_id: &str) -> Result<Option<Block>, StorageError> {
        // Not a ULID means it cannot name any stored block.
        let Ok(id) = Ulid::from_string(block_id) else {
            return Ok(None);
        };
        let suffix = format!("#{id}");
        let partition = partition_key(&bucket.user_id, bucket.date);
        let entries = self.store.scan_prefix(&partition, BLOCK_PREFIX).await?;
        let Some((key, value)) = entries.into_iter().find(|(key, _)| key.sort.ends_with(&suffix)) else {
            return Ok(None);
        };
        let block = decode(&key, &value)?;
        if !self.store.delete(&key).await? {
            // Removed between the scan and the delete.
            return Ok(None);
        }
        Ok(Some(block))
    }
}
