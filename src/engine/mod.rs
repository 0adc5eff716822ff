mod conflict;
mod error;

pub use conflict::{check_no_overlap, Conflict};
pub use error::EngineError;

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, error, info, warn};
use ulid::Ulid;

use crate::blocks::BlockStore;
use crate::model::*;
use crate::store::SortedStore;

use conflict::now_utc;

/// Serializes writers of one Day Bucket. Dropping it releases the bucket and
/// prunes the gate entry if nobody else is waiting on it.
struct BucketGate<'a> {
    gates: &'a DashMap<BucketKey, Arc<Mutex<()>>>,
    bucket: BucketKey,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for BucketGate<'_> {
    fn drop(&mut self) {
        self.guard.take();
        self.gates
            .remove_if(&self.bucket, |_, gate| Arc::strong_count(gate) == 1);
    }
}

/// Runs list / save / delete against an injected sorted store.
///
/// Holds no block state. The only shared state is the per-bucket write gate,
/// held from the pre-write read through the post-write re-read so that two
/// overlapping saves into one bucket cannot both pass the overlap check.
pub struct Engine {
    blocks: BlockStore,
    gates: DashMap<BucketKey, Arc<Mutex<()>>>,
}

impl Engine {
    pub fn new(store: Arc<dyn SortedStore>) -> Self {
        Self {
            blocks: BlockStore::new(store),
            gates: DashMap::new(),
        }
    }

    async fn lock_bucket(&self, bucket: &BucketKey) -> BucketGate<'_> {
        let gate = self
            .gates
            .entry(bucket.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .value()
            .clone();
        let guard = gate.lock_owned().await;
        BucketGate {
            gates: &self.gates,
            bucket: bucket.clone(),
            guard: Some(guard),
        }
    }

    /// Number of buckets with a live write gate.
    pub fn active_gates(&self) -> usize {
        self.gates.len()
    }

    pub async fn list(&self, cmd: &ListCommand) -> Result<Vec<Block>, EngineError> {
        let blocks = self.blocks.load_day(&cmd.bucket).await.inspect_err(|e| {
            error!("list {}: {e}", cmd.bucket);
        })?;
        debug!("list {}: {} blocks", cmd.bucket, blocks.len());
        Ok(blocks)
    }

    /// Check the candidate against a fresh read of its bucket, persist it,
    /// and return the bucket as stored afterwards.
    pub async fn save(&self, cmd: SaveCommand) -> Result<Vec<Block>, EngineError> {
        let _gate = self.lock_bucket(&cmd.bucket).await;

        let existing = self.blocks.load_day(&cmd.bucket).await.inspect_err(|e| {
            error!("save {}: reading bucket: {e}", cmd.bucket);
        })?;
        if let Err(conflict) = check_no_overlap(&cmd.span(), &existing) {
            warn!(
                "save {}: {}-{} rejected, overlaps {} ({}-{})",
                cmd.bucket, cmd.start, cmd.end, conflict.block_id, conflict.start, conflict.end
            );
            return Err(conflict.into());
        }

        let block = Block {
            block_id: Ulid::new(),
            date: cmd.bucket.date,
            start: cmd.start,
            end: cmd.end,
            label: cmd.label,
            created_at: now_utc(),
        };
        self.blocks.put(&cmd.bucket.user_id, &block).await.inspect_err(|e| {
            error!("save {}: writing {}: {e}", cmd.bucket, block.block_id);
        })?;
        info!("saved block {} {} ({})", block.block_id, cmd.bucket, block.range_label());

        Ok(self.blocks.load_day(&cmd.bucket).await?)
    }

    pub async fn delete(&self, cmd: &DeleteCommand) -> Result<Vec<Block>, EngineError> {
        let _gate = self.lock_bucket(&cmd.bucket).await;

        let removed = self
            .blocks
            .delete_by_block_id(&cmd.bucket, &cmd.block_id)
            .await
            .inspect_err(|e| error!("delete {} {}: {e}", cmd.bucket, cmd.block_id))?;
        let Some(block) = removed else {
            debug!("delete {}: no block {}", cmd.bucket, cmd.block_id);
            return Err(EngineError::NotFound(cmd.block_id.clone()));
        };
        info!("deleted block {} {} ({})", block.block_id, cmd.bucket, block.range_label());

        Ok(self.blocks.load_day(&cmd.bucket).await?)
    }
}
