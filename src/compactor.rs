use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::store::{StorageError, WalStore};

/// Compact once `threshold` appends have accumulated. Returns the number of
/// live keys kept, or `None` if below threshold.
pub async fn compact_if_needed(store: &WalStore, threshold: u64) -> Result<Option<usize>, StorageError> {
    let appends = store.appends_since_compact().await?;
    if appends < threshold {
        return Ok(None);
    }
    let live = store.compact().await?;
    metrics::counter!(crate::observability::COMPACTIONS_TOTAL).increment(1);
    info!("compacted log: {appends} appends -> {live} live keys");
    Ok(Some(live))
}

/// Background task that keeps the log from growing without bound.
pub async fn run_compactor(store: Arc<WalStore>, threshold: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(30));
    loop {
        interval.tick().await;
        match compact_if_needed(&store, threshold).await {
            Ok(_) => {}
            Err(StorageError::Unavailable(e)) => {
                debug!("compactor stopping: {e}");
                return;
            }
            Err(e) => warn!("compaction failed: {e}"),
        }
    }
}
