use std::collections::BTreeMap;
use std::io;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot, RwLock};

use super::wal::{LogRecord, Wal};
use super::{scan_map, Entry, SortedStore, StorageError, StoreKey};

type SharedMap = Arc<RwLock<BTreeMap<StoreKey, Vec<u8>>>>;

// ── Group-commit writer channel ──────────────────────────

enum WalCommand {
    Append {
        record: LogRecord,
        /// `true` if the key existed before this record was applied.
        response: oneshot::Sender<io::Result<bool>>,
    },
    Compact {
        response: oneshot::Sender<io::Result<usize>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Background task that owns the log and is the only writer of the map.
/// 1. Block until the first Append arrives.
/// 2. Buffer it (no fsync).
/// 3. Drain all immediately available Appends (the batch window).
/// 4. Single flush_sync for the whole batch.
/// 5. Apply the batch to the map in log order, then answer every sender.
async fn wal_writer_loop(mut wal: Wal, map: SharedMap, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WalCommand::Append { record, response } => {
                let mut batch = vec![(record, response)];
                let mut deferred = None;
                loop {
                    match rx.try_recv() {
                        Ok(WalCommand::Append { record, response }) => batch.push((record, response)),
                        Ok(other) => {
                            // Commit what we have before handling anything else.
                            deferred = Some(other);
                            break;
                        }
                        Err(_) => break,
                    }
                }
                commit_batch(&mut wal, &map, batch).await;
                if let Some(other) = deferred {
                    handle_non_append(&mut wal, &map, other).await;
                }
            }
            other => handle_non_append(&mut wal, &map, other).await,
        }
    }
    tracing::debug!("log writer for {} stopped", wal.path().display());
}

async fn commit_batch(
    wal: &mut Wal,
    map: &SharedMap,
    batch: Vec<(LogRecord, oneshot::Sender<io::Result<bool>>)>,
) {
    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let flush_start = std::time::Instant::now();
    let result = flush_batch(wal, &batch);
    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
        .record(flush_start.elapsed().as_secs_f64());

    if let Err(e) = result {
        tracing::error!("log flush failed for batch of {}: {e}", batch.len());
        for (_, tx) in batch {
            let _ = tx.send(Err(io::Error::new(e.kind(), e.to_string())));
        }
        return;
    }

    let mut guard = map.write().await;
    for (record, tx) in batch {
        let existed = match record {
            LogRecord::Put { key, value } => guard.insert(key, value).is_some(),
            LogRecord::Delete { key } => guard.remove(&key).is_some(),
        };
        let _ = tx.send(Ok(existed));
    }
}

/// Buffer and fsync the whole batch. On failure the log has already
/// discarded the batch, so nothing of it reaches disk.
fn flush_batch(wal: &mut Wal, batch: &[(LogRecord, oneshot::Sender<io::Result<bool>>)]) -> io::Result<()> {
    for (record, _) in batch {
        wal.append_buffered(record)?;
    }
    wal.flush_sync()
}

async fn handle_non_append(wal: &mut Wal, map: &SharedMap, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { response } => {
            let snapshot: Vec<LogRecord> = map
                .read()
                .await
                .iter()
                .map(|(key, value)| LogRecord::Put {
                    key: key.clone(),
                    value: value.clone(),
                })
                .collect();
            let live = snapshot.len();
            let result = Wal::write_compact_file(wal.path(), &snapshot)
                .and_then(|()| wal.swap_compact_file())
                .map(|()| live);
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!(),
    }
}

/// Ordered map made durable by a write-ahead log.
///
/// Reads are served from memory. Writes go through a single background task
/// that group-commits them to the log and applies them to the map before
/// acknowledging, so an acknowledged write is visible to every later scan.
pub struct WalStore {
    map: SharedMap,
    tx: mpsc::Sender<WalCommand>,
}

impl WalStore {
    /// Replay the log at `path` (if any) and start the writer task.
    /// Must be called from inside a tokio runtime.
    pub fn open(path: &Path) -> io::Result<Self> {
        let records = Wal::replay(path)?;
        let replayed = records.len();
        let mut map = BTreeMap::new();
        for record in records {
            match record {
                LogRecord::Put { key, value } => {
                    map.insert(key, value);
                }
                LogRecord::Delete { key } => {
                    map.remove(&key);
                }
            }
        }
        tracing::info!("replayed {replayed} log records from {} ({} live keys)", path.display(), map.len());

        let wal = Wal::open(path)?;
        let map = Arc::new(RwLock::new(map));
        let (tx, rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, map.clone(), rx));
        Ok(Self { map, tx })
    }

    async fn append(&self, record: LogRecord) -> Result<bool, StorageError> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(WalCommand::Append { record, response: tx })
            .await
            .map_err(|_| StorageError::Unavailable("log writer shut down".into()))?;
        rx.await
            .map_err(|_| StorageError::Unavailable("log writer dropped response".into()))?
            .map_err(StorageError::Io)
    }

    /// Rewrite the log as one Put per live key. Returns the number of keys kept.
    pub async fn compact(&self) -> Result<usize, StorageError> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(WalCommand::Compact { response: tx })
            .await
            .map_err(|_| StorageError::Unavailable("log writer shut down".into()))?;
        rx.await
            .map_err(|_| StorageError::Unavailable("log writer dropped response".into()))?
            .map_err(StorageError::Io)
    }

    pub async fn appends_since_compact(&self) -> Result<u64, StorageError> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .map_err(|_| StorageError::Unavailable("log writer shut down".into()))?;
        rx.await
            .map_err(|_| StorageError::Unavailable("log writer dropped response".into()))
    }

    pub async fn len(&self) -> usize {
        self.map.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.map.read().await.is_empty()
    }
}

#[async_trait]
impl SortedStore for WalStore {
    async fn put(&self, key: StoreKey, value: Vec<u8>) -> Result<(), StorageError> {
        self.append(LogRecord::Put { key, value }).await.map(|_| ())
    }

    async fn delete(&self, key: &StoreKey) -> Result<bool, StorageError> {
        self.append(LogRecord::Delete { key: key.clone() }).await
    }

    async fn scan_prefix(&self, partition: &str, sort_prefix: &str) -> Result<Vec<Entry>, StorageError> {
        Ok(scan_map(&*self.map.read().await, partition, sort_prefix))
    }
}
