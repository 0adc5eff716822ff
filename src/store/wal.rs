use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::StoreKey;

/// One mutation of the sorted store. This is the log record format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogRecord {
    Put { key: StoreKey, value: Vec<u8> },
    Delete { key: StoreKey },
}

/// Encode a single record to [len][bincode][crc32] format.
fn encode_record(writer: &mut impl Write, record: &LogRecord) -> io::Result<()> {
    let payload =
        bincode::serialize(record).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    let len = payload.len() as u32;
    let crc = crc32fast::hash(&payload);
    writer.write_all(&len.to_le_bytes())?;
    writer.write_all(&payload)?;
    writer.write_all(&crc.to_le_bytes())?;
    Ok(())
}

/// Append-only write-ahead log of store mutations.
///
/// Format per entry: `[u32: len][bincode: LogRecord][u32: crc32]`
/// - `len` is the byte length of the bincode payload (not including the CRC).
/// - A truncated last entry (crash mid-write) is discarded on replay via the
///   length prefix and CRC check.
///
/// Records buffered since the last successful `flush_sync` are pending. A
/// failed append or flush discards them and cuts the file back to
/// `committed_len`, so a batch reported as failed never reaches a replay.
/// If that cut itself fails the writer is dropped and every later append
/// errors.
pub struct Wal {
    writer: Option<BufWriter<File>>,
    path: PathBuf,
    committed_len: u64,
    pending_appends: u64,
    appends_since_compact: u64,
    #[cfg(test)]
    fail_next_flush: Option<usize>,
}

fn log_unavailable(path: &Path) -> io::Error {
    io::Error::new(
        io::ErrorKind::BrokenPipe,
        format!("log {} is unavailable after a failed rollback", path.display()),
    )
}

impl Wal {
    /// Open (or create) the log file at `path`.
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let committed_len = file.metadata()?.len();
        Ok(Self {
            writer: Some(BufWriter::new(file)),
            path: path.to_path_buf(),
            committed_len,
            pending_appends: 0,
            appends_since_compact: 0,
            #[cfg(test)]
            fail_next_flush: None,
        })
    }

    /// Append and fsync one record. Tests only; the store batches with
    /// `append_buffered` + `flush_sync`.
    #[cfg(test)]
    pub fn append(&mut self, record: &LogRecord) -> io::Result<()> {
        self.append_buffered(record)?;
        self.flush_sync()
    }

    /// Buffer one record without flushing. Call `flush_sync()` after the batch.
    /// On error the whole pending batch is discarded.
    pub fn append_buffered(&mut self, record: &LogRecord) -> io::Result<()> {
        let writer = self.writer.as_mut().ok_or_else(|| log_unavailable(&self.path))?;
        if let Err(e) = encode_record(writer, record) {
            self.discard_pending();
            return Err(e);
        }
        self.pending_appends += 1;
        Ok(())
    }

    /// Flush the BufWriter and fsync the underlying file. On error the
    /// pending batch is discarded.
    pub fn flush_sync(&mut self) -> io::Result<()> {
        match self.try_flush() {
            Ok(len) => {
                self.committed_len = len;
                self.appends_since_compact += self.pending_appends;
                self.pending_appends = 0;
                Ok(())
            }
            Err(e) => {
                self.discard_pending();
                Err(e)
            }
        }
    }

    fn try_flush(&mut self) -> io::Result<u64> {
        #[cfg(test)]
        if let Some(written) = self.fail_next_flush.take() {
            // Part of the buffer reaches the file, then the device fills up.
            if let Some(writer) = self.writer.as_mut() {
                let head = writer.buffer()[..written.min(writer.buffer().len())].to_vec();
                writer.get_mut().write_all(&head)?;
            }
            return Err(io::Error::new(io::ErrorKind::StorageFull, "no space left on device"));
        }
        let writer = self.writer.as_mut().ok_or_else(|| log_unavailable(&self.path))?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
        Ok(writer.get_ref().metadata()?.len())
    }

    /// Drop buffered bytes without writing them and truncate the file to the
    /// last committed length.
    fn discard_pending(&mut self) {
        self.pending_appends = 0;
        let Some(writer) = self.writer.take() else { return };
        let (file, _unwritten) = writer.into_parts();
        match file.set_len(self.committed_len) {
            Ok(()) => self.writer = Some(BufWriter::new(file)),
            Err(e) => tracing::error!(
                "log {}: rollback to {} bytes failed, refusing further appends: {e}",
                self.path.display(),
                self.committed_len
            ),
        }
    }

    /// Make the next `flush_sync` write `written` buffered bytes and then fail.
    #[cfg(test)]
    pub fn fail_next_flush(&mut self, written: usize) {
        self.fail_next_flush = Some(written);
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write a snapshot to `<path>.wal.tmp` and fsync it.
    pub fn write_compact_file(path: &Path, records: &[LogRecord]) -> io::Result<()> {
        let tmp_path = path.with_extension("wal.tmp");
        let file = File::create(&tmp_path)?;
        let mut writer = BufWriter::new(file);
        for record in records {
            encode_record(&mut writer, record)?;
        }
        writer.flush()?;
        writer.get_ref().sync_all()?;
        Ok(())
    }

    /// Rename the snapshot over the log and reopen it for appends.
    pub fn swap_compact_file(&mut self) -> io::Result<()> {
        let tmp_path = self.path.with_extension("wal.tmp");
        fs::rename(&tmp_path, &self.path)?;
        let file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        let committed_len = file.metadata()?.len();
        if let Some(old) = self.writer.replace(BufWriter::new(file)) {
            let _ = old.into_parts();
        }
        self.committed_len = committed_len;
        self.pending_appends = 0;
        self.appends_since_compact = 0;
        Ok(())
    }

    #[cfg(test)]
    pub fn compact(&mut self, records: &[LogRecord]) -> io::Result<()> {
        Self::write_compact_file(&self.path, records)?;
        self.swap_compact_file()
    }

    pub fn appends_since_compact(&self) -> u64 {
        self.appends_since_compact
    }

    /// Replay the log from disk, returning all valid records.
    /// Truncated or corrupt trailing entries end the replay and are cut off
    /// the file, so later appends stay reachable.
    pub fn replay(path: &Path) -> io::Result<Vec<LogRecord>> {
        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        let file_len = file.metadata()?.len();
        let mut reader = BufReader::new(file);
        let mut records = Vec::new();
        let mut valid_len = 0u64;

        loop {
            let mut len_buf = [0u8; 4];
            match reader.read_exact(&mut len_buf) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e),
            }
            let len = u32::from_le_bytes(len_buf) as usize;
            if valid_len + 8 + len as u64 > file_len {
                break; // truncated
            }

            let mut payload = vec![0u8; len];
            match reader.read_exact(&mut payload) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break, // truncated
                Err(e) => return Err(e),
            }

            let mut crc_buf = [0u8; 4];
            match reader.read_exact(&mut crc_buf) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break, // truncated
                Err(e) => return Err(e),
            }
            if u32::from_le_bytes(crc_buf) != crc32fast::hash(&payload) {
                tracing::warn!("log {}: CRC mismatch after {} records, stopping replay", path.display(), records.len());
                break;
            }

            match bincode::deserialize::<LogRecord>(&payload) {
                Ok(record) => records.push(record),
                Err(_) => break,
            }
            valid_len += 8 + len as u64;
        }

        if valid_len < file_len {
            tracing::warn!(
                "log {}: dropping {} trailing bytes",
                path.display(),
                file_len - valid_len
            );
            OpenOptions::new().write(true).open(path)?.set_len(valid_len)?;
        }

        Ok(records)
    }
}
