//! Append-only transaction log.
//!
//! Every write is a frame: `len u32 | MessagePack(LogEntry) | crc32 u32`.
//! The live content of the store is obtained by replaying the frames in
//! order; deletes are frames too, so dead bytes accumulate until compaction.

use crate::error::{Result, StoreError};
use crate::types::{Transaction, TransactionId};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Magic bytes for the transaction log.
const LOG_MAGIC: &[u8; 4] = b"FTX\0";

/// Current log format version.
const LOG_VERSION: u8 = 1;

/// Header size (magic + version).
pub(crate) const HEADER_SIZE: u64 = 5;

/// Frame bytes besides the payload (length + checksum).
const FRAME_OVERHEAD: u64 = 8;

/// Sanity bound on a single frame.
const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// A single log entry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum LogEntry {
    /// Insert or replace the record with this id.
    Put(Transaction),
    /// Remove the record with this id.
    Delete(TransactionId),
}

/// Append-only transaction log.
pub struct RecordLog {
    /// Path to the log file.
    path: PathBuf,

    /// Log file handle.
    file: RwLock<File>,

    /// Current file size (for appending).
    file_size: RwLock<u64>,

    /// Number of writes since last sync.
    writes_since_sync: RwLock<u64>,

    /// Sync every N writes.
    sync_interval: u64,
}

impl RecordLog {
    /// Default sync interval.
    pub const DEFAULT_SYNC_INTERVAL: u64 = 32;

    /// Open or create a log with the default sync interval.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_sync_interval(path, Self::DEFAULT_SYNC_INTERVAL)
    }

    /// Open or create a log. A sync interval of 0 or 1 syncs every write.
    pub fn open_with_sync_interval(path: impl AsRef<Path>, sync_interval: u64) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;

        if file.metadata()?.len() == 0 {
            Self::write_header(&mut file)?;
            file.sync_all()?;
        } else {
            Self::verify_header(&mut file)?;
        }

        let file_size = file.metadata()?.len();

        Ok(Self {
            path,
            file: RwLock::new(file),
            file_size: RwLock::new(file_size),
            writes_since_sync: RwLock::new(0),
            sync_interval: sync_interval.max(1),
        })
    }

    /// Append an entry. Returns the offset of its frame.
    pub fn append(&self, entry: &LogEntry) -> Result<u64> {
        let encoded = rmp_serde::to_vec_named(entry)?;

        let mut file = self.file.write();
        let offset = *self.file_size.read();
        file.seek(SeekFrom::Start(offset))?;

        Self::write_frame(&mut *file, &encoded)?;

        let new_size = file.stream_position()?;
        *self.file_size.write() = new_size;

        let mut writes = self.writes_since_sync.write();
        *writes += 1;
        if *writes >= self.sync_interval {
            file.sync_all()?;
            *writes = 0;
        }

        Ok(offset)
    }

    /// Read the entry whose frame starts at `offset`.
    pub fn read_at(&self, offset: u64) -> Result<LogEntry> {
        if offset < HEADER_SIZE || offset >= self.size() {
            return Err(StoreError::Corruption(format!(
                "No log entry at offset {}",
                offset
            )));
        }

        let mut file = self.file.write();
        file.seek(SeekFrom::Start(offset))?;
        let (entry, _) = Self::read_frame(&mut *file)?;
        Ok(entry)
    }

    /// Read every entry in order with its offset.
    ///
    /// A frame cut short at the end of the file (interrupted write) is
    /// truncated away. A checksum mismatch is an error.
    pub fn replay(&self) -> Result<Vec<(u64, LogEntry)>> {
        let mut file = self.file.write();
        let end = *self.file_size.read();
        file.seek(SeekFrom::Start(HEADER_SIZE))?;

        let mut entries = Vec::new();
        let mut offset = HEADER_SIZE;
        let mut torn_at = None;

        {
            let mut reader = BufReader::new(&mut *file);
            while offset < end {
                match Self::read_frame(&mut reader) {
                    Ok((entry, len)) => {
                        entries.push((offset, entry));
                        offset += len;
                    }
                    Err(StoreError::Io(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                        torn_at = Some(offset);
                        break;
                    }
                    Err(e) => return Err(e),
                }
            }
        }

        if let Some(offset) = torn_at {
            warn!(
                path = %self.path.display(),
                offset,
                dropped_bytes = end - offset,
                "Truncating torn frame at end of transaction log"
            );
            file.set_len(offset)?;
            file.sync_all()?;
            *self.file_size.write() = offset;
        }

        Ok(entries)
    }

    /// Drop every entry, keeping the header.
    pub fn reset(&self) -> Result<()> {
        let file = self.file.write();
        file.set_len(HEADER_SIZE)?;
        file.sync_all()?;
        *self.file_size.write() = HEADER_SIZE;
        *self.writes_since_sync.write() = 0;
        Ok(())
    }

    /// Replace the log content with `entries`.
    ///
    /// The new log is written beside the old one and renamed over it, so an
    /// interruption leaves the previous log intact. The handle to the new
    /// file is opened before the rename and only swapped in once the rename
    /// succeeds. Returns the new offsets, one per entry.
    pub fn rewrite(&self, entries: &[LogEntry]) -> Result<Vec<u64>> {
        let mut file = self.file.write();
        let tmp_path = self.path.with_extension("log.compact");

        let mut tmp = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&tmp_path)?;

        let offsets = match Self::write_entries(&mut tmp, entries) {
            Ok(offsets) => offsets,
            Err(e) => {
                let _ = fs::remove_file(&tmp_path);
                return Err(e);
            }
        };

        if let Err(e) = fs::rename(&tmp_path, &self.path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(e.into());
        }

        let new_size = tmp.metadata()?.len();
        *file = tmp;
        *self.file_size.write() = new_size;
        *self.writes_since_sync.write() = 0;

        Ok(offsets)
    }

    /// Write a header and `entries` into a fresh file and sync it.
    fn write_entries(file: &mut File, entries: &[LogEntry]) -> Result<Vec<u64>> {
        Self::write_header(file)?;

        let mut offsets = Vec::with_capacity(entries.len());
        let mut offset = HEADER_SIZE;
        for entry in entries {
            let encoded = rmp_serde::to_vec_named(entry)?;
            Self::write_frame(file, &encoded)?;
            offsets.push(offset);
            offset += encoded.len() as u64 + FRAME_OVERHEAD;
        }
        file.sync_all()?;
        Ok(offsets)
    }

    /// Force sync all pending writes to disk.
    pub fn sync(&self) -> Result<()> {
        let file = self.file.write();
        file.sync_all()?;
        *self.writes_since_sync.write() = 0;
        Ok(())
    }

    /// Current file size.
    pub fn size(&self) -> u64 {
        *self.file_size.read()
    }

    /// Path to the log file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_header(file: &mut File) -> Result<()> {
        file.seek(SeekFrom::Start(0))?;
        file.write_all(LOG_MAGIC)?;
        file.write_all(&[LOG_VERSION])?;
        Ok(())
    }

    fn verify_header(file: &mut File) -> Result<()> {
        file.seek(SeekFrom::Start(0))?;

        let mut magic = [0u8; 4];
        file.read_exact(&mut magic)
            .map_err(|_| StoreError::InvalidFormat("Truncated log header".into()))?;
        if &magic != LOG_MAGIC {
            return Err(StoreError::InvalidFormat("Invalid log magic".into()));
        }

        let mut version = [0u8; 1];
        file.read_exact(&mut version)
            .map_err(|_| StoreError::InvalidFormat("Truncated log header".into()))?;
        if version[0] != LOG_VERSION {
            return Err(StoreError::InvalidFormat(format!(
                "Unsupported log version: {}",
                version[0]
            )));
        }

        Ok(())
    }

    fn write_frame(writer: &mut impl Write, encoded: &[u8]) -> Result<()> {
        writer.write_all(&(encoded.len() as u32).to_le_bytes())?;
        writer.write_all(encoded)?;
        writer.write_all(&crc32fast::hash(encoded).to_le_bytes())?;
        Ok(())
    }

    /// Read one frame. Returns the entry and the frame length in bytes.
    fn read_frame(reader: &mut impl Read) -> Result<(LogEntry, u64)> {
        let mut len_bytes = [0u8; 4];
        reader.read_exact(&mut len_bytes)?;
        let len = u32::from_le_bytes(len_bytes) as usize;

        if len > MAX_FRAME_SIZE {
            return Err(StoreError::Corruption(format!(
                "Log frame too large: {} bytes",
                len
            )));
        }

        let mut encoded = vec![0u8; len];
        reader.read_exact(&mut encoded)?;

        let mut checksum_bytes = [0u8; 4];
        reader.read_exact(&mut checksum_bytes)?;
        let stored = u32::from_le_bytes(checksum_bytes);
        let computed = crc32fast::hash(&encoded);

        if stored != computed {
            return Err(StoreError::ChecksumMismatch {
                expected: stored,
                got: computed,
            });
        }

        let entry = rmp_serde::from_slice(&encoded)?;
        Ok((entry, len as u64 + FRAME_OVERHEAD))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Category, TransactionInput};
    use chrono::Utc;
    use tempfile::TempDir;

    fn put(id: &str, amount: f64) -> LogEntry {
        let now = Utc::now();
        let input = TransactionInput::expense(
            id,
            Category::new("Transport", "directions_car"),
            amount,
            "2024-01-20",
        );
        LogEntry::Put(Transaction::from_input(input, now, now))
    }

    #[test]
    fn test_append_and_read() {
        let dir = TempDir::new().unwrap();
        let log = RecordLog::open(dir.path().join("tx.log")).unwrap();

        let entry = put("t1", 30.0);
        let offset = log.append(&entry).unwrap();

        assert_eq!(offset, HEADER_SIZE);
        assert_eq!(log.read_at(offset).unwrap(), entry);
    }

    #[test]
    fn test_read_outside_log() {
        let dir = TempDir::new().unwrap();
        let log = RecordLog::open(dir.path().join("tx.log")).unwrap();

        assert!(matches!(log.read_at(0), Err(StoreError::Corruption(_))));
        assert!(matches!(log.read_at(1000), Err(StoreError::Corruption(_))));
    }

    #[test]
    fn test_replay_after_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tx.log");

        {
            let log = RecordLog::open(&path).unwrap();
            log.append(&put("t1", 1.0)).unwrap();
            log.append(&put("t2", 2.0)).unwrap();
            log.append(&LogEntry::Delete(TransactionId::from("t1")))
                .unwrap();
            log.sync().unwrap();
        }

        let log = RecordLog::open(&path).unwrap();
        let entries = log.replay().unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].0, HEADER_SIZE);
        assert!(matches!(entries[2].1, LogEntry::Delete(ref id) if id.as_str() == "t1"));
    }

    #[test]
    fn test_torn_tail_is_truncated() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tx.log");

        let good_size = {
            let log = RecordLog::open(&path).unwrap();
            log.append(&put("t1", 1.0)).unwrap();
            log.sync().unwrap();
            log.size()
        };

        // Simulate a crash halfway through the next frame
        {
            let mut file = OpenOptions::new().append(true).open(&path).unwrap();
            file.write_all(&100u32.to_le_bytes()).unwrap();
            file.write_all(b"partial").unwrap();
        }

        let log = RecordLog::open(&path).unwrap();
        let entries = log.replay().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(log.size(), good_size);
        assert_eq!(fs::metadata(&path).unwrap().len(), good_size);

        // Appends continue after the good prefix
        let offset = log.append(&put("t2", 2.0)).unwrap();
        assert_eq!(offset, good_size);
    }

    #[test]
    fn test_checksum_mismatch_detected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tx.log");

        {
            let log = RecordLog::open(&path).unwrap();
            log.append(&put("t1", 1.0)).unwrap();
            log.sync().unwrap();
        }

        // Flip a payload byte
        {
            let mut file = OpenOptions::new().read(true).write(true).open(&path).unwrap();
            file.seek(SeekFrom::Start(HEADER_SIZE + 6)).unwrap();
            let mut byte = [0u8; 1];
            file.read_exact(&mut byte).unwrap();
            file.seek(SeekFrom::Start(HEADER_SIZE + 6)).unwrap();
            file.write_all(&[byte[0] ^ 0xff]).unwrap();
        }

        let log = RecordLog::open(&path).unwrap();
        assert!(matches!(
            log.replay(),
            Err(StoreError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_invalid_header_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tx.log");
        fs::write(&path, b"garbage").unwrap();

        assert!(matches!(
            RecordLog::open(&path),
            Err(StoreError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_reset() {
        let dir = TempDir::new().unwrap();
        let log = RecordLog::open(dir.path().join("tx.log")).unwrap();

        log.append(&put("t1", 1.0)).unwrap();
        log.reset().unwrap();

        assert_eq!(log.size(), HEADER_SIZE);
        assert!(log.replay().unwrap().is_empty());
    }

    #[test]
    fn test_rewrite_keeps_only_given_entries() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tx.log");
        let log = RecordLog::open(&path).unwrap();

        for i in 0..5 {
            log.append(&put(&format!("t{}", i), i as f64)).unwrap();
        }
        let before = log.size();

        let kept = vec![put("t3", 3.0), put("t4", 4.0)];
        let offsets = log.rewrite(&kept).unwrap();

        assert_eq!(offsets.len(), 2);
        assert!(log.size() < before);
        assert_eq!(log.read_at(offsets[1]).unwrap(), kept[1]);

        let replayed: Vec<_> = log.replay().unwrap().into_iter().map(|(_, e)| e).collect();
        assert_eq!(replayed, kept);
        assert!(!path.with_extension("log.compact").exists());
    }

    #[test]
    fn test_append_after_rewrite_reaches_renamed_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tx.log");

        {
            let log = RecordLog::open(&path).unwrap();
            log.append(&put("t1", 1.0)).unwrap();
            log.append(&put("t2", 2.0)).unwrap();

            log.rewrite(&[put("t2", 2.0)]).unwrap();
            let appended = put("t3", 3.0);
            let offset = log.append(&appended).unwrap();
            assert_eq!(log.read_at(offset).unwrap(), appended);
            log.sync().unwrap();
        }

        let log = RecordLog::open(&path).unwrap();
        let ids: Vec<String> = log
            .replay()
            .unwrap()
            .into_iter()
            .map(|(_, entry)| match entry {
                LogEntry::Put(tx) => tx.id.to_string(),
                LogEntry::Delete(id) => id.to_string(),
            })
            .collect();
        assert_eq!(ids, vec!["t2", "t3"]);
        assert_eq!(log.size(), std::fs::metadata(&path).unwrap().len());
    }
}
