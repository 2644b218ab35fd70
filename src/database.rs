//! Synchronous database engine behind [`TransactionStore`](crate::TransactionStore).

use crate::error::{Result, StoreError};
use crate::records::{IndexName, IndexValue, LogEntry, RecordIndex, RecordLog};
use crate::subscriptions::SubscriptionManager;
use crate::types::{StoreStats, Transaction, TransactionId, TransactionInput};
use chrono::Utc;
use fs2::FileExt;
use lru::LruCache;
use parking_lot::{Mutex, RwLock};
use std::fs::{self, File};
use std::io::{Read, Write};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Name of the database directory.
pub const DATABASE_NAME: &str = "FinanceAppDB";

/// Name of the transactions table.
pub const TABLE_NAME: &str = "transactions";

/// Schema version. Bumped whenever the index set changes.
pub const SCHEMA_VERSION: u32 = 2;

/// Magic bytes for the database manifest.
const MANIFEST_MAGIC: &[u8; 4] = b"FTDB";

/// Store configuration.
#[derive(Clone, Debug)]
pub struct StoreConfig {
    /// Base directory; the database lives in `path/FinanceAppDB`.
    pub path: PathBuf,

    /// Decoded records kept in memory.
    pub record_cache_size: usize,

    /// Sync the log to disk every N writes.
    pub sync_interval: u64,

    /// Whether to create the database if it doesn't exist.
    pub create_if_missing: bool,
}

impl StoreConfig {
    /// Default configuration rooted at `path`.
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    /// Directory holding the database files.
    pub fn database_dir(&self) -> PathBuf {
        self.path.join(DATABASE_NAME)
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./data"),
            record_cache_size: 1024,
            sync_interval: RecordLog::DEFAULT_SYNC_INTERVAL,
            create_if_missing: true,
        }
    }
}

/// Result of a compaction pass.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompactionStats {
    pub records: usize,
    pub bytes_before: u64,
    pub bytes_after: u64,
}

/// The database engine.
///
/// Owns the lock file, the transaction log, the indexes rebuilt from it and
/// a cache of decoded records. Every write appends to the log before the
/// indexes change, so a failed write leaves the in-memory view untouched.
pub struct Database {
    /// Store configuration.
    config: StoreConfig,

    /// Database directory.
    dir: PathBuf,

    /// Lock file for exclusive access.
    _lock_file: File,

    /// Transaction log.
    log: RecordLog,

    /// Primary and secondary indexes.
    index: RecordIndex,

    /// Recently read or written records.
    cache: Mutex<LruCache<TransactionId, Transaction>>,

    /// Change feed.
    events: Arc<SubscriptionManager>,

    /// Lock for write operations to ensure atomicity.
    write_lock: Mutex<()>,

    /// Held shared by readers and exclusively while the log file is
    /// swapped or reset, so no reader pairs an old offset with a new file.
    file_swap: RwLock<()>,
}

impl Database {
    /// Open the database, creating it if configured to.
    pub fn open(config: StoreConfig, events: Arc<SubscriptionManager>) -> Result<Self> {
        let dir = config.database_dir();

        if !dir.join("MANIFEST").exists() {
            if !config.create_if_missing {
                return Err(StoreError::StoreUnavailable(format!(
                    "Database does not exist at {}",
                    dir.display()
                )));
            }
            fs::create_dir_all(&dir)?;
            Self::write_manifest(&dir, SCHEMA_VERSION)?;
            info!(path = %dir.display(), version = SCHEMA_VERSION, "Created database");
        }

        let lock_file = Self::acquire_lock(&dir)?;
        let found = Self::read_manifest(&dir)?;
        if found > SCHEMA_VERSION {
            return Err(StoreError::UnsupportedSchema {
                found,
                supported: SCHEMA_VERSION,
            });
        }

        let log = RecordLog::open_with_sync_interval(
            dir.join(format!("{}.log", TABLE_NAME)),
            config.sync_interval,
        )?;
        let index = RecordIndex::new();
        Self::rebuild_index(&log, &index)?;

        let cache_size = NonZeroUsize::new(config.record_cache_size.max(1))
            .unwrap_or(NonZeroUsize::MIN);

        let db = Self {
            config,
            dir,
            _lock_file: lock_file,
            log,
            index,
            cache: Mutex::new(LruCache::new(cache_size)),
            events,
            write_lock: Mutex::new(()),
            file_swap: RwLock::new(()),
        };

        if found < SCHEMA_VERSION {
            db.migrate(found)?;
        }

        info!(
            path = %db.dir.display(),
            records = db.index.count(),
            version = SCHEMA_VERSION,
            "Opened database"
        );

        Ok(db)
    }

    /// Replay the log into the indexes.
    fn rebuild_index(log: &RecordLog, index: &RecordIndex) -> Result<()> {
        for (offset, entry) in log.replay()? {
            match entry {
                LogEntry::Put(tx) => index.insert(&tx, offset),
                LogEntry::Delete(id) => {
                    index.remove(&id);
                }
            }
        }
        Ok(())
    }

    /// Bring an older database up to the current schema.
    ///
    /// Indexes are derived from the log on every open, so a new index set
    /// needs no data rewrite; the log is compacted (dropping dead frames
    /// from the old version) and the manifest is stamped. Running it again,
    /// or against an empty store, is harmless.
    fn migrate(&self, from: u32) -> Result<()> {
        info!(from, to = SCHEMA_VERSION, "Migrating database schema");
        self.compact()?;
        Self::write_manifest(&self.dir, SCHEMA_VERSION)?;
        Ok(())
    }

    // --- Record Operations ---

    /// Insert a new record. Fails with `DuplicateKey` if the id exists.
    pub fn insert(&self, input: TransactionInput) -> Result<Transaction> {
        let _lock = self.write_lock.lock();

        if self.index.contains(&input.id) {
            return Err(StoreError::DuplicateKey(input.id));
        }

        let now = Utc::now();
        let tx = Transaction::from_input(input, now, now);
        self.write(&tx)?;

        debug!(id = %tx.id, kind = %tx.kind, amount = tx.amount, "Inserted transaction");
        self.events.broadcast_added(&tx);
        Ok(tx)
    }

    /// Insert or replace a record, keeping the original `created_at`.
    pub fn upsert(&self, input: TransactionInput) -> Result<Transaction> {
        let _lock = self.write_lock.lock();

        let existing = self.read(&input.id)?;
        let now = Utc::now();
        let created_at = existing.as_ref().map_or(now, |tx| tx.created_at);
        let tx = Transaction::from_input(input, created_at, now);
        self.write(&tx)?;

        debug!(id = %tx.id, existed = existing.is_some(), "Upserted transaction");
        if existing.is_some() {
            self.events.broadcast_updated(&tx);
        } else {
            self.events.broadcast_added(&tx);
        }
        Ok(tx)
    }

    /// Replace an existing record. Fails with `NotFound` if absent.
    pub fn replace(&self, input: TransactionInput) -> Result<Transaction> {
        let _lock = self.write_lock.lock();

        let existing = self
            .read(&input.id)?
            .ok_or_else(|| StoreError::NotFound(input.id.clone()))?;
        let tx = Transaction::from_input(input, existing.created_at, Utc::now());
        self.write(&tx)?;

        debug!(id = %tx.id, "Replaced transaction");
        self.events.broadcast_updated(&tx);
        Ok(tx)
    }

    /// Delete a record. Returns false (and writes nothing) if it was absent.
    pub fn delete(&self, id: &TransactionId) -> Result<bool> {
        let _lock = self.write_lock.lock();

        if !self.index.contains(id) {
            return Ok(false);
        }

        self.log.append(&LogEntry::Delete(id.clone()))?;
        self.index.remove(id);
        self.cache.lock().pop(id);

        debug!(id = %id, "Deleted transaction");
        self.events.broadcast_deleted(id);
        Ok(true)
    }

    /// Get a record by id.
    pub fn get(&self, id: &TransactionId) -> Result<Option<Transaction>> {
        let _swap = self.file_swap.read();
        self.read(id)
    }

    /// Every record, in primary-key order.
    pub fn all(&self) -> Result<Vec<Transaction>> {
        let _swap = self.file_swap.read();
        self.index
            .entries()
            .into_iter()
            .map(|(id, offset)| self.load(&id, offset))
            .collect()
    }

    /// Records whose indexed field equals `value`.
    pub fn by_index(&self, name: IndexName, value: IndexValue) -> Result<Vec<Transaction>> {
        let _swap = self.file_swap.read();
        self.load_all(self.index.lookup(name, value))
    }

    /// Records whose indexed field lies in `[low, high]`, in index order.
    pub fn by_index_range(
        &self,
        name: IndexName,
        low: IndexValue,
        high: IndexValue,
    ) -> Result<Vec<Transaction>> {
        let _swap = self.file_swap.read();
        self.load_all(self.index.range(name, low, high))
    }

    /// Remove every record.
    pub fn clear(&self) -> Result<()> {
        let _lock = self.write_lock.lock();

        {
            let _swap = self.file_swap.write();
            self.log.reset()?;
            self.index.clear();
            self.cache.lock().clear();
        }

        info!(path = %self.dir.display(), "Cleared all transactions");
        self.events.broadcast_cleared();
        Ok(())
    }

    /// Number of live records.
    pub fn count(&self) -> usize {
        self.index.count()
    }

    // --- Store Operations ---

    /// Rewrite the log with only the live records.
    pub fn compact(&self) -> Result<CompactionStats> {
        let _lock = self.write_lock.lock();

        let bytes_before = self.log.size();
        let live = self.index.entries();

        let entries = live
            .iter()
            .map(|(id, offset)| self.load(id, *offset).map(LogEntry::Put))
            .collect::<Result<Vec<_>>>()?;

        {
            let _swap = self.file_swap.write();
            let offsets = self.log.rewrite(&entries)?;
            for ((id, _), offset) in live.iter().zip(offsets) {
                self.index.set_offset(id, offset);
            }
        }

        let stats = CompactionStats {
            records: entries.len(),
            bytes_before,
            bytes_after: self.log.size(),
        };
        info!(
            records = stats.records,
            bytes_before = stats.bytes_before,
            bytes_after = stats.bytes_after,
            "Compacted transaction log"
        );
        Ok(stats)
    }

    /// Get store statistics.
    pub fn stats(&self) -> StoreStats {
        StoreStats {
            record_count: self.index.count() as u64,
            log_size_bytes: self.log.size(),
            schema_version: SCHEMA_VERSION,
        }
    }

    /// Sync all data to disk.
    pub fn sync(&self) -> Result<()> {
        self.log.sync()
    }

    /// Database directory.
    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// Configuration the database was opened with.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    // --- Private Helpers ---

    /// Append a `Put` and file it. Caller holds the write lock.
    fn write(&self, tx: &Transaction) -> Result<()> {
        let offset = self.log.append(&LogEntry::Put(tx.clone()))?;
        self.index.insert(tx, offset);
        self.cache.lock().put(tx.id.clone(), tx.clone());
        Ok(())
    }

    /// Read through the index. Public readers hold `file_swap`; writers
    /// hold `write_lock`, which also keeps the file in place.
    fn read(&self, id: &TransactionId) -> Result<Option<Transaction>> {
        match self.index.offset_of(id) {
            Some(offset) => self.load(id, offset).map(Some),
            None => Ok(None),
        }
    }

    fn load_all(&self, ids: Vec<TransactionId>) -> Result<Vec<Transaction>> {
        ids.into_iter()
            .filter_map(|id| self.read(&id).transpose())
            .collect()
    }

    fn load(&self, id: &TransactionId, offset: u64) -> Result<Transaction> {
        if let Some(tx) = self.cache.lock().get(id) {
            return Ok(tx.clone());
        }

        match self.log.read_at(offset)? {
            LogEntry::Put(tx) if tx.id == *id => {
                self.cache.lock().put(id.clone(), tx.clone());
                Ok(tx)
            }
            _ => Err(StoreError::Corruption(format!(
                "Index points {} at offset {} which holds another entry",
                id, offset
            ))),
        }
    }

    fn write_manifest(dir: &Path, version: u32) -> Result<()> {
        let tmp_path = dir.join("MANIFEST.tmp");
        {
            let mut file = File::create(&tmp_path)?;
            file.write_all(MANIFEST_MAGIC)?;
            file.write_all(&version.to_le_bytes())?;
            file.sync_all()?;
        }
        fs::rename(tmp_path, dir.join("MANIFEST"))?;
        Ok(())
    }

    fn read_manifest(dir: &Path) -> Result<u32> {
        let mut file = File::open(dir.join("MANIFEST"))?;

        let mut magic = [0u8; 4];
        file.read_exact(&mut magic)
            .map_err(|_| StoreError::InvalidFormat("Truncated manifest".into()))?;
        if &magic != MANIFEST_MAGIC {
            return Err(StoreError::InvalidFormat("Invalid database magic".into()));
        }

        let mut version = [0u8; 4];
        file.read_exact(&mut version)
            .map_err(|_| StoreError::InvalidFormat("Truncated manifest".into()))?;
        Ok(u32::from_le_bytes(version))
    }

    fn acquire_lock(dir: &Path) -> Result<File> {
        let lock_file = File::create(dir.join("LOCK"))?;

        lock_file
            .try_lock_exclusive()
            .map_err(|_| StoreError::Locked)?;

        Ok(lock_file)
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        // Best-effort sync on drop
        let _ = self.sync();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Category, TransactionKind};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;
    use tempfile::TempDir;

    fn test_config(dir: &TempDir) -> StoreConfig {
        StoreConfig {
            path: dir.path().to_path_buf(),
            record_cache_size: 4,
            sync_interval: 1,
            create_if_missing: true,
        }
    }

    fn open(dir: &TempDir) -> Database {
        Database::open(test_config(dir), Arc::new(SubscriptionManager::new())).unwrap()
    }

    fn food(id: &str, amount: f64) -> TransactionInput {
        let category = Category::new("Alimentation", "shopping_cart");
        TransactionInput::expense(id, category, amount, "2024-01-10")
    }

    #[test]
    fn test_create_database() {
        let dir = TempDir::new().unwrap();
        let db = open(&dir);

        assert!(dir.path().join(DATABASE_NAME).join("MANIFEST").exists());
        assert_eq!(db.count(), 0);
        assert_eq!(db.stats().schema_version, SCHEMA_VERSION);
    }

    #[test]
    fn test_missing_database_without_create() {
        let dir = TempDir::new().unwrap();
        let config = StoreConfig {
            create_if_missing: false,
            ..test_config(&dir)
        };

        let result = Database::open(config, Arc::new(SubscriptionManager::new()));
        assert!(matches!(result, Err(StoreError::StoreUnavailable(_))));
    }

    #[test]
    fn test_insert_and_get() {
        let dir = TempDir::new().unwrap();
        let db = open(&dir);

        let tx = db.insert(food("t1", 50.0)).unwrap();
        assert_eq!(tx.created_at, tx.updated_at);

        let fetched = db.get(&TransactionId::from("t1")).unwrap().unwrap();
        assert_eq!(fetched, tx);
        assert!(db.get(&TransactionId::from("missing")).unwrap().is_none());
    }

    #[test]
    fn test_duplicate_insert_keeps_original() {
        let dir = TempDir::new().unwrap();
        let db = open(&dir);

        let original = db.insert(food("t1", 50.0)).unwrap();
        let result = db.insert(food("t1", 999.0));

        assert!(matches!(result, Err(StoreError::DuplicateKey(ref id)) if id.as_str() == "t1"));
        assert_eq!(db.get(&original.id).unwrap().unwrap(), original);
        assert_eq!(db.count(), 1);
    }

    #[test]
    fn test_upsert_preserves_created_at() {
        let dir = TempDir::new().unwrap();
        let db = open(&dir);

        let first = db.upsert(food("t1", 50.0)).unwrap();
        let second = db.upsert(food("t1", 75.0)).unwrap();

        assert_eq!(second.created_at, first.created_at);
        assert!(second.updated_at >= first.updated_at);
        assert_eq!(db.get(&first.id).unwrap().unwrap().amount, 75.0);
        assert_eq!(db.by_index(IndexName::Amount, 50.0.into()).unwrap().len(), 0);
        assert_eq!(db.by_index(IndexName::Amount, 75.0.into()).unwrap().len(), 1);
    }

    #[test]
    fn test_replace_requires_existing() {
        let dir = TempDir::new().unwrap();
        let db = open(&dir);

        let result = db.replace(food("t1", 50.0));
        assert!(matches!(result, Err(StoreError::NotFound(_))));

        db.insert(food("t1", 50.0)).unwrap();
        let replaced = db.replace(food("t1", 10.0)).unwrap();
        assert_eq!(replaced.amount, 10.0);
    }

    #[test]
    fn test_delete_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let db = open(&dir);

        db.insert(food("t1", 50.0)).unwrap();
        let size = db.stats().log_size_bytes;

        assert!(db.delete(&TransactionId::from("t1")).unwrap());
        assert!(!db.delete(&TransactionId::from("t1")).unwrap());
        assert!(db.get(&TransactionId::from("t1")).unwrap().is_none());

        // Second delete wrote nothing
        assert!(db.stats().log_size_bytes > size);
        let after_first = db.stats().log_size_bytes;
        db.delete(&TransactionId::from("t1")).unwrap();
        assert_eq!(db.stats().log_size_bytes, after_first);
    }

    #[test]
    fn test_reads_past_cache_capacity() {
        let dir = TempDir::new().unwrap();
        let db = open(&dir);

        for i in 0..20 {
            db.insert(food(&format!("t{:02}", i), i as f64)).unwrap();
        }

        let all = db.all().unwrap();
        assert_eq!(all.len(), 20);
        assert_eq!(all[0].id.as_str(), "t00");
        assert_eq!(all[19].amount, 19.0);
    }

    #[test]
    fn test_persistence() {
        let dir = TempDir::new().unwrap();

        {
            let db = open(&dir);
            db.insert(food("t1", 50.0)).unwrap();
            db.insert(food("t2", 30.0)).unwrap();
            db.upsert(food("t2", 35.0)).unwrap();
            db.delete(&TransactionId::from("t1")).unwrap();
        }

        let db = open(&dir);
        assert_eq!(db.count(), 1);
        let t2 = db.get(&TransactionId::from("t2")).unwrap().unwrap();
        assert_eq!(t2.amount, 35.0);
        assert_eq!(
            db.by_index(IndexName::Type, TransactionKind::Expense.into())
                .unwrap()
                .len(),
            1
        );
    }

    #[test]
    fn test_store_lock() {
        let dir = TempDir::new().unwrap();
        let _db = open(&dir);

        let result = Database::open(test_config(&dir), Arc::new(SubscriptionManager::new()));
        assert!(matches!(result, Err(StoreError::Locked)));
    }

    #[test]
    fn test_clear() {
        let dir = TempDir::new().unwrap();
        let db = open(&dir);

        db.insert(food("t1", 50.0)).unwrap();
        db.clear().unwrap();

        assert_eq!(db.count(), 0);
        assert!(db.all().unwrap().is_empty());
        assert!(db.by_index(IndexName::Category, "Alimentation".into()).unwrap().is_empty());

        // Ids are free again
        db.insert(food("t1", 5.0)).unwrap();
    }

    #[test]
    fn test_compact() {
        let dir = TempDir::new().unwrap();
        let db = open(&dir);

        for i in 0..10 {
            db.insert(food(&format!("t{}", i), i as f64)).unwrap();
        }
        for i in 0..8 {
            db.delete(&TransactionId::from(format!("t{}", i))).unwrap();
        }

        let stats = db.compact().unwrap();
        assert_eq!(stats.records, 2);
        assert!(stats.bytes_after < stats.bytes_before);

        let remaining: Vec<f64> = db.all().unwrap().iter().map(|tx| tx.amount).collect();
        assert_eq!(remaining, vec![8.0, 9.0]);

        // Writes after compaction still land correctly
        db.insert(food("t10", 10.0)).unwrap();
        drop(db);
        let db = open(&dir);
        assert_eq!(db.count(), 3);
    }

    #[test]
    fn test_readers_during_compaction() {
        let dir = TempDir::new().unwrap();
        let config = StoreConfig {
            record_cache_size: 1,
            ..test_config(&dir)
        };
        let db = Arc::new(Database::open(config, Arc::new(SubscriptionManager::new())).unwrap());
        for i in 0..20 {
            db.insert(food(&format!("t{:02}", i), i as f64)).unwrap();
        }

        let stop = Arc::new(AtomicBool::new(false));
        let reader = {
            let db = Arc::clone(&db);
            let stop = Arc::clone(&stop);
            thread::spawn(move || {
                let mut failures = 0;
                let mut rounds = 0;
                while !stop.load(Ordering::SeqCst) || rounds == 0 {
                    match db.all() {
                        Ok(rows) => assert_eq!(rows.len(), 20),
                        Err(_) => failures += 1,
                    }
                    if db.by_index(IndexName::Category, "Alimentation".into()).is_err() {
                        failures += 1;
                    }
                    rounds += 1;
                }
                failures
            })
        };

        for round in 0..100 {
            db.upsert(food(&format!("t{:02}", round % 20), round as f64)).unwrap();
            db.compact().unwrap();
        }
        stop.store(true, Ordering::SeqCst);

        assert_eq!(reader.join().unwrap(), 0);
        assert_eq!(db.count(), 20);
    }

    #[test]
    fn test_migrate_from_v1() {
        let dir = TempDir::new().unwrap();

        {
            let db = open(&dir);
            db.insert(food("t1", 50.0)).unwrap();
            db.delete(&TransactionId::from("t1")).unwrap();
            db.insert(food("t2", 20.0)).unwrap();
        }

        let db_dir = dir.path().join(DATABASE_NAME);
        Database::write_manifest(&db_dir, 1).unwrap();

        let db = open(&dir);
        assert_eq!(Database::read_manifest(&db_dir).unwrap(), SCHEMA_VERSION);
        assert_eq!(db.count(), 1);
        assert_eq!(db.by_index(IndexName::Currency, "EUR".into()).unwrap().len(), 1);
    }

    #[test]
    fn test_migrate_empty_store() {
        let dir = TempDir::new().unwrap();
        drop(open(&dir));

        let db_dir = dir.path().join(DATABASE_NAME);
        Database::write_manifest(&db_dir, 1).unwrap();

        let db = open(&dir);
        assert_eq!(db.count(), 0);
        assert_eq!(Database::read_manifest(&db_dir).unwrap(), SCHEMA_VERSION);
    }

    #[test]
    fn test_newer_schema_rejected() {
        let dir = TempDir::new().unwrap();
        drop(open(&dir));

        Database::write_manifest(&dir.path().join(DATABASE_NAME), SCHEMA_VERSION + 1).unwrap();

        let result = Database::open(test_config(&dir), Arc::new(SubscriptionManager::new()));
        assert!(matches!(result, Err(StoreError::UnsupportedSchema { .. })));
    }
}
