//! Async transaction store.
//!
//! `TransactionStore` is a cheap, cloneable handle. The database is opened
//! lazily by the first call that needs it; every clone shares the same
//! `Arc<Database>` and the same change feed. Engine calls do file I/O, so
//! they run on tokio's blocking pool rather than on the async worker.

use crate::database::{CompactionStats, Database, StoreConfig};
use crate::error::{Result, StoreError};
use crate::records::{IndexName, IndexValue};
use crate::subscriptions::{
    SubscriptionConfig, SubscriptionHandle, SubscriptionId, SubscriptionManager,
};
use crate::types::{StoreStats, Transaction, TransactionId, TransactionInput, TransactionKind};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tokio::task;

struct Shared {
    config: StoreConfig,
    handle: OnceCell<Arc<Database>>,
    events: Arc<SubscriptionManager>,
}

/// Persistent collection of transactions.
#[derive(Clone)]
pub struct TransactionStore {
    shared: Arc<Shared>,
}

impl TransactionStore {
    /// Create a store handle. Nothing touches the disk until first use.
    pub fn new(config: StoreConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                handle: OnceCell::new(),
                events: Arc::new(SubscriptionManager::new()),
            }),
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.shared.config
    }

    /// Open the database, or return the already open handle.
    ///
    /// Concurrent callers share one initialization. If it fails the error is
    /// returned to every waiter and the next call tries again.
    pub async fn open(&self) -> Result<Arc<Database>> {
        self.ensure_open().await.map(Arc::clone)
    }

    async fn ensure_open(&self) -> Result<&Arc<Database>> {
        let shared = &self.shared;
        shared
            .handle
            .get_or_try_init(|| async {
                let config = shared.config.clone();
                let events = Arc::clone(&shared.events);
                match task::spawn_blocking(move || Database::open(config, events)).await {
                    Ok(opened) => opened.map(Arc::new),
                    Err(e) => Err(StoreError::StoreUnavailable(format!("Open task failed: {}", e))),
                }
            })
            .await
    }

    /// Run `f` against the open database on the blocking pool.
    async fn run<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Database) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = Arc::clone(self.ensure_open().await?);
        task::spawn_blocking(move || f(&db))
            .await
            .map_err(|e| StoreError::StoreUnavailable(format!("Store task failed: {}", e)))?
    }

    /// Whether the database has been opened.
    pub fn is_open(&self) -> bool {
        self.shared.handle.initialized()
    }

    // --- Writes ---

    /// Insert a new transaction. Fails with `DuplicateKey` if the id exists.
    pub async fn add_one(&self, input: TransactionInput) -> Result<TransactionId> {
        self.add_one_returning(input).await.map(|tx| tx.id)
    }

    /// Like [`add_one`](Self::add_one), returning the stored row with its
    /// audit timestamps.
    pub async fn add_one_returning(&self, input: TransactionInput) -> Result<Transaction> {
        self.run(move |db| db.insert(input)).await
    }

    /// Insert or overwrite a transaction.
    pub async fn update_one(&self, input: TransactionInput) -> Result<TransactionId> {
        self.update_one_returning(input).await.map(|tx| tx.id)
    }

    /// Like [`update_one`](Self::update_one), returning the stored row.
    pub async fn update_one_returning(&self, input: TransactionInput) -> Result<Transaction> {
        self.run(move |db| db.upsert(input)).await
    }

    /// Overwrite an existing transaction. Fails with `NotFound` if absent.
    pub async fn replace_one(&self, input: TransactionInput) -> Result<TransactionId> {
        self.run(move |db| db.replace(input).map(|tx| tx.id)).await
    }

    /// Delete a transaction. Deleting a missing id is not an error.
    pub async fn delete_one(&self, id: &TransactionId) -> Result<()> {
        let id = id.clone();
        self.run(move |db| db.delete(&id).map(|_| ())).await
    }

    /// Remove every transaction.
    pub async fn clear_all(&self) -> Result<()> {
        self.run(|db| db.clear()).await
    }

    // --- Reads ---

    pub async fn get_one(&self, id: &TransactionId) -> Result<Option<Transaction>> {
        let id = id.clone();
        self.run(move |db| db.get(&id)).await
    }

    /// Every transaction, in id order.
    pub async fn get_all(&self) -> Result<Vec<Transaction>> {
        self.run(|db| db.all()).await
    }

    /// Transactions filed under `value` in the given index.
    pub async fn get_all_by_index(
        &self,
        name: IndexName,
        value: impl Into<IndexValue>,
    ) -> Result<Vec<Transaction>> {
        let value = value.into();
        self.run(move |db| db.by_index(name, value)).await
    }

    /// Transactions filed between `low` and `high` (inclusive), in index order.
    pub async fn get_all_by_index_range(
        &self,
        name: IndexName,
        low: impl Into<IndexValue>,
        high: impl Into<IndexValue>,
    ) -> Result<Vec<Transaction>> {
        let (low, high) = (low.into(), high.into());
        self.run(move |db| db.by_index_range(name, low, high)).await
    }

    /// Lookup by index name as stored in the schema, e.g. `"by_category"`.
    pub async fn get_all_by_index_name(
        &self,
        name: &str,
        value: impl Into<IndexValue>,
    ) -> Result<Vec<Transaction>> {
        let name: IndexName = name.parse()?;
        self.get_all_by_index(name, value).await
    }

    pub async fn get_transactions_by_user_id(&self, user_id: i64) -> Result<Vec<Transaction>> {
        self.get_all_by_index(IndexName::UserId, user_id).await
    }

    pub async fn get_transactions_by_type(
        &self,
        kind: TransactionKind,
    ) -> Result<Vec<Transaction>> {
        self.get_all_by_index(IndexName::Type, kind).await
    }

    pub async fn get_transactions_by_category(&self, category: &str) -> Result<Vec<Transaction>> {
        self.get_all_by_index(IndexName::Category, category).await
    }

    // --- Change feed ---

    /// Subscribe to writes. Works before the database is opened.
    pub fn subscribe(&self, config: SubscriptionConfig) -> SubscriptionHandle {
        self.shared.events.subscribe(config)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.shared.events.unsubscribe(id)
    }

    // --- Maintenance ---

    pub async fn stats(&self) -> Result<StoreStats> {
        Ok(self.ensure_open().await?.stats())
    }

    pub async fn compact(&self) -> Result<CompactionStats> {
        self.run(|db| db.compact()).await
    }

    pub async fn sync(&self) -> Result<()> {
        self.run(|db| db.sync()).await
    }

    /// The open handle, without opening. Fails with `StoreUnavailable`.
    pub fn handle(&self) -> Result<Arc<Database>> {
        self.shared
            .handle
            .get()
            .cloned()
            .ok_or_else(|| StoreError::StoreUnavailable("Database is not open".into()))
    }
}
