//! Keeps a [`ViewCache`] in step with a [`TransactionStore`].
//!
//! Each write goes to the store first; the view changes only once the store
//! has accepted it, so a failed write leaves the displayed rows untouched.

use crate::analytics::{summarize, DateRange, Summary};
use crate::error::Result;
use crate::store::TransactionStore;
use crate::types::{TransactionId, TransactionInput};
use crate::view::ViewCache;
use std::sync::Arc;
use tracing::debug;

pub struct Ledger {
    store: TransactionStore,
    view: Arc<ViewCache>,
}

impl Ledger {
    pub fn new(store: TransactionStore) -> Self {
        Self::with_view(store, Arc::new(ViewCache::new()))
    }

    /// Use an existing view, e.g. one already subscribed to by a grid.
    pub fn with_view(store: TransactionStore, view: Arc<ViewCache>) -> Self {
        Self { store, view }
    }

    pub fn store(&self) -> &TransactionStore {
        &self.store
    }

    pub fn view(&self) -> &Arc<ViewCache> {
        &self.view
    }

    /// Reload every row from the store.
    pub async fn load(&self) -> Result<()> {
        let rows = self.store.get_all().await?;
        debug!(rows = rows.len(), "Loaded transactions into view");
        self.view.replace_all(rows);
        Ok(())
    }

    /// Insert a transaction and show it at the top of the view.
    pub async fn add(&self, input: TransactionInput) -> Result<TransactionId> {
        let row = self.store.add_one_returning(input).await?;
        let id = row.id.clone();

        self.view.prepend(vec![row]);
        Ok(id)
    }

    /// Insert or overwrite a transaction, updating its row in place.
    pub async fn update(&self, input: TransactionInput) -> Result<TransactionId> {
        let row = self.store.update_one_returning(input).await?;
        let id = row.id.clone();

        if !self.view.replace_row(row.clone()) {
            debug!(id = %id, "Updated row was not in view, prepending");
            self.view.prepend(vec![row]);
        }
        Ok(id)
    }

    pub async fn delete(&self, id: &TransactionId) -> Result<()> {
        self.store.delete_one(id).await?;
        self.view.remove(id);
        Ok(())
    }

    pub async fn clear(&self) -> Result<()> {
        self.store.clear_all().await?;
        self.view.replace_all(Vec::new());
        Ok(())
    }

    /// Aggregates over every stored transaction in `range`.
    pub async fn analytics(&self, range: &DateRange) -> Result<Summary> {
        let transactions = self.store.get_all().await?;
        Ok(summarize(&transactions, range))
    }

    /// Aggregates over one user's transactions in `range`.
    pub async fn analytics_for_user(&self, user_id: i64, range: &DateRange) -> Result<Summary> {
        let transactions = self.store.get_transactions_by_user_id(user_id).await?;
        Ok(summarize(&transactions, range))
    }
}
