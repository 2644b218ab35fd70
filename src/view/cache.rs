use super::observable::{ListenerId, Observable};
use crate::types::{Transaction, TransactionId};
use std::sync::Arc;

/// In-memory rows shown by transaction grids and charts.
///
/// The cache is only as fresh as its last `replace_all`; it never reads the
/// store on its own.
#[derive(Debug, Default)]
pub struct ViewCache {
    rows: Observable<Vec<Transaction>>,
}

impl ViewCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Swap in a full result set.
    pub fn replace_all(&self, rows: Vec<Transaction>) {
        self.rows.set(rows);
    }

    /// Insert rows at the front, leaving existing rows in place.
    pub fn prepend(&self, rows: Vec<Transaction>) {
        self.rows.update(|current| {
            let mut next = Vec::with_capacity(rows.len() + current.len());
            next.extend(rows);
            next.extend(current.iter().cloned());
            next
        });
    }

    /// Replace the row with the same id in place. Returns false, without
    /// notifying, when no such row is shown.
    pub fn replace_row(&self, row: Transaction) -> bool {
        self.rows.try_update(|current| {
            let position = current.iter().position(|tx| tx.id == row.id)?;
            let mut next = current.clone();
            next[position] = row;
            Some(next)
        })
    }

    /// Drop the row with this id. Returns false, without notifying, when no
    /// such row is shown.
    pub fn remove(&self, id: &TransactionId) -> bool {
        self.rows.try_update(|current| {
            current.iter().any(|tx| tx.id == *id).then(|| {
                current
                    .iter()
                    .filter(|tx| tx.id != *id)
                    .cloned()
                    .collect()
            })
        })
    }

    /// Snapshot of the current rows.
    pub fn rows(&self) -> Arc<Vec<Transaction>> {
        self.rows.get()
    }

    pub fn len(&self) -> usize {
        self.rows.get().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.get().is_empty()
    }

    /// Called with the full row set after every change.
    pub fn subscribe(
        &self,
        listener: impl Fn(&[Transaction]) + Send + Sync + 'static,
    ) -> ListenerId {
        self.rows.subscribe(move |rows: &Vec<Transaction>| listener(rows.as_slice()))
    }

    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        self.rows.unsubscribe(id)
    }
}
