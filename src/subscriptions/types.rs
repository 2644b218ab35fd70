//! Subscription types for the store change feed.

use crate::types::{Transaction, TransactionId, TransactionKind};
use serde::{Deserialize, Serialize};

/// Configuration for a subscription.
#[derive(Clone, Debug)]
pub struct SubscriptionConfig {
    /// Max buffered events before dropping subscriber.
    /// Default: 1000
    pub buffer_size: usize,

    /// Filter criteria.
    pub filter: SubscriptionFilter,
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self {
            buffer_size: 1000,
            filter: SubscriptionFilter::all(),
        }
    }
}

/// Filter criteria for subscriptions.
#[derive(Clone, Debug, Default)]
pub struct SubscriptionFilter {
    /// Only writes of these kinds (None = all kinds).
    pub kinds: Option<Vec<TransactionKind>>,

    /// Only writes in these categories (None = all categories).
    pub categories: Option<Vec<String>>,

    /// Include add/update events.
    pub include_writes: bool,

    /// Include delete events.
    pub include_deletes: bool,

    /// Include clear events.
    pub include_clears: bool,
}

impl SubscriptionFilter {
    /// Subscribe to adds and updates only.
    pub fn writes() -> Self {
        Self {
            include_writes: true,
            ..Default::default()
        }
    }

    /// Subscribe to writes of one kind.
    pub fn kinds(kinds: Vec<TransactionKind>) -> Self {
        Self {
            kinds: Some(kinds),
            include_writes: true,
            ..Default::default()
        }
    }

    /// Subscribe to writes in specific categories.
    pub fn categories(names: Vec<String>) -> Self {
        Self {
            categories: Some(names),
            include_writes: true,
            ..Default::default()
        }
    }

    /// Subscribe to everything.
    pub fn all() -> Self {
        Self {
            include_writes: true,
            include_deletes: true,
            include_clears: true,
            ..Default::default()
        }
    }
}

/// Events emitted by subscriptions.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StoreEvent {
    /// A new transaction was inserted.
    Added { transaction: TransactionSummary },

    /// An existing transaction was replaced (or upserted).
    Updated { transaction: TransactionSummary },

    /// A transaction was deleted.
    Deleted { id: TransactionId },

    /// Every transaction was removed.
    Cleared,

    /// Subscription was dropped.
    Dropped { reason: DropReason },
}

/// Why a subscription was dropped.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    /// Send buffer overflowed (slow consumer).
    BufferOverflow,
    /// Explicitly unsubscribed.
    Unsubscribed,
}

/// Summary of a written transaction.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionSummary {
    pub id: TransactionId,
    pub kind: TransactionKind,
    pub category: String,
    pub amount: f64,
    pub date: String,
    pub user_id: i64,
}

impl TransactionSummary {
    pub fn from_transaction(tx: &Transaction) -> Self {
        Self {
            id: tx.id.clone(),
            kind: tx.kind,
            category: tx.category.name.clone(),
            amount: tx.amount,
            date: tx.date.0.clone(),
            user_id: tx.user_id,
        }
    }
}

/// Unique identifier for a subscription.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

/// Handle to manage a subscription.
pub struct SubscriptionHandle {
    pub id: SubscriptionId,
    /// Channel to receive events.
    pub receiver: crossbeam_channel::Receiver<StoreEvent>,
}

impl SubscriptionHandle {
    /// Receive the next event (blocking).
    pub fn recv(&self) -> Result<StoreEvent, crossbeam_channel::RecvError> {
        self.receiver.recv()
    }

    /// Try to receive an event (non-blocking).
    pub fn try_recv(&self) -> Result<StoreEvent, crossbeam_channel::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Receive with timeout.
    pub fn recv_timeout(
        &self,
        timeout: std::time::Duration,
    ) -> Result<StoreEvent, crossbeam_channel::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    /// Drain every event currently buffered.
    pub fn drain(&self) -> Vec<StoreEvent> {
        self.receiver.try_iter().collect()
    }
}
