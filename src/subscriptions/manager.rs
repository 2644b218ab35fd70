//! Subscription manager for broadcasting store events.

use crate::types::{Transaction, TransactionId};
use crossbeam_channel::{bounded, Sender};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

use super::types::{
    DropReason, StoreEvent, SubscriptionConfig, SubscriptionHandle, SubscriptionId,
    TransactionSummary,
};

/// Internal subscription state.
struct Subscription {
    config: SubscriptionConfig,
    sender: Sender<StoreEvent>,
}

impl Subscription {
    /// Try to send an event. Returns false if buffer is full (subscriber will be dropped).
    fn try_send(&self, event: StoreEvent) -> bool {
        self.sender.try_send(event).is_ok()
    }

    /// Check if this subscription wants a write of `tx`.
    fn matches_write(&self, tx: &Transaction) -> bool {
        let filter = &self.config.filter;
        if !filter.include_writes {
            return false;
        }

        if let Some(ref kinds) = filter.kinds {
            if !kinds.contains(&tx.kind) {
                return false;
            }
        }

        if let Some(ref categories) = filter.categories {
            if !categories.iter().any(|name| *name == tx.category.name) {
                return false;
            }
        }

        true
    }
}

/// Manages subscriptions and broadcasts events.
pub struct SubscriptionManager {
    /// Active subscriptions by ID.
    subscriptions: RwLock<HashMap<SubscriptionId, Subscription>>,
    /// Counter for generating subscription IDs.
    next_id: AtomicU64,
}

impl SubscriptionManager {
    /// Create a new subscription manager.
    pub fn new() -> Self {
        Self {
            subscriptions: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Create a new subscription. Events are live only; there is no replay.
    pub fn subscribe(&self, config: SubscriptionConfig) -> SubscriptionHandle {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let (sender, receiver) = bounded(config.buffer_size.max(1));

        self.subscriptions
            .write()
            .insert(id, Subscription { config, sender });

        SubscriptionHandle { id, receiver }
    }

    /// Unsubscribe and clean up.
    pub fn unsubscribe(&self, id: SubscriptionId) {
        let mut subs = self.subscriptions.write();
        if let Some(sub) = subs.remove(&id) {
            // Best effort
            let _ = sub.sender.try_send(StoreEvent::Dropped {
                reason: DropReason::Unsubscribed,
            });
        }
    }

    /// Get subscription count.
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.read().len()
    }

    // --- Broadcasting ---

    /// Broadcast an insert.
    pub fn broadcast_added(&self, tx: &Transaction) {
        let event = StoreEvent::Added {
            transaction: TransactionSummary::from_transaction(tx),
        };
        self.broadcast(|sub| sub.matches_write(tx), event);
    }

    /// Broadcast a replace or upsert.
    pub fn broadcast_updated(&self, tx: &Transaction) {
        let event = StoreEvent::Updated {
            transaction: TransactionSummary::from_transaction(tx),
        };
        self.broadcast(|sub| sub.matches_write(tx), event);
    }

    /// Broadcast a delete.
    pub fn broadcast_deleted(&self, id: &TransactionId) {
        let event = StoreEvent::Deleted { id: id.clone() };
        self.broadcast(|sub| sub.config.filter.include_deletes, event);
    }

    /// Broadcast a clear.
    pub fn broadcast_cleared(&self) {
        self.broadcast(|sub| sub.config.filter.include_clears, StoreEvent::Cleared);
    }

    /// Internal broadcast helper. Drops subscribers that fail to receive.
    fn broadcast<F>(&self, filter: F, event: StoreEvent)
    where
        F: Fn(&Subscription) -> bool,
    {
        let mut to_remove = Vec::new();

        {
            let subs = self.subscriptions.read();
            for (id, sub) in subs.iter() {
                if filter(sub) && !sub.try_send(event.clone()) {
                    to_remove.push(*id);
                }
            }
        }

        if !to_remove.is_empty() {
            let mut subs = self.subscriptions.write();
            for id in to_remove {
                if let Some(sub) = subs.remove(&id) {
                    debug!(subscription = id.0, "Dropping slow subscriber");
                    // Might fail if the buffer is still full
                    let _ = sub.sender.try_send(StoreEvent::Dropped {
                        reason: DropReason::BufferOverflow,
                    });
                }
            }
        }
    }
}

impl Default for SubscriptionManager {
    fn default() -> Self {
        Self::new()
    }
}
