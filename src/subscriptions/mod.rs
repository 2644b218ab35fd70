//! Change feed for store writes.
//!
//! Every successful add, update, delete and clear is broadcast to
//! in-process subscribers over bounded channels:
//! - Filtering by transaction kind and category
//! - Slow subscribers are dropped instead of blocking writers
//!
//! # Example
//!
//! ```ignore
//! let handle = store.subscribe(SubscriptionConfig {
//!     filter: SubscriptionFilter::kinds(vec![TransactionKind::Expense]),
//!     ..Default::default()
//! });
//!
//! while let Ok(event) = handle.recv() {
//!     match event {
//!         StoreEvent::Added { transaction } => println!("new expense {}", transaction.id),
//!         StoreEvent::Dropped { .. } => break,
//!         _ => {}
//!     }
//! }
//! ```

mod manager;
mod types;

pub use manager::SubscriptionManager;
pub use types::{
    DropReason, StoreEvent, SubscriptionConfig, SubscriptionFilter, SubscriptionHandle,
    SubscriptionId, TransactionSummary,
};
