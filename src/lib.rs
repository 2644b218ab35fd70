//! # fintrack
//!
//! Data layer for a personal finance tracker: a persistent, indexed
//! transaction store, pure aggregation over transaction sets, and reactive
//! in-memory views for display.
//!
//! ## Core Concepts
//!
//! - **Store**: Keyed transactions in an append-only log, with secondary
//!   indexes rebuilt on open
//! - **Analytics**: Monthly rollups, category breakdowns, balances
//! - **View**: Observable row sets kept in step with the store by a ledger
//! - **Change feed**: Bounded channels announcing every store write
//!
//! ## Example
//!
//! ```ignore
//! use fintrack::{Category, DateRange, Ledger, StoreConfig, TransactionInput, TransactionStore};
//!
//! let ledger = Ledger::new(TransactionStore::new(StoreConfig::at("./data")));
//! ledger.load().await?;
//!
//! ledger
//!     .add(TransactionInput::expense(
//!         "t1",
//!         Category::new("Alimentation", "shopping_cart"),
//!         42.0,
//!         "2024-01-10",
//!     ))
//!     .await?;
//!
//! let summary = ledger.analytics(&DateRange::unbounded()).await?;
//! println!("balance: {}", summary.balance);
//! ```

pub mod analytics;
pub mod catalog;
pub mod database;
pub mod error;
pub mod ledger;
pub mod records;
pub mod store;
pub mod subscriptions;
pub mod types;
pub mod view;

// Re-exports
pub use analytics::{
    balance, category_breakdown, filter_by_range, highest_expense, monthly_rollup,
    running_balance, summarize, BalancePoint, CategoryShare, DateRange, MonthlyRollup,
    MonthlyTotals, RangeFilter, Summary, YearMonth,
};
pub use catalog::{icon_glyph, CategoryCatalog, DEFAULT_CATEGORIES};
pub use database::{CompactionStats, Database, StoreConfig, DATABASE_NAME, SCHEMA_VERSION};
pub use error::{MalformedDate, Result, StoreError};
pub use ledger::Ledger;
pub use records::{IndexName, IndexValue};
pub use store::TransactionStore;
pub use subscriptions::{
    DropReason, StoreEvent, SubscriptionConfig, SubscriptionFilter, SubscriptionHandle,
    SubscriptionId, SubscriptionManager, TransactionSummary,
};
pub use types::*;
pub use view::{ListenerId, Observable, ViewCache};
