//! Transaction log and indexes.
//!
//! Records are stored in an append-only log; the primary and secondary
//! indexes are rebuilt from it on open.

mod index;
mod log;

pub use index::{IndexName, IndexValue, RecordIndex};
pub use log::{LogEntry, RecordLog};
