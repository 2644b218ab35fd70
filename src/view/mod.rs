//! Reactive in-memory state for display layers.

mod cache;
mod observable;

pub use cache::ViewCache;
pub use observable::{ListenerId, Observable};
