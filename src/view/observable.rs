//! A value that notifies listeners when it changes.

use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Identifies a listener registered on an [`Observable`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(pub u64);

type Listener<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Shared value with synchronous change notification.
///
/// Listeners run on the mutating thread, in subscription order, after the
/// new value is visible to `get`. No lock is held while they run, so a
/// listener may read the value, subscribe or unsubscribe.
///
/// Mutations are serialized. The closure given to `update` or `try_update`
/// runs without the value lock, so it may call `get`; calling `set` or
/// `update` on the same observable from inside it deadlocks.
pub struct Observable<T> {
    value: RwLock<Arc<T>>,
    mutate: Mutex<()>,
    listeners: RwLock<BTreeMap<ListenerId, Listener<T>>>,
    next_id: AtomicU64,
}

impl<T> Observable<T> {
    pub fn new(value: T) -> Self {
        Self {
            value: RwLock::new(Arc::new(value)),
            mutate: Mutex::new(()),
            listeners: RwLock::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Current value.
    pub fn get(&self) -> Arc<T> {
        Arc::clone(&self.value.read())
    }

    /// Replace the value and notify.
    pub fn set(&self, value: T) {
        let value = Arc::new(value);
        {
            let _mutate = self.mutate.lock();
            *self.value.write() = Arc::clone(&value);
        }
        self.notify(&value);
    }

    /// Derive a new value from the current one and notify.
    pub fn update(&self, f: impl FnOnce(&T) -> T) {
        self.try_update(|current| Some(f(current)));
    }

    /// Like `update`, but `f` may decline by returning None; nobody is
    /// notified then. Returns whether the value changed.
    pub fn try_update(&self, f: impl FnOnce(&T) -> Option<T>) -> bool {
        let value = {
            let _mutate = self.mutate.lock();
            let current = self.get();
            match f(&current) {
                Some(next) => {
                    let next = Arc::new(next);
                    *self.value.write() = Arc::clone(&next);
                    next
                }
                None => return false,
            }
        };
        self.notify(&value);
        true
    }

    pub fn subscribe(&self, listener: impl Fn(&T) + Send + Sync + 'static) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.listeners.write().insert(id, Arc::new(listener));
        id
    }

    /// Returns false if the listener was not registered.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        self.listeners.write().remove(&id).is_some()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    fn notify(&self, value: &T) {
        let listeners: Vec<Listener<T>> = self.listeners.read().values().cloned().collect();
        for listener in listeners {
            listener(value);
        }
    }
}

impl<T: Default> Default for Observable<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: fmt::Debug> fmt::Debug for Observable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observable")
            .field("value", &self.get())
            .field("listeners", &self.listener_count())
            .finish()
    }
}
