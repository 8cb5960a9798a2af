use crate::common::{atomic, Atomic, ReadExecutor, WriteExecutor};
use crate::store::{StoreConfigProvider, StoreEventListener};
use std::any::Any;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Configuration for an in-memory node store.
///
/// Holds the listeners registered before the store opens and a capacity hint
/// used to pre-allocate the node vector. Clones share the same settings.
#[derive(Default, Clone)]
pub struct InMemoryStoreConfig {
    inner: Arc<InMemoryStoreConfigInner>,
}

impl InMemoryStoreConfig {
    pub fn new() -> InMemoryStoreConfig {
        InMemoryStoreConfig {
            inner: Arc::new(InMemoryStoreConfigInner::new()),
        }
    }

    pub fn event_listeners(&self) -> Vec<StoreEventListener> {
        self.inner.event_listeners()
    }

    /// Number of node slots reserved when the store opens.
    pub fn initial_capacity(&self) -> usize {
        self.inner.initial_capacity.load(Ordering::Relaxed)
    }

    pub(crate) fn set_initial_capacity(&self, capacity: usize) {
        self.inner
            .initial_capacity
            .store(capacity, Ordering::Relaxed)
    }
}

impl StoreConfigProvider for InMemoryStoreConfig {
    fn file_path(&self) -> String {
        "".to_string()
    }

    fn is_read_only(&self) -> bool {
        false
    }

    fn add_store_listener(&self, listener: StoreEventListener) {
        self.inner.add_store_listener(listener)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[derive(Default)]
struct InMemoryStoreConfigInner {
    event_listeners: Atomic<Vec<StoreEventListener>>,
    initial_capacity: AtomicUsize,
}

impl InMemoryStoreConfigInner {
    fn new() -> InMemoryStoreConfigInner {
        InMemoryStoreConfigInner {
            event_listeners: atomic(Vec::new()),
            initial_capacity: AtomicUsize::new(0),
        }
    }

    fn add_store_listener(&self, listener: StoreEventListener) {
        self.event_listeners.write_with(|it| it.push(listener))
    }

    fn event_listeners(&self) -> Vec<StoreEventListener> {
        self.event_listeners
            .read_with(|listeners| listeners.iter().cloned().collect())
    }
}
