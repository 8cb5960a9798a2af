//! Configuration of an entity index.

use crate::common::{atomic, Atomic, ReadExecutor, WriteExecutor, DEFAULT_BATCH_SIZE, DEFAULT_MAX_DEPTH};
use crate::errors::{ErrorKind, IndexError, IndexResult};
use crate::store::{NodeStore, StoreModule};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Settings shared by an index and everything it hands out.
///
/// Clones share the same settings. The values are normally set through
/// [`crate::index_builder::EntityIndexBuilder`].
#[derive(Clone)]
pub struct IndexConfig {
    inner: Arc<IndexConfigInner>,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl IndexConfig {
    pub fn new() -> IndexConfig {
        IndexConfig {
            inner: Arc::new(IndexConfigInner::new()),
        }
    }

    /// Number of nodes fetched per ranged read by id-ordered iterators.
    pub fn batch_size(&self) -> usize {
        self.inner.batch_size.load(Ordering::Relaxed)
    }

    /// Deepest path a tree descent may take before the index is reported corrupt.
    pub fn max_depth(&self) -> usize {
        self.inner.max_depth.load(Ordering::Relaxed)
    }

    pub fn set_batch_size(&self, batch_size: usize) -> IndexResult<()> {
        if batch_size == 0 {
            log::error!("Batch size must be positive");
            return Err(IndexError::new(
                "Batch size must be positive",
                ErrorKind::InvalidArgument,
            ));
        }
        self.inner.batch_size.store(batch_size, Ordering::Relaxed);
        Ok(())
    }

    pub fn set_max_depth(&self, max_depth: usize) -> IndexResult<()> {
        if max_depth == 0 {
            log::error!("Maximum tree depth must be positive");
            return Err(IndexError::new(
                "Maximum tree depth must be positive",
                ErrorKind::InvalidArgument,
            ));
        }
        self.inner.max_depth.store(max_depth, Ordering::Relaxed);
        Ok(())
    }

    /// Obtains the node store from `module`. Only one module may be loaded.
    pub fn load_module<T: StoreModule>(&self, module: T) -> IndexResult<()> {
        if self.inner.node_store.read_with(|store| store.is_some()) {
            log::error!("A store module is already loaded");
            return Err(IndexError::new(
                "A store module is already loaded",
                ErrorKind::InvalidOperation,
            ));
        }
        let store = module.get_store()?;
        self.inner.node_store.write_with(|it| *it = Some(store));
        Ok(())
    }

    /// The node store of the loaded module, if any.
    pub fn node_store(&self) -> Option<NodeStore> {
        self.inner.node_store.read_with(|store| store.clone())
    }
}

struct IndexConfigInner {
    batch_size: AtomicUsize,
    max_depth: AtomicUsize,
    node_store: Atomic<Option<NodeStore>>,
}

impl IndexConfigInner {
    fn new() -> Self {
        IndexConfigInner {
            batch_size: AtomicUsize::new(DEFAULT_BATCH_SIZE),
            max_depth: AtomicUsize::new(DEFAULT_MAX_DEPTH),
            node_store: atomic(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::InMemoryStoreModule;

    #[test]
    fn test_defaults() {
        let config = IndexConfig::new();
        assert_eq!(config.batch_size(), 1000);
        assert_eq!(config.max_depth(), 40);
        assert!(config.node_store().is_none());
    }

    #[test]
    fn test_clones_share_settings() {
        let config = IndexConfig::new();
        let clone = config.clone();
        config.set_batch_size(16).unwrap();
        config.set_max_depth(64).unwrap();
        assert_eq!(clone.batch_size(), 16);
        assert_eq!(clone.max_depth(), 64);
    }

    #[test]
    fn test_zero_values_are_rejected() {
        let config = IndexConfig::new();
        assert_eq!(
            config.set_batch_size(0).unwrap_err().kind(),
            &ErrorKind::InvalidArgument
        );
        assert_eq!(
            config.set_max_depth(0).unwrap_err().kind(),
            &ErrorKind::InvalidArgument
        );
        assert_eq!(config.batch_size(), 1000);
    }

    #[test]
    fn test_only_one_module_loads() {
        let config = IndexConfig::new();
        config.load_module(InMemoryStoreModule::new()).unwrap();
        assert!(config.node_store().is_some());

        let err = config.load_module(InMemoryStoreModule::new()).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::InvalidOperation);
    }
}
