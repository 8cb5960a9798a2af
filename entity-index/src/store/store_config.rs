use crate::errors::{ErrorKind, IndexError, IndexResult};
use crate::store::StoreEventListener;
use std::any::Any;
use std::ops::Deref;
use std::sync::Arc;

pub trait StoreConfigProvider: Any + Send + Sync {
    fn file_path(&self) -> String;

    fn is_read_only(&self) -> bool;

    fn add_store_listener(&self, listener: StoreEventListener);

    fn is_in_memory(&self) -> bool {
        self.file_path().is_empty()
    }

    fn as_any(&self) -> &dyn Any;
}

/// Type-erased handle to the configuration of a node store.
#[derive(Clone)]
pub struct StoreConfig {
    inner: Arc<dyn StoreConfigProvider>,
}

impl StoreConfig {
    pub fn new<T: StoreConfigProvider + 'static>(inner: T) -> Self {
        StoreConfig {
            inner: Arc::new(inner),
        }
    }

    pub fn as_ref<T: StoreConfigProvider + 'static>(&self) -> IndexResult<&T> {
        self.inner.as_any().downcast_ref::<T>().ok_or_else(|| {
            IndexError::new(
                "StoreConfig type mismatch: cannot downcast to requested config type",
                ErrorKind::InvalidOperation,
            )
        })
    }
}

impl Deref for StoreConfig {
    type Target = Arc<dyn StoreConfigProvider>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}
