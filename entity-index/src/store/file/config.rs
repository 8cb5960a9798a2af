use crate::common::{atomic, Atomic, ReadExecutor, WriteExecutor, DEFAULT_CACHE_SIZE};
use crate::store::{StoreConfigProvider, StoreEventListener};
use std::any::Any;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// Configuration of a file-backed node store.
///
/// Settings are written by [`FileStoreModuleBuilder`](crate::store::file::FileStoreModuleBuilder)
/// and read when the store opens. Clones share the same settings.
///
/// | Setting | Default |
/// |---|---|
/// | file path | none, required |
/// | read only | `false` |
/// | create if missing | `true` |
/// | node cache size | 1024 nodes, `0` disables the cache |
/// | load in memory | `false` |
#[derive(Clone)]
pub struct FileStoreConfig {
    inner: Arc<FileStoreConfigInner>,
}

impl Default for FileStoreConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl FileStoreConfig {
    pub fn new() -> FileStoreConfig {
        FileStoreConfig {
            inner: Arc::new(FileStoreConfigInner::new()),
        }
    }

    pub fn create_if_missing(&self) -> bool {
        self.inner.create_if_missing.load(Ordering::Relaxed)
    }

    /// Maximum number of nodes kept in the read cache.
    pub fn cache_size(&self) -> usize {
        self.inner.cache_size.load(Ordering::Relaxed)
    }

    /// Whether the whole file is read into an in-memory store on open.
    pub fn load_in_memory(&self) -> bool {
        self.inner.load_in_memory.load(Ordering::Relaxed)
    }

    pub fn event_listeners(&self) -> Vec<StoreEventListener> {
        self.inner
            .event_listeners
            .read_with(|listeners| listeners.iter().cloned().collect())
    }

    pub(crate) fn set_file_path(&self, file_path: &str) {
        self.inner
            .file_path
            .write_with(|path| *path = file_path.to_string())
    }

    pub(crate) fn set_read_only(&self, read_only: bool) {
        self.inner.read_only.store(read_only, Ordering::Relaxed)
    }

    pub(crate) fn set_create_if_missing(&self, create: bool) {
        self.inner.create_if_missing.store(create, Ordering::Relaxed)
    }

    pub(crate) fn set_cache_size(&self, size: usize) {
        self.inner.cache_size.store(size, Ordering::Relaxed)
    }

    pub(crate) fn set_load_in_memory(&self, load: bool) {
        self.inner.load_in_memory.store(load, Ordering::Relaxed)
    }
}

impl StoreConfigProvider for FileStoreConfig {
    fn file_path(&self) -> String {
        self.inner.file_path.read_with(|path| path.clone())
    }

    fn is_read_only(&self) -> bool {
        self.inner.read_only.load(Ordering::Relaxed)
    }

    fn add_store_listener(&self, listener: StoreEventListener) {
        self.inner
            .event_listeners
            .write_with(|listeners| listeners.push(listener))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

struct FileStoreConfigInner {
    file_path: Atomic<String>,
    read_only: AtomicBool,
    create_if_missing: AtomicBool,
    cache_size: AtomicUsize,
    load_in_memory: AtomicBool,
    event_listeners: Atomic<Vec<StoreEventListener>>,
}

impl FileStoreConfigInner {
    fn new() -> FileStoreConfigInner {
        FileStoreConfigInner {
            file_path: atomic(String::new()),
            read_only: AtomicBool::new(false),
            create_if_missing: AtomicBool::new(true),
            cache_size: AtomicUsize::new(DEFAULT_CACHE_SIZE),
            load_in_memory: AtomicBool::new(false),
            event_listeners: atomic(Vec::new()),
        }
    }
}
