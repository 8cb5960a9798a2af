use crate::errors::IndexResult;
use crate::store::file::{FileNodeStore, FileStoreConfig};
use crate::store::memory::{InMemoryNodeStore, InMemoryStoreConfig};
use crate::store::{NodeStore, StoreConfigProvider, StoreEventListener, StoreModule};

/// Store module opening an index kept in a single file.
///
/// # Examples
///
/// ```rust,no_run
/// use entity_index::store::file::FileStoreModule;
///
/// let module = FileStoreModule::with_config()
///     .file_path("/data/players.idx")
///     .cache_size(4096)
///     .build();
/// # let _ = module;
/// ```
///
/// With [`FileStoreModuleBuilder::load_in_memory`] the whole file is read
/// into an in-memory store when the index opens. Changes made to such an
/// index are never written back to the file.
pub struct FileStoreModule {
    store_config: FileStoreConfig,
}

impl FileStoreModule {
    pub fn with_config() -> FileStoreModuleBuilder {
        FileStoreModuleBuilder::new()
    }

    pub fn store_config(&self) -> FileStoreConfig {
        self.store_config.clone()
    }
}

impl StoreModule for FileStoreModule {
    fn get_store(&self) -> IndexResult<NodeStore> {
        if !self.store_config.load_in_memory() {
            return Ok(NodeStore::new(FileNodeStore::new(self.store_config.clone())));
        }

        let file_path = self.store_config.file_path();
        let (header, nodes) = FileNodeStore::read_index(&file_path)?;
        let memory_config = InMemoryStoreConfig::new();
        for listener in self.store_config.event_listeners() {
            memory_config.add_store_listener(listener);
        }
        log::debug!(
            "Loaded {} slots of {} into memory",
            header.capacity(),
            file_path
        );
        let store = InMemoryNodeStore::preloaded(memory_config, header, nodes)?;
        Ok(NodeStore::new(store))
    }
}

pub struct FileStoreModuleBuilder {
    store_config: FileStoreConfig,
}

impl Default for FileStoreModuleBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl FileStoreModuleBuilder {
    pub fn new() -> FileStoreModuleBuilder {
        FileStoreModuleBuilder {
            store_config: FileStoreConfig::new(),
        }
    }

    pub fn file_path(self, file_path: &str) -> Self {
        self.store_config.set_file_path(file_path);
        self
    }

    /// Opens the file without write access; every write fails.
    pub fn read_only(self, read_only: bool) -> Self {
        self.store_config.set_read_only(read_only);
        self
    }

    pub fn create_if_missing(self, create: bool) -> Self {
        self.store_config.set_create_if_missing(create);
        self
    }

    /// Number of nodes kept in the LRU read cache, `0` to disable it.
    pub fn cache_size(self, size: usize) -> Self {
        self.store_config.set_cache_size(size);
        self
    }

    pub fn load_in_memory(self, load: bool) -> Self {
        self.store_config.set_load_in_memory(load);
        self
    }

    pub fn add_event_listener(self, listener: StoreEventListener) -> Self {
        self.store_config.add_store_listener(listener);
        self
    }

    pub fn build(self) -> FileStoreModule {
        FileStoreModule {
            store_config: self.store_config,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityNode;
    use crate::errors::ErrorKind;

    fn temp_path() -> String {
        std::env::temp_dir()
            .join(format!("{}.idx", uuid::Uuid::new_v4()))
            .to_string_lossy()
            .to_string()
    }

    #[test]
    fn test_builder_sets_config() {
        let module = FileStoreModule::with_config()
            .file_path("/data/events.idx")
            .read_only(true)
            .create_if_missing(false)
            .cache_size(12)
            .load_in_memory(true)
            .add_event_listener(StoreEventListener::new(|_| Ok(())))
            .build();

        let config = module.store_config();
        assert_eq!(config.file_path(), "/data/events.idx");
        assert!(config.is_read_only());
        assert!(!config.create_if_missing());
        assert_eq!(config.cache_size(), 12);
        assert!(config.load_in_memory());
        assert_eq!(config.event_listeners().len(), 1);
    }

    #[test]
    fn test_get_store_returns_file_store() {
        let path = temp_path();
        let module = FileStoreModule::with_config().file_path(&path).build();
        let store = module.get_store().unwrap();
        assert!(store.store_version().unwrap().starts_with("File/"));
        store.open_or_create(4).unwrap();
        store.close().unwrap();
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_load_in_memory_never_writes_back() {
        let path = temp_path();
        let file_store = FileStoreModule::with_config()
            .file_path(&path)
            .build()
            .get_store()
            .unwrap();
        let mut header = file_store.open_or_create(1).unwrap();
        header.set_capacity(1);
        header.set_root_node_id(0);
        header.set_num_live_entities(1);
        file_store
            .write_batch(&header, &[EntityNode::leaf(0, vec![1])])
            .unwrap();
        file_store.close().unwrap();

        let memory_store = FileStoreModule::with_config()
            .file_path(&path)
            .load_in_memory(true)
            .build()
            .get_store()
            .unwrap();
        assert!(memory_store.store_version().unwrap().starts_with("InMemory/"));
        assert_eq!(memory_store.open_or_create(1).unwrap(), header);
        memory_store
            .put_node(&EntityNode::leaf(0, vec![2]))
            .unwrap();
        memory_store.close().unwrap();

        let (_, nodes) = FileNodeStore::read_index(&path).unwrap();
        assert_eq!(nodes[0].serialized_entity(), &[1]);
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_load_in_memory_requires_existing_file() {
        let module = FileStoreModule::with_config()
            .file_path(&temp_path())
            .load_in_memory(true)
            .build();
        let err = module.get_store().err().unwrap();
        assert_eq!(err.kind(), &ErrorKind::FileNotFound);
    }
}
