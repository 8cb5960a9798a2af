use crate::errors::IndexResult;
use crate::store::memory::{InMemoryNodeStore, InMemoryStoreConfig};
use crate::store::{NodeStore, StoreConfigProvider, StoreEventListener, StoreModule};

/// Store module opening an index held entirely in memory.
#[derive(Default)]
pub struct InMemoryStoreModule {
    store_config: InMemoryStoreConfig,
}

impl InMemoryStoreModule {
    pub fn new() -> InMemoryStoreModule {
        InMemoryStoreModule {
            store_config: InMemoryStoreConfig::new(),
        }
    }

    pub fn with_config() -> InMemoryStoreModuleBuilder {
        InMemoryStoreModuleBuilder::new()
    }
}

impl StoreModule for InMemoryStoreModule {
    fn get_store(&self) -> IndexResult<NodeStore> {
        let store = InMemoryNodeStore::new(self.store_config.clone());
        Ok(NodeStore::new(store))
    }
}

#[derive(Default)]
pub struct InMemoryStoreModuleBuilder {
    initial_capacity: usize,
    event_listeners: Vec<StoreEventListener>,
}

impl InMemoryStoreModuleBuilder {
    pub fn new() -> InMemoryStoreModuleBuilder {
        InMemoryStoreModuleBuilder {
            initial_capacity: 0,
            event_listeners: Vec::new(),
        }
    }

    /// Reserves room for `capacity` nodes when the store opens.
    pub fn initial_capacity(mut self, capacity: usize) -> Self {
        self.initial_capacity = capacity;
        self
    }

    pub fn add_event_listener(mut self, listener: StoreEventListener) -> Self {
        self.event_listeners.push(listener);
        self
    }

    pub fn build(self) -> InMemoryStoreModule {
        let store_module = InMemoryStoreModule::new();
        store_module
            .store_config
            .set_initial_capacity(self.initial_capacity);
        for listener in self.event_listeners {
            store_module.store_config.add_store_listener(listener);
        }
        store_module
    }
}
