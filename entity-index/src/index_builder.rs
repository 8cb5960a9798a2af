use crate::entity::{Entity, EntityCodec, EntitySerializer};
use crate::entity_index::EntityIndex;
use crate::errors::{IndexError, IndexResult};
use crate::index_config::IndexConfig;
use crate::store::memory::InMemoryStoreModule;
use crate::store::StoreModule;

/// Builder for opening an [`EntityIndex`].
///
/// Errors raised by the setters are captured and returned from
/// [`EntityIndexBuilder::open_or_create`]. Without a store module the index
/// is kept in memory.
///
/// # Examples
///
/// ```rust,ignore
/// use entity_index::index_builder::EntityIndexBuilder;
/// use entity_index::store::file::FileStoreModule;
///
/// let index = EntityIndexBuilder::new(TournamentSerializer)
///     .load_module(FileStoreModule::with_config().file_path("tournaments.idx").build())
///     .batch_size(256)
///     .open_or_create()?;
/// ```
pub struct EntityIndexBuilder<E: Entity> {
    error: Option<IndexError>,
    codec: EntityCodec<E>,
    config: IndexConfig,
}

impl<E: Entity> EntityIndexBuilder<E> {
    pub fn new<S: EntitySerializer<E> + 'static>(serializer: S) -> Self {
        EntityIndexBuilder {
            error: None,
            codec: EntityCodec::new(serializer),
            config: IndexConfig::new(),
        }
    }

    /// Uses the store produced by `module`. Only one module may be loaded.
    pub fn load_module<T: StoreModule>(mut self, module: T) -> Self {
        if self.error.is_none() {
            if let Err(e) = self.config.load_module(module) {
                self.error = Some(e);
            }
        }
        self
    }

    /// Nodes fetched per ranged read by id-ordered iteration and copies.
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        if self.error.is_none() {
            if let Err(e) = self.config.set_batch_size(batch_size) {
                self.error = Some(e);
            }
        }
        self
    }

    /// Tree depth past which the index is reported corrupt.
    pub fn max_depth(mut self, max_depth: usize) -> Self {
        if self.error.is_none() {
            if let Err(e) = self.config.set_max_depth(max_depth) {
                self.error = Some(e);
            }
        }
        self
    }

    /// Opens the index, creating an empty one if the store holds none.
    pub fn open_or_create(self) -> IndexResult<EntityIndex<E>> {
        if let Some(error) = self.error {
            return Err(error);
        }

        let store = match self.config.node_store() {
            Some(store) => store,
            None => InMemoryStoreModule::new().get_store()?,
        };
        let store_config = store.store_config()?;
        if store_config.is_in_memory() {
            log::debug!("Opening entity index in memory");
        } else {
            log::debug!("Opening entity index at {}", store_config.file_path());
        }
        EntityIndex::open(store, self.codec, self.config)
    }
}
