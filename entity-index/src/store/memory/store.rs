use crate::common::{atomic, Atomic, IndexEventBus, ReadExecutor, SubscriberRef, WriteExecutor, NO_NODE};
use crate::entity::{EntityNode, IndexHeader};
use crate::errors::{ErrorKind, IndexError, IndexResult};
use crate::store::memory::InMemoryStoreConfig;
use crate::store::{
    check_entity_size, check_node_id, check_node_size, check_range, closed_error,
    NodeStoreProvider, StoreConfig, StoreEventInfo, StoreEventListener, StoreEvents,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Node store keeping every node in a vector indexed by id.
///
/// # Purpose
/// Used for tests, scratch copies and for indexes loaded completely from a
/// file. Nothing outlives the store; closing it drops all nodes.
///
/// # Usage
/// ```rust
/// use entity_index::store::memory::{InMemoryNodeStore, InMemoryStoreConfig};
/// use entity_index::store::NodeStoreProvider;
///
/// let store = InMemoryNodeStore::new(InMemoryStoreConfig::new());
/// let header = store.open_or_create(16).unwrap();
/// assert_eq!(header.capacity(), 0);
/// ```
#[derive(Clone)]
pub struct InMemoryNodeStore {
    inner: Arc<InMemoryNodeStoreInner>,
}

impl InMemoryNodeStore {
    pub fn new(store_config: InMemoryStoreConfig) -> InMemoryNodeStore {
        InMemoryNodeStore {
            inner: Arc::new(InMemoryNodeStoreInner::new(store_config, None, Vec::new())),
        }
    }

    /// Creates a store already holding an index, e.g. one read from a file.
    ///
    /// `nodes` must hold exactly `header.capacity()` nodes ordered by id.
    pub fn preloaded(
        store_config: InMemoryStoreConfig,
        header: IndexHeader,
        nodes: Vec<EntityNode>,
    ) -> IndexResult<InMemoryNodeStore> {
        if nodes.len() != header.capacity() as usize {
            log::error!(
                "Preloaded store has {} nodes but a capacity of {}",
                nodes.len(),
                header.capacity()
            );
            return Err(IndexError::new(
                &format!(
                    "Expected {} nodes, got {}",
                    header.capacity(),
                    nodes.len()
                ),
                ErrorKind::InvalidArgument,
            ));
        }

        for node in &nodes {
            check_node_size(node, &header)?;
        }

        Ok(InMemoryNodeStore {
            inner: Arc::new(InMemoryNodeStoreInner::new(store_config, Some(header), nodes)),
        })
    }
}

impl NodeStoreProvider for InMemoryNodeStore {
    fn open_or_create(&self, entity_byte_size: usize) -> IndexResult<IndexHeader> {
        self.inner.open_or_create(entity_byte_size)
    }

    fn is_closed(&self) -> IndexResult<bool> {
        Ok(self.inner.closed.load(Ordering::Relaxed))
    }

    fn is_read_only(&self) -> IndexResult<bool> {
        Ok(false)
    }

    fn header(&self) -> IndexResult<IndexHeader> {
        self.inner.header()
    }

    fn get_node(&self, id: i32) -> IndexResult<EntityNode> {
        self.inner.get_node(id)
    }

    fn get_nodes(&self, start_id: i32, end_id: i32) -> IndexResult<Vec<EntityNode>> {
        self.inner.get_nodes(start_id, end_id)
    }

    fn put_node(&self, node: &EntityNode) -> IndexResult<()> {
        self.inner.put_node(node)
    }

    fn put_header(&self, header: &IndexHeader) -> IndexResult<()> {
        self.inner.put_header(header)
    }

    fn write_batch(&self, header: &IndexHeader, nodes: &[EntityNode]) -> IndexResult<()> {
        self.inner.write_batch(header, nodes)
    }

    fn commit(&self) -> IndexResult<()> {
        self.inner.check_open()?;
        self.inner.alert(StoreEvents::Commit);
        Ok(())
    }

    fn close(&self) -> IndexResult<()> {
        self.inner.close()
    }

    fn subscribe(&self, listener: StoreEventListener) -> IndexResult<SubscriberRef> {
        self.inner.event_bus.register(listener)
    }

    fn unsubscribe(&self, subscriber_ref: SubscriberRef) -> IndexResult<()> {
        self.inner.event_bus.deregister(subscriber_ref)
    }

    fn store_version(&self) -> IndexResult<String> {
        Ok(format!("InMemory/{}", env!("CARGO_PKG_VERSION")))
    }

    fn store_config(&self) -> IndexResult<StoreConfig> {
        Ok(StoreConfig::new(self.inner.store_config.clone()))
    }
}

struct InMemoryNodeStoreInner {
    closed: AtomicBool,
    /// Set by the first `open_or_create`; later calls only re-check the header.
    opened: AtomicBool,
    header: Atomic<Option<IndexHeader>>,
    nodes: Atomic<Vec<EntityNode>>,
    event_bus: IndexEventBus<StoreEventInfo, StoreEventListener>,
    store_config: InMemoryStoreConfig,
}

impl InMemoryNodeStoreInner {
    fn new(
        store_config: InMemoryStoreConfig,
        header: Option<IndexHeader>,
        nodes: Vec<EntityNode>,
    ) -> InMemoryNodeStoreInner {
        InMemoryNodeStoreInner {
            closed: AtomicBool::new(false),
            opened: AtomicBool::new(false),
            header: atomic(header),
            nodes: atomic(nodes),
            event_bus: IndexEventBus::new(),
            store_config,
        }
    }

    fn open_or_create(&self, entity_byte_size: usize) -> IndexResult<IndexHeader> {
        if self.closed.load(Ordering::Relaxed) {
            return Err(closed_error());
        }

        let header = self.header.write_with(|slot| {
            if let Some(existing) = slot.as_ref() {
                check_entity_size(existing, entity_byte_size)?;
                return Ok(existing.clone());
            }
            let header = IndexHeader::new(entity_byte_size);
            *slot = Some(header.clone());
            Ok::<_, IndexError>(header)
        })?;

        if self.opened.swap(true, Ordering::SeqCst) {
            return Ok(header);
        }

        let reserve = self.store_config.initial_capacity();
        if reserve > 0 {
            self.nodes.write_with(|nodes| nodes.reserve(reserve));
        }

        for listener in self.store_config.event_listeners() {
            self.event_bus.register(listener)?;
        }

        log::debug!(
            "Opened in-memory node store with {} slots and {} live entities",
            header.capacity(),
            header.num_live_entities()
        );
        self.alert(StoreEvents::Open);
        Ok(header)
    }

    fn check_open(&self) -> IndexResult<IndexHeader> {
        if self.closed.load(Ordering::Relaxed) {
            return Err(closed_error());
        }

        self.header.read_with(|header| match header {
            Some(header) => Ok(header.clone()),
            None => Err(IndexError::new(
                "In-memory node store has not been opened",
                ErrorKind::InvalidOperation,
            )),
        })
    }

    fn header(&self) -> IndexResult<IndexHeader> {
        self.check_open()
    }

    fn get_node(&self, id: i32) -> IndexResult<EntityNode> {
        let header = self.check_open()?;
        check_node_id(id, header.capacity())?;
        self.nodes
            .read_with(|nodes| nodes.get(id as usize).cloned())
            .ok_or_else(|| self.missing_node_error(id))
    }

    fn get_nodes(&self, start_id: i32, end_id: i32) -> IndexResult<Vec<EntityNode>> {
        let header = self.check_open()?;
        if start_id == end_id {
            return Ok(Vec::new());
        }
        check_range(start_id, end_id, header.capacity())?;
        self.nodes
            .read_with(|nodes| nodes.get(start_id as usize..end_id as usize).map(|n| n.to_vec()))
            .ok_or_else(|| self.missing_node_error(start_id))
    }

    fn put_node(&self, node: &EntityNode) -> IndexResult<()> {
        let header = self.check_open()?;
        check_node_id(node.id(), header.capacity())?;
        check_node_size(node, &header)?;
        self.nodes.write_with(|nodes| {
            nodes[node.id() as usize] = node.clone();
        });
        Ok(())
    }

    fn put_header(&self, header: &IndexHeader) -> IndexResult<()> {
        self.check_open()?;
        self.nodes.write_with(|nodes| fit_to_capacity(nodes, header));
        self.header.write_with(|slot| *slot = Some(header.clone()));
        Ok(())
    }

    fn write_batch(&self, header: &IndexHeader, batch: &[EntityNode]) -> IndexResult<()> {
        self.check_open()?;
        for node in batch {
            check_node_id(node.id(), header.capacity())?;
            check_node_size(node, header)?;
        }

        self.nodes.write_with(|nodes| {
            fit_to_capacity(nodes, header);
            for node in batch {
                nodes[node.id() as usize] = node.clone();
            }
        });
        self.header.write_with(|slot| *slot = Some(header.clone()));
        Ok(())
    }

    fn close(&self) -> IndexResult<()> {
        if self.closed.load(Ordering::Relaxed) {
            return Ok(());
        }

        self.alert(StoreEvents::Closing);
        self.closed.store(true, Ordering::SeqCst);
        self.nodes.write_with(|nodes| nodes.clear());
        self.header.write_with(|header| *header = None);
        self.alert(StoreEvents::Closed);
        self.event_bus.close()?;
        log::debug!("Closed in-memory node store");
        Ok(())
    }

    /// Publishes `event`. The change it reports has already happened, so a
    /// failing listener is logged and not returned.
    fn alert(&self, event: StoreEvents) {
        if let Err(err) = self.event_bus.publish(StoreEventInfo::new(event.clone(), "")) {
            log::error!("Store listener failed on {:?}: {}", event, err);
        }
    }

    /// Error for a slot that vanished under a concurrent close.
    fn missing_node_error(&self, id: i32) -> IndexError {
        if self.closed.load(Ordering::SeqCst) {
            return closed_error();
        }
        log::error!("Node {} is missing from the in-memory store", id);
        IndexError::new(
            &format!("Node {} is missing from the in-memory store", id),
            ErrorKind::IndexCorrupted,
        )
    }
}

/// Grows or shrinks `nodes` to the header's capacity.
///
/// New slots are placeholders outside the free list until a batch fills them.
fn fit_to_capacity(nodes: &mut Vec<EntityNode>, header: &IndexHeader) {
    let capacity = header.capacity() as usize;
    let entity_size = header.entity_byte_size();
    if nodes.len() > capacity {
        nodes.truncate(capacity);
    }
    while nodes.len() < capacity {
        let id = nodes.len() as i32;
        nodes.push(EntityNode::deleted(id, NO_NODE, entity_size));
    }
}
