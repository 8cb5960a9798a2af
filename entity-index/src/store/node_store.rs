use crate::common::SubscriberRef;
use crate::entity::{EntityNode, IndexHeader};
use crate::errors::{ErrorKind, IndexError, IndexResult};
use crate::store::{StoreConfig, StoreEventListener};
use std::ops::Deref;
use std::sync::Arc;

/// Persists fixed-size tree nodes by id together with the index header.
///
/// # Purpose
/// The single source of truth of an entity index. Transactions never touch
/// a store until they commit; a commit hands the whole change set over in
/// one [`NodeStoreProvider::write_batch`] call.
///
/// # Ids
/// Valid ids are `0..capacity` where capacity comes from the stored header.
/// Requesting any other id is an [`ErrorKind::InvalidId`] error, never a
/// "not found" result. Deleted nodes are returned like any other node; it is
/// up to the caller to check [`EntityNode::is_deleted`].
///
/// # Implementations
/// - `InMemoryNodeStore`: a growable vector of nodes
/// - `FileNodeStore`: a header followed by fixed-size slots at
///   `header_size + id * slot_size`
pub trait NodeStoreProvider: Send + Sync {
    /// Opens the store, creating an empty index when there is none yet.
    ///
    /// Fails with [`ErrorKind::FileCorrupted`] when an existing index stores
    /// entities of a different size.
    fn open_or_create(&self, entity_byte_size: usize) -> IndexResult<IndexHeader>;

    fn is_closed(&self) -> IndexResult<bool>;

    fn is_read_only(&self) -> IndexResult<bool>;

    /// The last header written to the store.
    fn header(&self) -> IndexResult<IndexHeader>;

    fn get_node(&self, id: i32) -> IndexResult<EntityNode>;

    /// Reads the nodes with ids `start_id..end_id`.
    ///
    /// Must be equivalent to reading each id with [`NodeStoreProvider::get_node`].
    fn get_nodes(&self, start_id: i32, end_id: i32) -> IndexResult<Vec<EntityNode>> {
        let mut nodes = Vec::with_capacity((end_id - start_id).max(0) as usize);
        for id in start_id..end_id {
            nodes.push(self.get_node(id)?);
        }
        Ok(nodes)
    }

    /// Writes one node. Its id must lie inside the stored header's capacity.
    fn put_node(&self, node: &EntityNode) -> IndexResult<()>;

    fn put_header(&self, header: &IndexHeader) -> IndexResult<()>;

    /// Writes a change set: every node, then the header describing them.
    ///
    /// Node ids are checked against the capacity of the new header.
    fn write_batch(&self, header: &IndexHeader, nodes: &[EntityNode]) -> IndexResult<()>;

    /// Makes written data durable and raises the commit event.
    fn commit(&self) -> IndexResult<()>;

    fn close(&self) -> IndexResult<()>;

    fn subscribe(&self, listener: StoreEventListener) -> IndexResult<SubscriberRef>;

    fn unsubscribe(&self, subscriber_ref: SubscriberRef) -> IndexResult<()>;

    fn store_version(&self) -> IndexResult<String>;

    fn store_config(&self) -> IndexResult<StoreConfig>;
}

/// Shared handle to a node store implementation.
#[derive(Clone)]
pub struct NodeStore {
    inner: Arc<dyn NodeStoreProvider>,
}

impl NodeStore {
    pub fn new<T: NodeStoreProvider + 'static>(inner: T) -> Self {
        NodeStore {
            inner: Arc::new(inner),
        }
    }
}

impl Deref for NodeStore {
    type Target = Arc<dyn NodeStoreProvider>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

pub(crate) fn check_node_id(id: i32, capacity: i32) -> IndexResult<()> {
    if id < 0 || id >= capacity {
        log::error!("Node id {} is outside of [0, {})", id, capacity);
        return Err(IndexError::new(
            &format!("Node id {} is outside of [0, {})", id, capacity),
            ErrorKind::InvalidId,
        ));
    }
    Ok(())
}

pub(crate) fn check_entity_size(header: &IndexHeader, entity_byte_size: usize) -> IndexResult<()> {
    if header.entity_byte_size() != entity_byte_size {
        log::error!(
            "Index stores {} byte entities, opened with {} byte entities",
            header.entity_byte_size(),
            entity_byte_size
        );
        return Err(IndexError::new(
            &format!(
                "Index stores {} byte entities but {} bytes were expected",
                header.entity_byte_size(),
                entity_byte_size
            ),
            ErrorKind::FileCorrupted,
        ));
    }
    Ok(())
}

pub(crate) fn check_node_size(node: &EntityNode, header: &IndexHeader) -> IndexResult<()> {
    if node.serialized_entity().len() != header.entity_byte_size() {
        return Err(IndexError::new(
            &format!(
                "Node {} holds {} entity bytes, the index stores {}",
                node.id(),
                node.serialized_entity().len(),
                header.entity_byte_size()
            ),
            ErrorKind::InvalidArgument,
        ));
    }
    Ok(())
}

pub(crate) fn check_range(start_id: i32, end_id: i32, capacity: i32) -> IndexResult<()> {
    if start_id < 0 || end_id > capacity || start_id > end_id {
        log::error!(
            "Node range [{}, {}) is outside of [0, {})",
            start_id,
            end_id,
            capacity
        );
        return Err(IndexError::new(
            &format!(
                "Node range [{}, {}) is outside of [0, {})",
                start_id, end_id, capacity
            ),
            ErrorKind::InvalidId,
        ));
    }
    Ok(())
}

pub(crate) fn closed_error() -> IndexError {
    IndexError::new("Node store is already closed", ErrorKind::StoreAlreadyClosed)
}
