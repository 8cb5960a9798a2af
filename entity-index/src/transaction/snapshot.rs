use crate::entity::{Entity, EntityCodec, EntityNode, IndexHeader};
use crate::entity_index::EntityIndexInner;
use crate::errors::IndexResult;
use crate::store::{check_node_id, check_range};
use crate::transaction::{stale_error, EntityReader};
use crate::tree::NodeSource;
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// Read-only view of an index pinned to one committed version.
///
/// Every read from the store first checks that the index is still at the
/// pinned version and fails with [`crate::errors::ErrorKind::StaleTransaction`]
/// once another transaction has committed. A snapshot therefore never mixes
/// nodes of two versions.
pub struct IndexSnapshot<E: Entity> {
    index: Arc<EntityIndexInner<E>>,
    version: u64,
    header: IndexHeader,
}

impl<E: Entity> IndexSnapshot<E> {
    pub(crate) fn new(index: Arc<EntityIndexInner<E>>) -> IndexResult<Self> {
        let (header, version) = {
            let _guard = index.lock.read();
            let header = index.store.header()?;
            (header, index.version.load(Ordering::SeqCst))
        };
        Ok(IndexSnapshot {
            index,
            version,
            header,
        })
    }

    /// Version of the index this snapshot reads.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn header(&self) -> &IndexHeader {
        &self.header
    }

    pub(crate) fn index(&self) -> &Arc<EntityIndexInner<E>> {
        &self.index
    }

    /// Reads the nodes `start_id..end_id` in one ranged store read.
    pub(crate) fn get_nodes(&self, start_id: i32, end_id: i32) -> IndexResult<Vec<EntityNode>> {
        check_range(start_id, end_id, self.header.capacity())?;
        let _guard = self.index.lock.read();
        self.check_version()?;
        self.index.store.get_nodes(start_id, end_id)
    }

    pub(crate) fn check_version(&self) -> IndexResult<()> {
        let live_version = self.index.version.load(Ordering::SeqCst);
        if live_version != self.version {
            return Err(stale_error(self.version, live_version));
        }
        Ok(())
    }
}

impl<E: Entity> NodeSource for IndexSnapshot<E> {
    fn node(&self, id: i32) -> IndexResult<EntityNode> {
        check_node_id(id, self.header.capacity())?;
        let _guard = self.index.lock.read();
        self.check_version()?;
        self.index.store.get_node(id)
    }

    fn root_node_id(&self) -> i32 {
        self.header.root_node_id()
    }

    fn max_depth(&self) -> usize {
        self.index.config.max_depth()
    }
}

impl<E: Entity> EntityReader<E> for IndexSnapshot<E> {
    fn entity_codec(&self) -> &EntityCodec<E> {
        &self.index.codec
    }

    fn index_header(&self) -> &IndexHeader {
        &self.header
    }
}
