use crate::common::{SortOrder, NO_NODE};
use crate::entity::{Entity, EntityCodec, IndexHeader};
use crate::errors::{ErrorKind, IndexError, IndexResult};
use crate::iters::KeyOrderIterator;
use crate::store::check_node_id;
use crate::tree::{
    find_all_by_key, live_node, lower_bound, upper_bound, validate_tree, NodePath, NodeSource,
    ValidationReport,
};

/// Queries shared by snapshots and transactions.
///
/// Implementors only say where nodes come from and which header describes
/// them; every query is built on top of that.
pub trait EntityReader<E: Entity>: NodeSource {
    fn entity_codec(&self) -> &EntityCodec<E>;

    /// Header describing the nodes this reader sees.
    fn index_header(&self) -> &IndexHeader;

    /// Number of live entities.
    fn count(&self) -> i32 {
        self.index_header().num_live_entities()
    }

    /// Number of allocated ids, live and deleted.
    fn capacity(&self) -> i32 {
        self.index_header().capacity()
    }

    /// Returns the entity with `id`, or `None` if the id is deleted or `-1`.
    ///
    /// Ids outside of `[0, capacity)` are an [`ErrorKind::InvalidId`] error.
    fn get(&self, id: i32) -> IndexResult<Option<E>> {
        if id == NO_NODE {
            return Ok(None);
        }
        check_node_id(id, self.capacity())?;
        let node = self.node(id)?;
        if node.is_deleted() {
            return Ok(None);
        }
        self.entity_codec().decode_node(&node).map(Some)
    }

    /// Returns the single entity whose key equals `key`.
    ///
    /// Fails with [`ErrorKind::DuplicateKey`] if several entities share the key.
    fn get_by_key(&self, key: &E) -> IndexResult<Option<E>> {
        let mut matches = self.get_all_by_key(key)?;
        match matches.len() {
            0 | 1 => Ok(matches.pop()),
            found => Err(duplicate_key_error(found)),
        }
    }

    /// Every entity whose key equals `key`, in tree order.
    fn get_all_by_key(&self, key: &E) -> IndexResult<Vec<E>> {
        find_all_by_key(self, self.entity_codec(), key)
    }

    /// The first entity whose key is not less than `key`.
    fn lower_bound(&self, key: &E) -> IndexResult<Option<E>> {
        let path = lower_bound(self, self.entity_codec(), key)?;
        self.entity_at(&path)
    }

    /// The first entity whose key is greater than `key`.
    fn upper_bound(&self, key: &E) -> IndexResult<Option<E>> {
        let path = upper_bound(self, self.entity_codec(), key)?;
        self.entity_at(&path)
    }

    /// The entity with the smallest key.
    fn first(&self) -> IndexResult<Option<E>> {
        let path = NodePath::begin(self)?;
        self.entity_at(&path)
    }

    /// The entity with the largest key.
    fn last(&self) -> IndexResult<Option<E>> {
        let path = NodePath::last(self)?;
        self.entity_at(&path)
    }

    /// Decodes the entity at `path`, `None` for end.
    fn entity_at(&self, path: &NodePath) -> IndexResult<Option<E>> {
        if path.is_end() {
            return Ok(None);
        }
        let node = live_node(self, path.node_id())?;
        self.entity_codec().decode_node(&node).map(Some)
    }

    /// Ids on the free list, most recently deleted first.
    fn deleted_ids(&self) -> IndexResult<Vec<i32>> {
        let capacity = self.capacity();
        let mut ids = Vec::new();
        let mut next_id = self.index_header().free_list_head_id();
        while next_id != NO_NODE {
            if ids.len() as i32 >= capacity {
                log::error!("Free list does not end within {} nodes", capacity);
                return Err(IndexError::new(
                    "Free list contains a cycle",
                    ErrorKind::IndexCorrupted,
                ));
            }
            check_node_id(next_id, capacity)?;
            let node = self.node(next_id)?;
            ids.push(next_id);
            next_id = match node.next_free_id() {
                Some(next) => next,
                None => {
                    log::error!("Free list links live node {}", next_id);
                    return Err(IndexError::new(
                        &format!("Free list links live node {}", next_id),
                        ErrorKind::IndexCorrupted,
                    ));
                }
            };
        }
        Ok(ids)
    }

    /// Checks the tree and the free list against every structural invariant.
    fn validate_structure(&self) -> IndexResult<ValidationReport> {
        validate_tree(self, self.entity_codec(), self.index_header())
    }

    fn iter_ascending(&self) -> IndexResult<KeyOrderIterator<E, &Self>>
    where
        Self: Sized,
    {
        self.iter_range(None, None)
    }

    fn iter_descending(&self) -> IndexResult<KeyOrderIterator<E, &Self>>
    where
        Self: Sized,
    {
        self.iter_range_descending(None, None)
    }

    /// Entities with `start <= key < end` in ascending key order.
    /// A missing bound leaves that side open.
    fn iter_range(&self, start: Option<&E>, end: Option<&E>) -> IndexResult<KeyOrderIterator<E, &Self>>
    where
        Self: Sized,
    {
        KeyOrderIterator::new(
            self,
            self.entity_codec().clone(),
            start,
            end,
            SortOrder::Ascending,
        )
    }

    /// Entities with `end < key <= start` in descending key order.
    /// A missing bound leaves that side open.
    fn iter_range_descending(
        &self,
        start: Option<&E>,
        end: Option<&E>,
    ) -> IndexResult<KeyOrderIterator<E, &Self>>
    where
        Self: Sized,
    {
        KeyOrderIterator::new(
            self,
            self.entity_codec().clone(),
            start,
            end,
            SortOrder::Descending,
        )
    }
}

pub(crate) fn duplicate_key_error(found: usize) -> IndexError {
    log::error!("Key is shared by {} entities", found);
    IndexError::new(
        &format!("Key is shared by {} entities", found),
        ErrorKind::DuplicateKey,
    )
}
