use crate::common::NO_NODE;
use crate::entity::{Entity, EntityCodec, EntityNode, IndexHeader};
use crate::entity_index::EntityIndexInner;
use crate::errors::{ErrorKind, IndexError, IndexResult};
use crate::store::check_node_id;
use crate::transaction::{
    duplicate_key_error, not_active_error, stale_error, EntityReader, IndexSnapshot,
    TransactionState,
};
use crate::tree::{detach, find_path, insert, NodeSink, NodeSource};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::atomic;
use std::sync::Arc;

/// A copy-on-write unit of work over an entity index.
///
/// # Purpose
/// Every change to an index happens inside a transaction. The tree algorithms
/// run against the transaction's own view: nodes it has rewritten are kept in
/// a change set keyed by id and the header is a private copy. Nothing reaches
/// the store before [`EntityTransaction::commit`].
///
/// # Concurrency
/// A transaction is pinned to the index version it started from. Reads that
/// miss the change set go to the store and fail with
/// [`ErrorKind::StaleTransaction`] once another transaction has committed.
/// Commit re-checks the version under the store's write lock, so of two
/// transactions started from the same version only the first to commit wins.
///
/// # Failure
/// If a tree operation fails midway, the change set may be inconsistent and
/// the transaction moves to [`TransactionState::Failed`]. A failed transaction
/// can only be rolled back. Dropping an uncommitted transaction discards its
/// changes.
///
/// # Examples
///
/// ```rust,ignore
/// let mut txn = index.begin_transaction()?;
/// let player = txn.add(&Player::new("Tal, Mikhail"))?;
/// txn.update_stats(player.id(), 1, 17)?;
/// txn.commit()?;
/// ```
pub struct EntityTransaction<E: Entity> {
    snapshot: IndexSnapshot<E>,
    codec: EntityCodec<E>,
    header: IndexHeader,
    changes: BTreeMap<i32, EntityNode>,
    state: TransactionState,
}

impl<E: Entity> EntityTransaction<E> {
    pub(crate) fn begin(index: Arc<EntityIndexInner<E>>) -> IndexResult<Self> {
        let snapshot = IndexSnapshot::new(index)?;
        let codec = snapshot.index().codec.clone();
        let header = snapshot.header().clone();
        log::debug!("Transaction started at version {}", snapshot.version());
        Ok(EntityTransaction {
            snapshot,
            codec,
            header,
            changes: BTreeMap::new(),
            state: TransactionState::Active,
        })
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// Index version this transaction started from.
    pub fn version(&self) -> u64 {
        self.snapshot.version()
    }

    /// The header as it will be written on commit.
    pub fn header(&self) -> &IndexHeader {
        &self.header
    }

    /// Number of nodes rewritten so far.
    pub fn pending_nodes(&self) -> usize {
        self.changes.len()
    }

    /// Stores a new entity and returns it with its assigned id.
    ///
    /// The id of the most recently deleted entity is reused first; otherwise
    /// the index grows by one slot.
    pub fn add(&mut self, entity: &E) -> IndexResult<E> {
        self.check_writable()?;
        let bytes = self.codec.encode(entity)?;
        let result = self.insert_new(entity, bytes);
        self.fail_on_error(result)
    }

    /// Replaces the entity stored under `id`.
    ///
    /// The id stays the same. If the key changed, the node is moved to its
    /// new position in the tree.
    pub fn put_by_id(&mut self, id: i32, entity: &E) -> IndexResult<E> {
        self.check_writable()?;
        let node = self.live_entity_node(id)?;
        let bytes = self.codec.encode(entity)?;
        let current = self.codec.decode_node(&node)?;

        if current.compare_key(entity) == Ordering::Equal {
            self.put(node.with_entity(bytes));
        } else {
            let result = self.relink(id, bytes, entity);
            self.fail_on_error(result)?;
        }
        Ok(entity.with_id(id))
    }

    /// Replaces the entity sharing the key of `entity`, or adds it if no
    /// entity has that key.
    ///
    /// Fails with [`ErrorKind::DuplicateKey`] if several entities share the key.
    pub fn put_by_key(&mut self, entity: &E) -> IndexResult<E> {
        self.check_writable()?;
        let matches = self.get_all_by_key(entity)?;
        match matches.as_slice() {
            [] => self.add(entity),
            [current] => self.put_by_id(current.id(), entity),
            _ => Err(duplicate_key_error(matches.len())),
        }
    }

    /// Deletes the entity with `id`.
    ///
    /// Returns `false` if the id is `-1` or already deleted.
    pub fn delete_by_id(&mut self, id: i32) -> IndexResult<bool> {
        self.check_writable()?;
        if id == NO_NODE {
            return Ok(false);
        }
        check_node_id(id, self.header.capacity())?;
        if self.node(id)?.is_deleted() {
            return Ok(false);
        }
        let result = self.unlink(id);
        self.fail_on_error(result)
    }

    /// Deletes the entity whose key equals `key`.
    ///
    /// Returns `false` if there is none; fails with [`ErrorKind::DuplicateKey`]
    /// if several entities share the key.
    pub fn delete_by_key(&mut self, key: &E) -> IndexResult<bool> {
        self.check_writable()?;
        let matches = self.get_all_by_key(key)?;
        match matches.as_slice() {
            [] => Ok(false),
            [current] => self.delete_by_id(current.id()),
            _ => Err(duplicate_key_error(matches.len())),
        }
    }

    /// Rewrites the usage count and first reference id of entity `id`.
    ///
    /// Only the statistics bytes change; the tree is left as it is.
    pub fn update_stats(&mut self, id: i32, usage_count: i32, first_reference_id: i32) -> IndexResult<E> {
        self.check_writable()?;
        let mut node = self.live_entity_node(id)?;
        self.codec
            .write_stats(node.serialized_entity_mut(), usage_count, first_reference_id);
        let entity = self.codec.decode_node(&node)?;
        self.put(node);
        Ok(entity)
    }

    /// Flushes the change set and the header to the store in one batch.
    ///
    /// Fails with [`ErrorKind::StaleTransaction`] if another transaction has
    /// committed since this one began; the store is then left untouched. A
    /// transaction without changes commits without advancing the version.
    pub fn commit(&mut self) -> IndexResult<()> {
        if self.flush()? {
            // listeners may read the index, so the lock is released first
            self.snapshot.index().store.commit()?;
        }
        Ok(())
    }

    /// Writes the change set under the index lock without raising the commit
    /// event. Returns whether anything was written.
    pub(crate) fn flush(&mut self) -> IndexResult<bool> {
        if !self.state.is_active() {
            return Err(not_active_error(self.state));
        }

        let index = self.snapshot.index().clone();
        let written = {
            let _guard = index.lock.write();
            let live_version = index.version.load(atomic::Ordering::SeqCst);
            if live_version != self.version() {
                self.state = TransactionState::Failed;
                return Err(stale_error(self.version(), live_version));
            }

            if self.changes.is_empty() {
                self.state = TransactionState::Committed;
                log::debug!("Transaction at version {} had nothing to commit", live_version);
                return Ok(false);
            }

            let nodes: Vec<EntityNode> = self.changes.values().cloned().collect();
            if let Err(err) = index.store.write_batch(&self.header, &nodes) {
                log::error!("Failed to write transaction: {}", err);
                self.state = TransactionState::Failed;
                return Err(err);
            }
            index.version.fetch_add(1, atomic::Ordering::SeqCst);
            nodes.len()
        };

        self.state = TransactionState::Committed;
        self.changes.clear();
        log::debug!(
            "Committed {} nodes, index is at version {}",
            written,
            self.version() + 1
        );
        Ok(true)
    }

    /// Discards every change. Rolling back twice is allowed.
    pub fn rollback(&mut self) -> IndexResult<()> {
        match self.state {
            TransactionState::Committed => Err(not_active_error(self.state)),
            TransactionState::RolledBack => Ok(()),
            TransactionState::Active | TransactionState::Failed => {
                log::debug!("Rolling back {} pending nodes", self.changes.len());
                self.changes.clear();
                self.header = self.snapshot.header().clone();
                self.state = TransactionState::RolledBack;
                Ok(())
            }
        }
    }

    fn check_writable(&self) -> IndexResult<()> {
        if !self.state.is_active() {
            return Err(not_active_error(self.state));
        }
        if self.snapshot.index().store.is_read_only()? {
            log::error!("Attempt to modify a read-only index");
            return Err(IndexError::new(
                "Index is opened read-only",
                ErrorKind::InvalidOperation,
            ));
        }
        Ok(())
    }

    fn fail_on_error<T>(&mut self, result: IndexResult<T>) -> IndexResult<T> {
        if let Err(err) = &result {
            log::error!("Transaction failed: {}", err);
            self.state = TransactionState::Failed;
        }
        result
    }

    fn live_entity_node(&self, id: i32) -> IndexResult<EntityNode> {
        check_node_id(id, self.header.capacity())?;
        let node = self.node(id)?;
        if node.is_deleted() {
            log::error!("Entity {} is deleted", id);
            return Err(IndexError::new(
                &format!("Entity {} is deleted", id),
                ErrorKind::NotFound,
            ));
        }
        Ok(node)
    }

    fn insert_new(&mut self, entity: &E, bytes: Vec<u8>) -> IndexResult<E> {
        let id = self.allocate_id()?;
        let codec = self.codec.clone();
        insert(self, &codec, EntityNode::leaf(id, bytes), entity)?;
        self.header
            .set_num_live_entities(self.header.num_live_entities() + 1);
        Ok(entity.with_id(id))
    }

    /// Takes the head of the free list, or grows the index by one slot.
    fn allocate_id(&mut self) -> IndexResult<i32> {
        let head = self.header.free_list_head_id();
        if head != NO_NODE {
            let node = self.node(head)?;
            let next = match node.next_free_id() {
                Some(next) => next,
                None => {
                    log::error!("Free list head {} is a live node", head);
                    return Err(IndexError::new(
                        &format!("Free list head {} is a live node", head),
                        ErrorKind::IndexCorrupted,
                    ));
                }
            };
            self.header.set_free_list_head_id(next);
            log::debug!("Reusing deleted id {}", head);
            return Ok(head);
        }

        let id = self.header.capacity();
        if id == i32::MAX {
            log::error!("Index has no ids left");
            return Err(IndexError::new(
                "Index has no ids left",
                ErrorKind::InvalidOperation,
            ));
        }
        self.header.set_capacity(id + 1);
        Ok(id)
    }

    /// Moves node `id` to the position of its new key.
    fn relink(&mut self, id: i32, bytes: Vec<u8>, entity: &E) -> IndexResult<()> {
        let codec = self.codec.clone();
        let path = match find_path(self, &codec, id)? {
            Some(path) => path,
            None => {
                return Err(IndexError::new(
                    &format!("Entity {} vanished while being replaced", id),
                    ErrorKind::InternalError,
                ))
            }
        };
        detach(self, path)?;
        insert(self, &codec, EntityNode::leaf(id, bytes), entity)
    }

    /// Removes node `id` from the tree and pushes it onto the free list.
    fn unlink(&mut self, id: i32) -> IndexResult<bool> {
        let codec = self.codec.clone();
        let path = match find_path(self, &codec, id)? {
            Some(path) => path,
            None => return Ok(false),
        };
        detach(self, path)?;

        let head = self.header.free_list_head_id();
        self.put(EntityNode::deleted(id, head, self.header.entity_byte_size()));
        self.header.set_free_list_head_id(id);
        self.header
            .set_num_live_entities(self.header.num_live_entities() - 1);
        Ok(true)
    }
}

impl<E: Entity> NodeSource for EntityTransaction<E> {
    fn node(&self, id: i32) -> IndexResult<EntityNode> {
        if let Some(node) = self.changes.get(&id) {
            return Ok(node.clone());
        }
        check_node_id(id, self.header.capacity())?;
        self.snapshot.node(id)
    }

    fn root_node_id(&self) -> i32 {
        self.header.root_node_id()
    }

    fn max_depth(&self) -> usize {
        self.snapshot.max_depth()
    }
}

impl<E: Entity> NodeSink for EntityTransaction<E> {
    fn put(&mut self, node: EntityNode) {
        self.changes.insert(node.id(), node);
    }

    fn set_root_node_id(&mut self, id: i32) {
        self.header.set_root_node_id(id);
    }
}

impl<E: Entity> EntityReader<E> for EntityTransaction<E> {
    fn entity_codec(&self) -> &EntityCodec<E> {
        &self.codec
    }

    fn index_header(&self) -> &IndexHeader {
        &self.header
    }
}

impl<E: Entity> Drop for EntityTransaction<E> {
    fn drop(&mut self) {
        if self.state.is_active() && !self.changes.is_empty() {
            log::debug!(
                "Discarding {} uncommitted nodes of transaction at version {}",
                self.changes.len(),
                self.version()
            );
        }
    }
}
