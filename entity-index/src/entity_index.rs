use crate::common::{LockHandle, SubscriberRef};
use crate::entity::{Entity, EntityCodec, EntitySerializer, IndexHeader};
use crate::errors::{ErrorKind, IndexError, IndexResult};
use crate::index_builder::EntityIndexBuilder;
use crate::index_config::IndexConfig;
use crate::iters::{IdOrderIterator, KeyOrderIterator};
use crate::store::{NodeStore, StoreEventListener};
use crate::transaction::{EntityReader, EntityTransaction, IndexSnapshot};
use crate::tree::ValidationReport;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// An ordered, transactional index of fixed-size entities.
///
/// # Purpose
/// Maps entities to stable integer ids while keeping them ordered by the
/// entity's key in a balanced tree stored over those ids. Entities can be
/// looked up by id or by key and scanned in id or key order.
///
/// # Reads and writes
/// Every read takes a snapshot of the last committed version. Every write
/// method on the index runs in its own transaction that is committed before
/// the method returns. To group several changes, use
/// [`EntityIndex::begin_transaction`]; such a transaction fails to commit if
/// another one committed first.
///
/// # Thread safety
/// `EntityIndex` is a cheap handle; clones share the same store and version.
/// The write methods of the index are serialized among themselves.
///
/// # Examples
///
/// ```rust,ignore
/// use entity_index::entity_index::EntityIndex;
/// use entity_index::store::file::FileStoreModule;
///
/// let index = EntityIndex::builder(PlayerSerializer)
///     .load_module(FileStoreModule::with_config().file_path("players.idx").build())
///     .open_or_create()?;
///
/// let carlsen = index.add(&Player::new("Carlsen, Magnus"))?;
/// assert_eq!(index.get_by_id(carlsen.id())?, Some(carlsen));
///
/// for player in index.iter_ascending()? {
///     println!("{:?}", player?);
/// }
/// ```
pub struct EntityIndex<E: Entity> {
    inner: Arc<EntityIndexInner<E>>,
}

impl<E: Entity> Clone for EntityIndex<E> {
    fn clone(&self) -> Self {
        EntityIndex {
            inner: self.inner.clone(),
        }
    }
}

impl<E: Entity> EntityIndex<E> {
    /// Starts configuring an index for the entities handled by `serializer`.
    pub fn builder<S: EntitySerializer<E> + 'static>(serializer: S) -> EntityIndexBuilder<E> {
        EntityIndexBuilder::new(serializer)
    }

    pub(crate) fn open(store: NodeStore, codec: EntityCodec<E>, config: IndexConfig) -> IndexResult<Self> {
        let header = store.open_or_create(codec.entity_size())?;
        log::debug!(
            "Opened entity index on {} with {} live entities in {} slots",
            store.store_version()?,
            header.num_live_entities(),
            header.capacity()
        );
        Ok(EntityIndex {
            inner: Arc::new(EntityIndexInner {
                store,
                codec,
                config,
                version: AtomicU64::new(0),
                lock: LockHandle::new(),
                writer: Mutex::new(()),
            }),
        })
    }

    /// Number of transactions committed since the index was opened.
    pub fn version(&self) -> u64 {
        self.inner.version.load(Ordering::SeqCst)
    }

    pub fn config(&self) -> IndexConfig {
        self.inner.config.clone()
    }

    pub fn header(&self) -> IndexResult<IndexHeader> {
        self.inner.store.header()
    }

    /// Number of live entities.
    pub fn count(&self) -> IndexResult<i32> {
        Ok(self.header()?.num_live_entities())
    }

    /// Number of allocated ids, live and deleted.
    pub fn capacity(&self) -> IndexResult<i32> {
        Ok(self.header()?.capacity())
    }

    /// Starts a transaction on the current version.
    pub fn begin_transaction(&self) -> IndexResult<EntityTransaction<E>> {
        EntityTransaction::begin(self.inner.clone())
    }

    /// A read-only view of the current version.
    pub fn snapshot(&self) -> IndexResult<IndexSnapshot<E>> {
        IndexSnapshot::new(self.inner.clone())
    }

    pub fn get_by_id(&self, id: i32) -> IndexResult<Option<E>> {
        self.snapshot()?.get(id)
    }

    /// Fails with [`ErrorKind::DuplicateKey`] if several entities share the key.
    pub fn get_by_key(&self, key: &E) -> IndexResult<Option<E>> {
        self.snapshot()?.get_by_key(key)
    }

    pub fn get_all_by_key(&self, key: &E) -> IndexResult<Vec<E>> {
        self.snapshot()?.get_all_by_key(key)
    }

    /// The first entity whose key is not less than `key`.
    pub fn lower_bound(&self, key: &E) -> IndexResult<Option<E>> {
        self.snapshot()?.lower_bound(key)
    }

    /// The first entity whose key is greater than `key`.
    pub fn upper_bound(&self, key: &E) -> IndexResult<Option<E>> {
        self.snapshot()?.upper_bound(key)
    }

    pub fn first(&self) -> IndexResult<Option<E>> {
        self.snapshot()?.first()
    }

    pub fn last(&self) -> IndexResult<Option<E>> {
        self.snapshot()?.last()
    }

    /// Ids on the free list, most recently deleted first.
    pub fn deleted_ids(&self) -> IndexResult<Vec<i32>> {
        self.snapshot()?.deleted_ids()
    }

    pub fn add(&self, entity: &E) -> IndexResult<E> {
        self.write(|txn| txn.add(entity))
    }

    pub fn put_by_id(&self, id: i32, entity: &E) -> IndexResult<E> {
        self.write(|txn| txn.put_by_id(id, entity))
    }

    pub fn put_by_key(&self, entity: &E) -> IndexResult<E> {
        self.write(|txn| txn.put_by_key(entity))
    }

    pub fn delete_by_id(&self, id: i32) -> IndexResult<bool> {
        self.write(|txn| txn.delete_by_id(id))
    }

    pub fn delete_by_key(&self, key: &E) -> IndexResult<bool> {
        self.write(|txn| txn.delete_by_key(key))
    }

    pub fn update_stats(&self, id: i32, usage_count: i32, first_reference_id: i32) -> IndexResult<E> {
        self.write(|txn| txn.update_stats(id, usage_count, first_reference_id))
    }

    /// Entities in id order, read in batches of the configured size.
    pub fn iter_by_id(&self) -> IndexResult<IdOrderIterator<E>> {
        Ok(IdOrderIterator::new(
            self.snapshot()?,
            self.inner.config.batch_size(),
        ))
    }

    pub fn iter_ascending(&self) -> IndexResult<KeyOrderIterator<E, IndexSnapshot<E>>> {
        self.iter_range(None, None)
    }

    pub fn iter_descending(&self) -> IndexResult<KeyOrderIterator<E, IndexSnapshot<E>>> {
        self.iter_range_descending(None, None)
    }

    /// Entities with `start <= key < end` in ascending key order.
    pub fn iter_range(
        &self,
        start: Option<&E>,
        end: Option<&E>,
    ) -> IndexResult<KeyOrderIterator<E, IndexSnapshot<E>>> {
        KeyOrderIterator::new(
            self.snapshot()?,
            self.inner.codec.clone(),
            start,
            end,
            crate::common::SortOrder::Ascending,
        )
    }

    /// Entities with `end < key <= start` in descending key order.
    pub fn iter_range_descending(
        &self,
        start: Option<&E>,
        end: Option<&E>,
    ) -> IndexResult<KeyOrderIterator<E, IndexSnapshot<E>>> {
        KeyOrderIterator::new(
            self.snapshot()?,
            self.inner.codec.clone(),
            start,
            end,
            crate::common::SortOrder::Descending,
        )
    }

    /// Checks the tree and the free list against every structural invariant.
    pub fn validate_structure(&self) -> IndexResult<ValidationReport> {
        let report = self.snapshot()?.validate_structure()?;
        log::debug!("Index is valid: {:?}", report);
        Ok(report)
    }

    /// Writes the header and every slot of this index into `target`.
    ///
    /// `target` is opened for this index's entity size and must be empty.
    /// Ids, the tree shape and the free list are copied unchanged.
    pub fn copy_to(&self, target: &NodeStore) -> IndexResult<()> {
        let snapshot = self.snapshot()?;
        let source_header = snapshot.header();
        let target_header = target.open_or_create(self.inner.codec.entity_size())?;
        if target_header.capacity() != 0 {
            log::error!(
                "Copy target already holds {} slots",
                target_header.capacity()
            );
            return Err(IndexError::new(
                "Copy target is not empty",
                ErrorKind::InvalidOperation,
            ));
        }

        let mut header = target_header;
        header.set_capacity(source_header.capacity());
        header.set_root_node_id(source_header.root_node_id());
        header.set_free_list_head_id(source_header.free_list_head_id());
        header.set_num_live_entities(source_header.num_live_entities());

        let capacity = source_header.capacity();
        let batch_size = self.inner.config.batch_size().min(i32::MAX as usize) as i32;
        let mut start_id = 0;
        while start_id < capacity {
            let end_id = start_id.saturating_add(batch_size).min(capacity);
            let nodes = snapshot.get_nodes(start_id, end_id)?;
            target.write_batch(&header, &nodes)?;
            start_id = end_id;
        }
        if capacity == 0 {
            target.put_header(&header)?;
        }
        target.commit()?;
        log::debug!("Copied {} slots to {}", capacity, target.store_version()?);
        Ok(())
    }

    pub fn subscribe(&self, listener: StoreEventListener) -> IndexResult<SubscriberRef> {
        self.inner.store.subscribe(listener)
    }

    pub fn unsubscribe(&self, subscriber_ref: SubscriberRef) -> IndexResult<()> {
        self.inner.store.unsubscribe(subscriber_ref)
    }

    pub fn is_closed(&self) -> IndexResult<bool> {
        self.inner.store.is_closed()
    }

    /// Closes the store. Open transactions and iterators fail afterwards.
    ///
    /// The index lock is not held while the store closes, so close listeners
    /// may still read the index. Reads racing the close fail with
    /// [`ErrorKind::StoreAlreadyClosed`].
    pub fn close(&self) -> IndexResult<()> {
        self.inner.store.close()
    }

    /// Runs `op` in a transaction of its own and commits it.
    ///
    /// The commit event is raised after the writer guard is released, so a
    /// listener may write to the index again.
    fn write<T>(&self, op: impl FnOnce(&mut EntityTransaction<E>) -> IndexResult<T>) -> IndexResult<T> {
        let (result, written) = {
            let _writer = self.inner.writer.lock();
            let mut txn = self.begin_transaction()?;
            let result = op(&mut txn)?;
            let written = txn.flush()?;
            (result, written)
        };
        if written {
            self.inner.store.commit()?;
        }
        Ok(result)
    }
}

/// State shared by an index and its transactions, snapshots and iterators.
pub(crate) struct EntityIndexInner<E: Entity> {
    pub(crate) store: NodeStore,
    pub(crate) codec: EntityCodec<E>,
    pub(crate) config: IndexConfig,
    /// Bumped under the write side of `lock` by every commit.
    pub(crate) version: AtomicU64,
    pub(crate) lock: LockHandle,
    /// Serializes the auto-committing writes of [`EntityIndex`].
    pub(crate) writer: Mutex<()>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::{InMemoryNodeStore, InMemoryStoreConfig};
    use crate::store::StoreEvents;
    use crate::test_support::{keys_in_order, memory_index, Rating, RatingSerializer};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::sync::atomic::{AtomicBool, AtomicUsize};

    #[test]
    fn test_add_assigns_consecutive_ids() {
        let index = memory_index();
        for (expected, key) in [30, 10, 20].iter().enumerate() {
            let added = index.add(&Rating::new(*key)).unwrap();
            assert_eq!(added.id, expected as i32);
        }
        assert_eq!(index.count().unwrap(), 3);
        assert_eq!(index.capacity().unwrap(), 3);
        assert_eq!(index.version(), 3);
    }

    #[test]
    fn test_lookup_by_id_and_key_round_trip() {
        let index = memory_index();
        let mut rating = Rating::labelled(2700, "Kasparov");
        rating.count = 4;
        rating.first_ref = 99;
        let added = index.add(&rating).unwrap();

        assert_eq!(index.get_by_id(added.id).unwrap(), Some(added.clone()));
        assert_eq!(index.get_by_key(&Rating::new(2700)).unwrap(), Some(added));
        assert!(index.get_by_key(&Rating::new(1)).unwrap().is_none());
    }

    #[test]
    fn test_deleting_former_root_keeps_balance() {
        let index = memory_index();
        let mut sorted = Vec::new();
        for key in [5, 3, 8, 1, 4, 7, 9, 2, 6] {
            index.add(&Rating::new(key)).unwrap();
            sorted.push(key);
            sorted.sort();
            index.validate_structure().unwrap();
            assert_eq!(keys_in_order(&index), sorted);
        }

        assert!(index.delete_by_key(&Rating::new(5)).unwrap());
        let report = index.validate_structure().unwrap();
        assert_eq!(report.live_entities, 8);
        assert_eq!(report.deleted_entities, 1);
        assert_eq!(keys_in_order(&index), vec![1, 2, 3, 4, 6, 7, 8, 9]);
    }

    #[test]
    fn test_delete_then_add_reuses_id() {
        let index = memory_index();
        for key in [1, 2, 3] {
            index.add(&Rating::new(key)).unwrap();
        }
        assert!(index.delete_by_id(1).unwrap());
        assert_eq!(index.deleted_ids().unwrap(), vec![1]);

        let added = index.add(&Rating::new(4)).unwrap();
        assert_eq!(added.id, 1);
        assert_eq!(index.capacity().unwrap(), 3);
        assert!(index.deleted_ids().unwrap().is_empty());
    }

    #[test]
    fn test_failed_write_commits_nothing() {
        let index = memory_index();
        index.add(&Rating::new(1)).unwrap();
        index.add(&Rating::new(1)).unwrap();
        let version = index.version();

        let err = index.delete_by_key(&Rating::new(1)).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::DuplicateKey);
        assert_eq!(index.version(), version);
        assert_eq!(index.count().unwrap(), 2);
    }

    #[test]
    fn test_bounds_and_extremes() {
        let index = memory_index();
        assert!(index.first().unwrap().is_none());
        for key in [40, 10, 30, 20] {
            index.add(&Rating::new(key)).unwrap();
        }
        assert_eq!(index.first().unwrap().unwrap().key, 10);
        assert_eq!(index.last().unwrap().unwrap().key, 40);
        assert_eq!(index.lower_bound(&Rating::new(25)).unwrap().unwrap().key, 30);
        assert_eq!(index.upper_bound(&Rating::new(30)).unwrap().unwrap().key, 40);
        assert!(index.lower_bound(&Rating::new(41)).unwrap().is_none());
    }

    #[test]
    fn test_clones_share_state() {
        let index = memory_index();
        let clone = index.clone();
        index.add(&Rating::new(1)).unwrap();
        assert_eq!(clone.count().unwrap(), 1);
        assert_eq!(clone.version(), index.version());
    }

    #[test]
    fn test_copy_to_preserves_ids_and_free_list() {
        let index = memory_index();
        for key in [5, 1, 9, 3, 7] {
            index.add(&Rating::new(key)).unwrap();
        }
        index.delete_by_id(2).unwrap();

        let target = NodeStore::new(InMemoryNodeStore::new(InMemoryStoreConfig::new()));
        index.copy_to(&target).unwrap();

        let copy = EntityIndex::open(
            target.clone(),
            EntityCodec::new(RatingSerializer),
            IndexConfig::new(),
        )
        .unwrap();
        assert_eq!(copy.header().unwrap(), index.header().unwrap());
        assert_eq!(copy.deleted_ids().unwrap(), vec![2]);
        assert_eq!(keys_in_order(&copy), vec![1, 3, 5, 7]);
        assert_eq!(copy.get_by_id(4).unwrap().unwrap().key, 7);
        copy.validate_structure().unwrap();
    }

    #[test]
    fn test_copy_to_rejects_non_empty_target() {
        let index = memory_index();
        index.add(&Rating::new(1)).unwrap();
        let target = NodeStore::new(InMemoryNodeStore::new(InMemoryStoreConfig::new()));
        index.copy_to(&target).unwrap();

        let err = index.copy_to(&target).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::InvalidOperation);
    }

    #[test]
    fn test_commit_raises_store_event() {
        let index = memory_index();
        let commits = Arc::new(AtomicUsize::new(0));
        let counter = commits.clone();
        let subscriber = index
            .subscribe(StoreEventListener::new(move |info| {
                if info.event() == StoreEvents::Commit {
                    counter.fetch_add(1, Ordering::SeqCst);
                }
                Ok(())
            }))
            .unwrap();

        index.add(&Rating::new(1)).unwrap();
        index.add(&Rating::new(2)).unwrap();
        awaitility::at_most(std::time::Duration::from_secs(1))
            .until(|| commits.load(Ordering::SeqCst) == 2);

        index.unsubscribe(subscriber).unwrap();
        index.add(&Rating::new(3)).unwrap();
        assert_eq!(commits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_random_workload_stays_valid() {
        let index = memory_index();
        let mut rng = StdRng::seed_from_u64(7);
        let mut live: Vec<(i32, i32)> = Vec::new();

        for _ in 0..400 {
            if live.is_empty() || rng.gen_bool(0.6) {
                let key = rng.gen_range(0..100);
                let added = index.add(&Rating::new(key)).unwrap();
                live.push((added.id, key));
            } else {
                let (id, _) = live.swap_remove(rng.gen_range(0..live.len()));
                assert!(index.delete_by_id(id).unwrap());
            }

            let report = index.validate_structure().unwrap();
            assert_eq!(report.live_entities as usize, live.len());
            let bound = 1.45 * ((live.len() + 2) as f64).log2();
            assert!(
                report.height as f64 <= bound,
                "height {} exceeds {:.2} for {} entities",
                report.height,
                bound,
                live.len()
            );
        }

        let mut expected: Vec<i32> = live.iter().map(|(_, key)| *key).collect();
        expected.sort();
        assert_eq!(keys_in_order(&index), expected);
        for (id, key) in &live {
            assert_eq!(index.get_by_id(*id).unwrap().unwrap().key, *key);
        }
    }

    fn entities_by_id(index: &EntityIndex<Rating>) -> Vec<Rating> {
        index.iter_by_id().unwrap().map(|r| r.unwrap()).collect()
    }

    #[test]
    fn test_add_then_delete_restores_state() {
        let index = memory_index();
        for key in [50, 20, 80, 10, 30, 70, 90, 25] {
            index.add(&Rating::new(key)).unwrap();
        }
        assert!(index.delete_by_key(&Rating::new(80)).unwrap());

        let count = index.count().unwrap();
        let keys = keys_in_order(&index);
        let entities = entities_by_id(&index);
        let deleted = index.deleted_ids().unwrap();

        for key in [5, 27, 60, 95] {
            let added = index.add(&Rating::new(key)).unwrap();
            assert!(index.delete_by_id(added.id).unwrap());

            assert_eq!(index.count().unwrap(), count);
            assert_eq!(keys_in_order(&index), keys);
            assert_eq!(entities_by_id(&index), entities);
            assert_eq!(index.deleted_ids().unwrap(), deleted);
            index.validate_structure().unwrap();
        }
    }

    #[test]
    fn test_failing_listener_does_not_fail_commit() {
        let index = memory_index();
        index
            .subscribe(StoreEventListener::new(|_| {
                Err(IndexError::new("listener failed", ErrorKind::EventError))
            }))
            .unwrap();

        let added = index.add(&Rating::new(1)).unwrap();
        assert_eq!(index.count().unwrap(), 1);
        assert_eq!(index.version(), 1);
        assert_eq!(index.get_by_id(added.id).unwrap(), Some(added));

        let mut txn = index.begin_transaction().unwrap();
        txn.add(&Rating::new(2)).unwrap();
        assert!(txn.commit().is_ok());
        assert_eq!(index.count().unwrap(), 2);
    }

    #[test]
    fn test_commit_listener_can_write() {
        let index = memory_index();
        let writer = index.clone();
        let wrote = Arc::new(AtomicBool::new(false));
        let flag = wrote.clone();
        index
            .subscribe(StoreEventListener::new(move |info| {
                if info.event() == StoreEvents::Commit && !flag.swap(true, Ordering::SeqCst) {
                    writer.add(&Rating::new(99))?;
                }
                Ok(())
            }))
            .unwrap();

        index.add(&Rating::new(1)).unwrap();
        awaitility::at_most(std::time::Duration::from_secs(2))
            .until(|| index.count().unwrap() == 2);
        assert_eq!(keys_in_order(&index), vec![1, 99]);
        assert!(wrote.load(Ordering::SeqCst));
        index.close().unwrap();
    }

    #[test]
    fn test_close_listener_can_read() {
        let index = memory_index();
        index.add(&Rating::new(1)).unwrap();
        index.add(&Rating::new(2)).unwrap();

        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        let reader = index.clone();
        index
            .subscribe(StoreEventListener::new(move |info| {
                if info.event() == StoreEvents::Closing {
                    counter.store(reader.count()? as usize, Ordering::SeqCst);
                }
                Ok(())
            }))
            .unwrap();

        index.close().unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 2);
        assert!(index.is_closed().unwrap());
    }

    #[test]
    fn test_closed_index_rejects_everything() {
        let index = memory_index();
        index.add(&Rating::new(1)).unwrap();
        index.close().unwrap();

        assert!(index.is_closed().unwrap());
        assert_eq!(
            index.get_by_id(0).unwrap_err().kind(),
            &ErrorKind::StoreAlreadyClosed
        );
        assert_eq!(
            index.add(&Rating::new(2)).unwrap_err().kind(),
            &ErrorKind::StoreAlreadyClosed
        );
    }
}
