//! Iterators over the entities of an index.
//!
//! - [`IdOrderIterator`] walks the slots in id order with batched reads
//! - [`KeyOrderIterator`] walks the tree in key order with a [`NodePath`] cursor
//!
//! Both yield `IndexResult<E>`. Once an item is an error the iterator is
//! exhausted; in particular a commit to the index while iterating a snapshot
//! ends the iteration with [`crate::errors::ErrorKind::StaleTransaction`].

use crate::common::SortOrder;
use crate::entity::{Entity, EntityCodec, EntityNode};
use crate::errors::IndexResult;
use crate::transaction::IndexSnapshot;
use crate::tree::{live_node, lower_bound, upper_bound, NodePath, NodeSource};
use std::cmp::Ordering;
use std::collections::VecDeque;

/// Iterates live entities in storage order, skipping deleted slots.
pub struct IdOrderIterator<E: Entity> {
    snapshot: IndexSnapshot<E>,
    codec: EntityCodec<E>,
    next_id: i32,
    batch_size: i32,
    buffer: VecDeque<EntityNode>,
    failed: bool,
}

impl<E: Entity> IdOrderIterator<E> {
    pub(crate) fn new(snapshot: IndexSnapshot<E>, batch_size: usize) -> Self {
        let codec = snapshot.index().codec.clone();
        IdOrderIterator {
            snapshot,
            codec,
            next_id: 0,
            batch_size: batch_size.clamp(1, i32::MAX as usize) as i32,
            buffer: VecDeque::new(),
            failed: false,
        }
    }

    fn fill_buffer(&mut self) -> IndexResult<bool> {
        let capacity = self.snapshot.header().capacity();
        if self.next_id >= capacity {
            return Ok(false);
        }
        let end_id = self
            .next_id
            .saturating_add(self.batch_size)
            .min(capacity);
        let nodes = self.snapshot.get_nodes(self.next_id, end_id)?;
        log::trace!("Fetched nodes {}..{}", self.next_id, end_id);
        self.buffer.extend(nodes);
        self.next_id = end_id;
        Ok(true)
    }

    fn next_entity(&mut self) -> IndexResult<Option<E>> {
        loop {
            match self.buffer.pop_front() {
                Some(node) if node.is_deleted() => continue,
                Some(node) => {
                    // buffered nodes may predate a commit
                    self.snapshot.check_version()?;
                    return self.codec.decode_node(&node).map(Some);
                }
                None => {
                    if !self.fill_buffer()? {
                        return Ok(None);
                    }
                }
            }
        }
    }
}

impl<E: Entity> Iterator for IdOrderIterator<E> {
    type Item = IndexResult<E>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match self.next_entity() {
            Ok(entity) => entity.map(Ok),
            Err(err) => {
                self.failed = true;
                Some(Err(err))
            }
        }
    }
}

/// Iterates entities in key order, ascending or descending.
///
/// The iteration starts at an optional start key (inclusive) and stops
/// before an optional end key (exclusive). Equal keys come out in tree order
/// when ascending and in reverse tree order when descending.
pub struct KeyOrderIterator<E: Entity, S: NodeSource> {
    source: S,
    codec: EntityCodec<E>,
    cursor: NodePath,
    end_key: Option<E>,
    order: SortOrder,
    failed: bool,
}

impl<E: Entity, S: NodeSource> KeyOrderIterator<E, S> {
    pub(crate) fn new(
        source: S,
        codec: EntityCodec<E>,
        start: Option<&E>,
        end: Option<&E>,
        order: SortOrder,
    ) -> IndexResult<Self> {
        let cursor = match (order, start) {
            (SortOrder::Ascending, None) => NodePath::begin(&source)?,
            (SortOrder::Ascending, Some(key)) => lower_bound(&source, &codec, key)?,
            (SortOrder::Descending, None) => NodePath::last(&source)?,
            (SortOrder::Descending, Some(key)) => {
                upper_bound(&source, &codec, key)?.predecessor(&source)?
            }
        };

        Ok(KeyOrderIterator {
            source,
            codec,
            cursor,
            end_key: end.cloned(),
            order,
            failed: false,
        })
    }

    pub fn order(&self) -> SortOrder {
        self.order
    }

    fn past_end(&self, entity: &E) -> bool {
        match (&self.end_key, self.order) {
            (None, _) => false,
            (Some(end), SortOrder::Ascending) => entity.compare_key(end) != Ordering::Less,
            (Some(end), SortOrder::Descending) => entity.compare_key(end) != Ordering::Greater,
        }
    }

    fn next_entity(&mut self) -> IndexResult<Option<E>> {
        if self.cursor.is_end() {
            return Ok(None);
        }
        let node = live_node(&self.source, self.cursor.node_id())?;
        let entity = self.codec.decode_node(&node)?;
        if self.past_end(&entity) {
            self.cursor = NodePath::end();
            return Ok(None);
        }

        self.cursor = match self.order {
            SortOrder::Ascending => self.cursor.successor(&self.source)?,
            SortOrder::Descending => self.cursor.predecessor(&self.source)?,
        };
        Ok(Some(entity))
    }
}

impl<E: Entity, S: NodeSource> Iterator for KeyOrderIterator<E, S> {
    type Item = IndexResult<E>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match self.next_entity() {
            Ok(entity) => entity.map(Ok),
            Err(err) => {
                self.failed = true;
                Some(Err(err))
            }
        }
    }
}
