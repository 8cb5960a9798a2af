use crate::common::{read_i32, write_i32, DELETED_NODE, NODE_OVERHEAD, NO_NODE};
use crate::errors::{ErrorKind, IndexError, IndexResult};
use std::fmt::{Debug, Formatter};

/// The physical record stored for every node id.
///
/// A live node holds its children, its balance factor
/// (`height(right) - height(left)`) and the serialized entity. A deleted node
/// has [`DELETED_NODE`] as its left child id and reuses the right child id as
/// the link to the next deleted node of the free list.
///
/// Nodes never store their parent; ancestry is recovered through a
/// [`NodePath`](crate::tree::NodePath).
///
/// # On-disk layout
///
/// | offset | size | field |
/// |---|---|---|
/// | 0 | 4 | left child id (LE) |
/// | 4 | 4 | right child id (LE) |
/// | 8 | 1 | balance factor (signed) |
/// | 9 | n | serialized entity |
#[derive(Clone, PartialEq, Eq)]
pub struct EntityNode {
    id: i32,
    left_child_id: i32,
    right_child_id: i32,
    balance: i8,
    serialized_entity: Vec<u8>,
}

impl EntityNode {
    pub fn new(
        id: i32,
        left_child_id: i32,
        right_child_id: i32,
        balance: i8,
        serialized_entity: Vec<u8>,
    ) -> Self {
        EntityNode {
            id,
            left_child_id,
            right_child_id,
            balance,
            serialized_entity,
        }
    }

    /// A freshly inserted node without children.
    pub fn leaf(id: i32, serialized_entity: Vec<u8>) -> Self {
        EntityNode::new(id, NO_NODE, NO_NODE, 0, serialized_entity)
    }

    /// A deleted node linking to `next_free_id` in the free list.
    pub fn deleted(id: i32, next_free_id: i32, entity_size: usize) -> Self {
        EntityNode::new(id, DELETED_NODE, next_free_id, 0, vec![0u8; entity_size])
    }

    pub fn id(&self) -> i32 {
        self.id
    }

    pub fn left_child_id(&self) -> i32 {
        self.left_child_id
    }

    pub fn right_child_id(&self) -> i32 {
        self.right_child_id
    }

    pub fn balance(&self) -> i8 {
        self.balance
    }

    pub fn serialized_entity(&self) -> &[u8] {
        &self.serialized_entity
    }

    pub fn is_deleted(&self) -> bool {
        self.left_child_id == DELETED_NODE
    }

    pub fn has_left_child(&self) -> bool {
        !self.is_deleted() && self.left_child_id != NO_NODE
    }

    pub fn has_right_child(&self) -> bool {
        !self.is_deleted() && self.right_child_id != NO_NODE
    }

    /// The next id in the free list if this node is deleted.
    pub fn next_free_id(&self) -> Option<i32> {
        if self.is_deleted() {
            Some(self.right_child_id)
        } else {
            None
        }
    }

    pub fn with_left_child(self, left_child_id: i32) -> Self {
        EntityNode {
            left_child_id,
            ..self
        }
    }

    pub fn with_right_child(self, right_child_id: i32) -> Self {
        EntityNode {
            right_child_id,
            ..self
        }
    }

    pub fn with_balance(self, balance: i8) -> Self {
        EntityNode { balance, ..self }
    }

    /// Replaces children and balance at once, keeping id and entity.
    pub fn with_shape(self, left_child_id: i32, right_child_id: i32, balance: i8) -> Self {
        EntityNode {
            left_child_id,
            right_child_id,
            balance,
            ..self
        }
    }

    pub fn with_entity(self, serialized_entity: Vec<u8>) -> Self {
        EntityNode {
            serialized_entity,
            ..self
        }
    }

    pub(crate) fn serialized_entity_mut(&mut self) -> &mut [u8] {
        &mut self.serialized_entity
    }

    /// Size of a slot holding an entity of `entity_size` bytes.
    pub fn slot_size(entity_size: usize) -> usize {
        entity_size + NODE_OVERHEAD
    }

    /// Writes the slot representation into `buf`, which must be exactly one slot long.
    pub fn write_to(&self, buf: &mut [u8]) {
        write_i32(buf, 0, self.left_child_id);
        write_i32(buf, 4, self.right_child_id);
        buf[8] = self.balance as u8;
        buf[NODE_OVERHEAD..].copy_from_slice(&self.serialized_entity);
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = vec![0u8; Self::slot_size(self.serialized_entity.len())];
        self.write_to(&mut buf);
        buf
    }

    /// Reads a node from one slot of `entity_size + 9` bytes.
    pub fn from_bytes(id: i32, buf: &[u8], entity_size: usize) -> IndexResult<Self> {
        if buf.len() != Self::slot_size(entity_size) {
            return Err(IndexError::new(
                &format!(
                    "Node {} slot is {} bytes, expected {}",
                    id,
                    buf.len(),
                    Self::slot_size(entity_size)
                ),
                ErrorKind::FileCorrupted,
            ));
        }

        Ok(EntityNode {
            id,
            left_child_id: read_i32(buf, 0),
            right_child_id: read_i32(buf, 4),
            balance: buf[8] as i8,
            serialized_entity: buf[NODE_OVERHEAD..].to_vec(),
        })
    }
}

impl Debug for EntityNode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.is_deleted() {
            f.debug_struct("EntityNode")
                .field("id", &self.id)
                .field("deleted", &true)
                .field("next_free_id", &self.right_child_id)
                .finish()
        } else {
            f.debug_struct("EntityNode")
                .field("id", &self.id)
                .field("left", &self.left_child_id)
                .field("right", &self.right_child_id)
                .field("balance", &self.balance)
                .field("entity_bytes", &self.serialized_entity.len())
                .finish()
        }
    }
}
