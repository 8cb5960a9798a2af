//! The balanced tree kept over node ids.
//!
//! Nodes reference their children by id and carry no parent link. Ancestry is
//! recovered with a [`NodePath`], the root-to-node chain produced while
//! descending. The algorithms read nodes through a [`NodeSource`] and stage
//! changed nodes through a [`NodeSink`], so the same code runs against a
//! transaction's change set or a read-only snapshot of a store.

mod avl;
mod path;
mod validate;

pub use path::*;
pub use validate::*;

pub(crate) use avl::*;

use crate::common::DEFAULT_MAX_DEPTH;
use crate::entity::EntityNode;
use crate::errors::{ErrorKind, IndexError, IndexResult};

/// Read access to the nodes of one tree.
pub trait NodeSource {
    /// Returns the node with `id`, deleted or not.
    fn node(&self, id: i32) -> IndexResult<EntityNode>;

    fn root_node_id(&self) -> i32;

    /// Deepest path a descent may build before the tree is considered corrupt.
    fn max_depth(&self) -> usize {
        DEFAULT_MAX_DEPTH
    }
}

impl<T: NodeSource + ?Sized> NodeSource for &T {
    fn node(&self, id: i32) -> IndexResult<EntityNode> {
        (**self).node(id)
    }

    fn root_node_id(&self) -> i32 {
        (**self).root_node_id()
    }

    fn max_depth(&self) -> usize {
        (**self).max_depth()
    }
}

/// Staging area receiving the nodes rewritten by tree operations.
pub trait NodeSink: NodeSource {
    fn put(&mut self, node: EntityNode);

    fn set_root_node_id(&mut self, id: i32);
}

/// Reads a node that must be part of the tree.
pub(crate) fn live_node<S: NodeSource + ?Sized>(source: &S, id: i32) -> IndexResult<EntityNode> {
    let node = source.node(id)?;
    if node.is_deleted() {
        log::error!("Deleted node {} is linked into the tree", id);
        return Err(IndexError::new(
            &format!("Node {} is deleted but still linked into the tree", id),
            ErrorKind::IndexCorrupted,
        ));
    }
    Ok(node)
}

pub(crate) fn check_depth(depth: usize, max_depth: usize) -> IndexResult<()> {
    if depth > max_depth {
        log::error!("Tree depth exceeds {}", max_depth);
        return Err(IndexError::new(
            &format!("Tree is deeper than {} levels", max_depth),
            ErrorKind::IndexCorrupted,
        ));
    }
    Ok(())
}
