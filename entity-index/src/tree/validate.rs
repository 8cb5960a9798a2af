use crate::common::NO_NODE;
use crate::entity::{Entity, EntityCodec, IndexHeader};
use crate::errors::{ErrorKind, IndexError, IndexResult};
use crate::tree::{check_depth, NodeSource};
use std::cmp::Ordering;

/// Summary of a structurally sound index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidationReport {
    /// Nodes reachable from the root.
    pub live_entities: i32,
    /// Nodes on the free list.
    pub deleted_entities: i32,
    /// Height of the tree, `0` when empty.
    pub height: usize,
}

/// Checks every structural invariant of the tree and the free list.
///
/// - keys are non-decreasing in tree order
/// - every balance factor equals `height(right) - height(left)` and lies in `-1..=1`
/// - the header's live count matches the nodes reachable from the root
/// - the free list holds exactly the deleted nodes, without cycles
///
/// The first violation found is returned as an [`ErrorKind::IndexCorrupted`] error.
pub(crate) fn validate_tree<E, S>(
    source: &S,
    codec: &EntityCodec<E>,
    header: &IndexHeader,
) -> IndexResult<ValidationReport>
where
    E: Entity,
    S: NodeSource + ?Sized,
{
    let capacity = header.capacity();
    let mut validator = Validator {
        source,
        codec,
        visited: vec![false; capacity.max(0) as usize],
        previous: None,
    };

    let (height, live) = validator.subtree(source.root_node_id(), 1)?;
    if live != header.num_live_entities() {
        return Err(corrupted(format!(
            "Header counts {} live entities, the tree holds {}",
            header.num_live_entities(),
            live
        )));
    }

    let mut deleted = 0;
    let mut next_id = header.free_list_head_id();
    while next_id != NO_NODE {
        validator.visit(next_id)?;
        let node = source.node(next_id)?;
        match node.next_free_id() {
            Some(next) => next_id = next,
            None => {
                return Err(corrupted(format!(
                    "Free list links live node {}",
                    next_id
                )))
            }
        }
        deleted += 1;
    }

    if live + deleted != capacity {
        let orphan = validator
            .visited
            .iter()
            .position(|seen| !seen)
            .unwrap_or_default();
        return Err(corrupted(format!(
            "Node {} is neither in the tree nor on the free list",
            orphan
        )));
    }

    Ok(ValidationReport {
        live_entities: live,
        deleted_entities: deleted,
        height,
    })
}

struct Validator<'a, E: Entity, S: NodeSource + ?Sized> {
    source: &'a S,
    codec: &'a EntityCodec<E>,
    visited: Vec<bool>,
    previous: Option<E>,
}

impl<'a, E: Entity, S: NodeSource + ?Sized> Validator<'a, E, S> {
    fn visit(&mut self, id: i32) -> IndexResult<()> {
        if id < 0 || id as usize >= self.visited.len() {
            return Err(corrupted(format!(
                "Link to node {} points outside of [0, {})",
                id,
                self.visited.len()
            )));
        }
        if self.visited[id as usize] {
            return Err(corrupted(format!("Node {} is linked more than once", id)));
        }
        self.visited[id as usize] = true;
        Ok(())
    }

    /// Returns height and node count of the subtree rooted at `id`.
    fn subtree(&mut self, id: i32, depth: usize) -> IndexResult<(usize, i32)> {
        if id == NO_NODE {
            return Ok((0, 0));
        }
        check_depth(depth, self.source.max_depth())?;
        self.visit(id)?;

        let node = self.source.node(id)?;
        if node.is_deleted() {
            return Err(corrupted(format!("Deleted node {} is linked into the tree", id)));
        }

        let (left_height, left_count) = self.subtree(node.left_child_id(), depth + 1)?;

        let entity = self.codec.decode_node(&node)?;
        if let Some(previous) = &self.previous {
            if previous.compare_key(&entity) == Ordering::Greater {
                return Err(corrupted(format!(
                    "Node {} is out of key order",
                    id
                )));
            }
        }
        self.previous = Some(entity);

        let (right_height, right_count) = self.subtree(node.right_child_id(), depth + 1)?;

        let expected = right_height as i64 - left_height as i64;
        if expected != node.balance() as i64 {
            return Err(corrupted(format!(
                "Node {} has balance {} but its subtrees differ by {}",
                id,
                node.balance(),
                expected
            )));
        }
        if expected.abs() > 1 {
            return Err(corrupted(format!("Node {} is out of balance", id)));
        }

        Ok((
            left_height.max(right_height) + 1,
            left_count + right_count + 1,
        ))
    }
}

fn corrupted(message: String) -> IndexError {
    log::error!("Index validation failed: {}", message);
    IndexError::new(&message, ErrorKind::IndexCorrupted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityNode;
    use crate::tree::test_tree::VecTree;
    use crate::tree::NodeSink;

    fn header_of(tree: &VecTree, live: i32) -> IndexHeader {
        let mut header = IndexHeader::new(tree.codec.entity_size());
        header.set_capacity(tree.nodes.len() as i32);
        header.set_root_node_id(tree.root);
        header.set_num_live_entities(live);
        header
    }

    fn tree_of(keys: &[i32]) -> VecTree {
        let mut tree = VecTree::new();
        for key in keys {
            tree.insert_key(*key);
        }
        tree
    }

    #[test]
    fn test_empty_tree_is_valid() {
        let tree = VecTree::new();
        let report = validate_tree(&tree, &tree.codec, &header_of(&tree, 0)).unwrap();
        assert_eq!(
            report,
            ValidationReport {
                live_entities: 0,
                deleted_entities: 0,
                height: 0
            }
        );
    }

    #[test]
    fn test_balanced_tree_reports_height() {
        let tree = tree_of(&[4, 2, 6, 1, 3, 5, 7]);
        let report = validate_tree(&tree, &tree.codec, &header_of(&tree, 7)).unwrap();
        assert_eq!(report.live_entities, 7);
        assert_eq!(report.height, 3);
    }

    #[test]
    fn test_wrong_live_count_is_detected() {
        let tree = tree_of(&[1, 2, 3]);
        let err = validate_tree(&tree, &tree.codec, &header_of(&tree, 2)).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::IndexCorrupted);
    }

    #[test]
    fn test_wrong_balance_is_detected() {
        let mut tree = tree_of(&[1, 2, 3]);
        let root = tree.node(tree.root).unwrap();
        tree.put(root.with_balance(1));
        let err = validate_tree(&tree, &tree.codec, &header_of(&tree, 3)).unwrap_err();
        assert!(err.message().contains("balance"));
    }

    #[test]
    fn test_key_order_violation_is_detected() {
        let mut tree = tree_of(&[2, 1, 3]);
        let root = tree.node(tree.root).unwrap();
        let left = root.left_child_id();
        let right = root.right_child_id();
        tree.put(root.with_shape(right, left, 0));
        let err = validate_tree(&tree, &tree.codec, &header_of(&tree, 3)).unwrap_err();
        assert!(err.message().contains("key order"));
    }

    #[test]
    fn test_free_list_is_counted() {
        let mut tree = tree_of(&[1]);
        let entity_size = tree.codec.entity_size();
        tree.nodes.push(EntityNode::deleted(1, NO_NODE, entity_size));
        tree.nodes.push(EntityNode::deleted(2, 1, entity_size));

        let mut header = header_of(&tree, 1);
        header.set_free_list_head_id(2);
        let report = validate_tree(&tree, &tree.codec, &header).unwrap();
        assert_eq!(report.deleted_entities, 2);
    }

    #[test]
    fn test_free_list_cycle_is_detected() {
        let mut tree = tree_of(&[1]);
        let entity_size = tree.codec.entity_size();
        tree.nodes.push(EntityNode::deleted(1, 2, entity_size));
        tree.nodes.push(EntityNode::deleted(2, 1, entity_size));

        let mut header = header_of(&tree, 1);
        header.set_free_list_head_id(1);
        let err = validate_tree(&tree, &tree.codec, &header).unwrap_err();
        assert!(err.message().contains("more than once"));
    }

    #[test]
    fn test_orphaned_slot_is_detected() {
        let mut tree = tree_of(&[1]);
        let entity_size = tree.codec.entity_size();
        tree.nodes.push(EntityNode::deleted(1, NO_NODE, entity_size));
        let err = validate_tree(&tree, &tree.codec, &header_of(&tree, 1)).unwrap_err();
        assert!(err.message().contains("Node 1"));
    }

    #[test]
    fn test_deleted_node_in_tree_is_detected() {
        let mut tree = tree_of(&[1, 2]);
        let entity_size = tree.codec.entity_size();
        let child = tree.node(tree.root).unwrap().right_child_id();
        tree.put(EntityNode::deleted(child, NO_NODE, entity_size));
        let err = validate_tree(&tree, &tree.codec, &header_of(&tree, 2)).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::IndexCorrupted);
    }
}
