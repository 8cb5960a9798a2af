use crate::common::NO_NODE;
use crate::errors::IndexResult;
use crate::tree::{check_depth, live_node, NodeSource};
use smallvec::SmallVec;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

/// Position in a tree, recorded as the chain of ids from the node up to the root.
///
/// # Purpose
/// Nodes do not store their parent, so whether a node is a left or a right
/// child, and where an in-order walk continues, can only be answered from
/// the path that led to it. A `NodePath` is that path: an immutable linked
/// list whose head is the current node. Extending a path shares the existing
/// chain.
///
/// # Sentinels
/// - **end**: id `-1` without a parent, one past the last node
/// - **begin**: the left-most node, see [`NodePath::begin`]
///
/// # Examples
///
/// ```rust
/// use entity_index::tree::NodePath;
///
/// let root = NodePath::root(4);
/// let path = root.child(2).child(1);
/// assert_eq!(path.node_id(), 1);
/// assert_eq!(path.ids().as_slice(), &[4, 2, 1]);
/// assert_eq!(path.trim(2).unwrap().node_id(), 2);
/// assert!(NodePath::end().is_end());
/// ```
#[derive(Clone, PartialEq, Eq)]
pub struct NodePath {
    node_id: i32,
    parent: Option<Arc<NodePath>>,
}

impl NodePath {
    pub fn end() -> NodePath {
        NodePath {
            node_id: NO_NODE,
            parent: None,
        }
    }

    /// A path consisting of the root node only.
    pub fn root(node_id: i32) -> NodePath {
        NodePath {
            node_id,
            parent: None,
        }
    }

    /// Extends this path by one of the current node's children.
    pub fn child(&self, node_id: i32) -> NodePath {
        NodePath {
            node_id,
            parent: Some(Arc::new(self.clone())),
        }
    }

    pub fn node_id(&self) -> i32 {
        self.node_id
    }

    pub fn parent(&self) -> Option<&NodePath> {
        self.parent.as_deref()
    }

    pub fn is_end(&self) -> bool {
        self.node_id == NO_NODE
    }

    /// Number of nodes on the path, `0` for end.
    pub fn depth(&self) -> usize {
        if self.is_end() {
            return 0;
        }
        let mut depth = 1;
        let mut current = self.parent();
        while let Some(path) = current {
            depth += 1;
            current = path.parent();
        }
        depth
    }

    /// Node ids from the root down to the current node.
    pub fn ids(&self) -> SmallVec<[i32; 16]> {
        let mut ids = SmallVec::with_capacity(self.depth());
        let mut current = Some(self);
        while let Some(path) = current {
            if !path.is_end() {
                ids.push(path.node_id);
            }
            current = path.parent();
        }
        ids.reverse();
        ids
    }

    /// Cuts the path below the ancestor `node_id`, which becomes the current node.
    ///
    /// Returns `None` if `node_id` is not on the path.
    pub fn trim(&self, node_id: i32) -> Option<NodePath> {
        let mut current = Some(self);
        while let Some(path) = current {
            if path.node_id == node_id {
                return Some(path.clone());
            }
            current = path.parent();
        }
        None
    }

    /// Path to the left-most node, or end for an empty tree.
    pub fn begin<S: NodeSource + ?Sized>(source: &S) -> IndexResult<NodePath> {
        match source.root_node_id() {
            NO_NODE => Ok(NodePath::end()),
            root => NodePath::root(root).leftmost(source),
        }
    }

    /// Path to the right-most node, or end for an empty tree.
    pub fn last<S: NodeSource + ?Sized>(source: &S) -> IndexResult<NodePath> {
        match source.root_node_id() {
            NO_NODE => Ok(NodePath::end()),
            root => NodePath::root(root).rightmost(source),
        }
    }

    /// True for the left-most node of the tree, or for end if the tree is empty.
    pub fn is_begin<S: NodeSource + ?Sized>(&self, source: &S) -> IndexResult<bool> {
        if self.is_end() {
            return Ok(source.root_node_id() == NO_NODE);
        }
        if self.has_left_child(source)? {
            return Ok(false);
        }

        let mut current = self;
        while let Some(parent) = current.parent() {
            if !current.is_left_child(source)? {
                return Ok(false);
            }
            current = parent;
        }
        Ok(true)
    }

    pub fn has_left_child<S: NodeSource + ?Sized>(&self, source: &S) -> IndexResult<bool> {
        if self.is_end() {
            return Ok(false);
        }
        Ok(live_node(source, self.node_id)?.has_left_child())
    }

    pub fn has_right_child<S: NodeSource + ?Sized>(&self, source: &S) -> IndexResult<bool> {
        if self.is_end() {
            return Ok(false);
        }
        Ok(live_node(source, self.node_id)?.has_right_child())
    }

    /// True if the parent on this path holds the current node as its left child.
    pub fn is_left_child<S: NodeSource + ?Sized>(&self, source: &S) -> IndexResult<bool> {
        match self.parent() {
            Some(parent) if !self.is_end() => {
                Ok(live_node(source, parent.node_id)?.left_child_id() == self.node_id)
            }
            _ => Ok(false),
        }
    }

    /// True if the parent on this path holds the current node as its right child.
    pub fn is_right_child<S: NodeSource + ?Sized>(&self, source: &S) -> IndexResult<bool> {
        match self.parent() {
            Some(parent) if !self.is_end() => {
                Ok(live_node(source, parent.node_id)?.right_child_id() == self.node_id)
            }
            _ => Ok(false),
        }
    }

    /// The next node in key order, or end.
    pub fn successor<S: NodeSource + ?Sized>(&self, source: &S) -> IndexResult<NodePath> {
        if self.is_end() {
            return Ok(NodePath::end());
        }

        let node = live_node(source, self.node_id)?;
        if node.has_right_child() {
            return self.child(node.right_child_id()).leftmost(source);
        }

        let mut current = self;
        while let Some(parent) = current.parent() {
            if current.is_left_child(source)? {
                return Ok(parent.clone());
            }
            current = parent;
        }
        Ok(NodePath::end())
    }

    /// The previous node in key order. The predecessor of end is the last node;
    /// the predecessor of the first node is end.
    pub fn predecessor<S: NodeSource + ?Sized>(&self, source: &S) -> IndexResult<NodePath> {
        if self.is_end() {
            return NodePath::last(source);
        }

        let node = live_node(source, self.node_id)?;
        if node.has_left_child() {
            return self.child(node.left_child_id()).rightmost(source);
        }

        let mut current = self;
        while let Some(parent) = current.parent() {
            if current.is_right_child(source)? {
                return Ok(parent.clone());
            }
            current = parent;
        }
        Ok(NodePath::end())
    }

    /// Descends along left children as far as possible.
    pub(crate) fn leftmost<S: NodeSource + ?Sized>(self, source: &S) -> IndexResult<NodePath> {
        let mut path = self;
        let mut depth = path.depth();
        loop {
            check_depth(depth, source.max_depth())?;
            let node = live_node(source, path.node_id)?;
            if !node.has_left_child() {
                return Ok(path);
            }
            path = path.child(node.left_child_id());
            depth += 1;
        }
    }

    /// Descends along right children as far as possible.
    pub(crate) fn rightmost<S: NodeSource + ?Sized>(self, source: &S) -> IndexResult<NodePath> {
        let mut path = self;
        let mut depth = path.depth();
        loop {
            check_depth(depth, source.max_depth())?;
            let node = live_node(source, path.node_id)?;
            if !node.has_right_child() {
                return Ok(path);
            }
            path = path.child(node.right_child_id());
            depth += 1;
        }
    }
}

impl Debug for NodePath {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.is_end() {
            write!(f, "NodePath(end)")
        } else {
            write!(f, "NodePath{:?}", self.ids())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use crate::tree::test_tree::VecTree;
    use crate::tree::NodeSink;

    /// Builds the tree
    /// ```text
    ///         40
    ///       /    \
    ///     20      60
    ///    /  \    /
    ///  10   30  50
    /// ```
    fn sample_tree() -> VecTree {
        let mut tree = VecTree::new();
        for key in [40, 20, 60, 10, 30, 50] {
            tree.insert_key(key);
        }
        tree
    }

    fn walk_forward(tree: &VecTree) -> Vec<i32> {
        let mut keys = Vec::new();
        let mut path = NodePath::begin(tree).unwrap();
        while !path.is_end() {
            keys.push(tree.key_of(path.node_id()));
            path = path.successor(tree).unwrap();
        }
        keys
    }

    fn walk_backward(tree: &VecTree) -> Vec<i32> {
        let mut keys = Vec::new();
        let mut path = NodePath::end().predecessor(tree).unwrap();
        while !path.is_end() {
            keys.push(tree.key_of(path.node_id()));
            path = path.predecessor(tree).unwrap();
        }
        keys
    }

    #[test]
    fn test_successor_walks_in_key_order() {
        let tree = sample_tree();
        assert_eq!(walk_forward(&tree), vec![10, 20, 30, 40, 50, 60]);
    }

    #[test]
    fn test_predecessor_walks_in_reverse_key_order() {
        let tree = sample_tree();
        assert_eq!(walk_backward(&tree), vec![60, 50, 40, 30, 20, 10]);
    }

    #[test]
    fn test_empty_tree_begins_at_end() {
        let tree = VecTree::new();
        let begin = NodePath::begin(&tree).unwrap();
        assert!(begin.is_end());
        assert!(begin.is_begin(&tree).unwrap());
        assert!(NodePath::end().predecessor(&tree).unwrap().is_end());
    }

    #[test]
    fn test_begin_is_leftmost_node() {
        let tree = sample_tree();
        let begin = NodePath::begin(&tree).unwrap();
        assert_eq!(tree.key_of(begin.node_id()), 10);
        assert_eq!(begin.depth(), 3);
        assert!(begin.is_begin(&tree).unwrap());

        let root = NodePath::root(tree.root);
        assert!(!root.is_begin(&tree).unwrap());
        assert!(!NodePath::end().is_begin(&tree).unwrap());
    }

    #[test]
    fn test_child_side_is_read_from_parent() {
        let tree = sample_tree();
        let root = NodePath::root(tree.root);
        let root_node = tree.node(tree.root).unwrap();
        let left = root.child(root_node.left_child_id());
        let right = root.child(root_node.right_child_id());

        assert!(left.is_left_child(&tree).unwrap());
        assert!(!left.is_right_child(&tree).unwrap());
        assert!(right.is_right_child(&tree).unwrap());
        assert!(!root.is_left_child(&tree).unwrap());
        assert!(!root.is_right_child(&tree).unwrap());

        assert!(left.has_left_child(&tree).unwrap());
        assert!(left.has_right_child(&tree).unwrap());
        assert!(right.has_left_child(&tree).unwrap());
        assert!(!right.has_right_child(&tree).unwrap());
    }

    #[test]
    fn test_end_has_no_children_and_no_successor() {
        let tree = sample_tree();
        let end = NodePath::end();
        assert!(!end.has_left_child(&tree).unwrap());
        assert!(!end.has_right_child(&tree).unwrap());
        assert!(end.successor(&tree).unwrap().is_end());
        assert_eq!(end.depth(), 0);
        assert!(end.ids().is_empty());
    }

    #[test]
    fn test_trim_cuts_below_ancestor() {
        let path = NodePath::root(7).child(3).child(5).child(4);
        let trimmed = path.trim(3).unwrap();
        assert_eq!(trimmed.ids().as_slice(), &[7, 3]);
        assert_eq!(path.trim(4).unwrap(), path);
        assert!(path.trim(99).is_none());
    }

    #[test]
    fn test_descent_past_max_depth_is_corruption() {
        let mut tree = VecTree::new();
        tree.insert_key(1);
        let looped = tree.node(0).unwrap().with_left_child(0);
        tree.put(looped);

        let err = NodePath::begin(&tree).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::IndexCorrupted);
    }

    #[test]
    fn test_debug_lists_ids() {
        assert_eq!(format!("{:?}", NodePath::end()), "NodePath(end)");
        assert_eq!(format!("{:?}", NodePath::root(2).child(1)), "NodePath[2, 1]");
    }
}
