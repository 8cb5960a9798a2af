use crate::common::NO_NODE;
use crate::entity::{Entity, EntityCodec, EntityNode};
use crate::errors::{ErrorKind, IndexError, IndexResult};
use crate::tree::{check_depth, live_node, NodePath, NodeSink, NodeSource};
use std::cmp::Ordering;

/// Path to the first node whose key is not less than `key`, or end.
pub(crate) fn lower_bound<E, S>(source: &S, codec: &EntityCodec<E>, key: &E) -> IndexResult<NodePath>
where
    E: Entity,
    S: NodeSource + ?Sized,
{
    bound(source, codec, key, false)
}

/// Path to the first node whose key is greater than `key`, or end.
pub(crate) fn upper_bound<E, S>(source: &S, codec: &EntityCodec<E>, key: &E) -> IndexResult<NodePath>
where
    E: Entity,
    S: NodeSource + ?Sized,
{
    bound(source, codec, key, true)
}

fn bound<E, S>(source: &S, codec: &EntityCodec<E>, key: &E, strict: bool) -> IndexResult<NodePath>
where
    E: Entity,
    S: NodeSource + ?Sized,
{
    let mut best = NodePath::end();
    let mut current: Option<NodePath> = None;
    let mut next_id = source.root_node_id();
    let mut depth = 0;

    while next_id != NO_NODE {
        depth += 1;
        check_depth(depth, source.max_depth())?;

        let path = match &current {
            Some(parent) => parent.child(next_id),
            None => NodePath::root(next_id),
        };
        let node = live_node(source, next_id)?;
        let entity = codec.decode_node(&node)?;

        let goes_left = match key.compare_key(&entity) {
            Ordering::Less => true,
            Ordering::Equal => !strict,
            Ordering::Greater => false,
        };
        if goes_left {
            best = path.clone();
            next_id = node.left_child_id();
        } else {
            next_id = node.right_child_id();
        }
        current = Some(path);
    }
    Ok(best)
}

/// Every entity whose key equals `key`, in tree order.
pub(crate) fn find_all_by_key<E, S>(source: &S, codec: &EntityCodec<E>, key: &E) -> IndexResult<Vec<E>>
where
    E: Entity,
    S: NodeSource + ?Sized,
{
    let mut found = Vec::new();
    let mut path = lower_bound(source, codec, key)?;
    while !path.is_end() {
        let entity = codec.decode_node(&live_node(source, path.node_id())?)?;
        if key.compare_key(&entity) != Ordering::Equal {
            break;
        }
        found.push(entity);
        path = path.successor(source)?;
    }
    Ok(found)
}

/// Links the leaf `node` into the tree and rebalances.
///
/// The slot for `node.id()` must already be allocated. Among equal keys the
/// new node is placed after the lower bound's predecessor, i.e. before every
/// existing entity with the same key.
pub(crate) fn insert<E, S>(tree: &mut S, codec: &EntityCodec<E>, node: EntityNode, entity: &E) -> IndexResult<()>
where
    E: Entity,
    S: NodeSink + ?Sized,
{
    let new_id = node.id();
    let node = node.with_shape(NO_NODE, NO_NODE, 0);
    let bound = lower_bound(tree, codec, entity)?;

    let (parent, as_right_child) = if bound.is_end() {
        let last = NodePath::last(tree)?;
        if last.is_end() {
            tree.put(node);
            tree.set_root_node_id(new_id);
            return Ok(());
        }
        (last, true)
    } else if !bound.has_left_child(tree)? {
        (bound, false)
    } else {
        (bound.predecessor(tree)?, true)
    };

    let parent_node = live_node(tree, parent.node_id())?;
    tree.put(node);
    if as_right_child {
        tree.put(parent_node.with_right_child(new_id));
    } else {
        tree.put(parent_node.with_left_child(new_id));
    }

    retrace_insert(tree, parent, new_id, as_right_child)
}

fn retrace_insert<S>(tree: &mut S, start: NodePath, child_id: i32, from_right: bool) -> IndexResult<()>
where
    S: NodeSink + ?Sized,
{
    let mut path = start;
    let mut child_id = child_id;
    let mut from_right = from_right;

    loop {
        let x = live_node(tree, path.node_id())?;
        let x_id = x.id();
        let grand = path.parent().cloned();

        if from_right {
            if x.balance() > 0 {
                let z = live_node(tree, child_id)?;
                let new_root = if z.balance() < 0 {
                    rotate_right_left(tree, x, z)?
                } else {
                    rotate_left(tree, x, z)
                };
                return replace_child(tree, grand.as_ref(), x_id, new_root);
            }
            if x.balance() < 0 {
                tree.put(x.with_balance(0));
                return Ok(());
            }
            tree.put(x.with_balance(1));
        } else {
            if x.balance() < 0 {
                let z = live_node(tree, child_id)?;
                let new_root = if z.balance() > 0 {
                    rotate_left_right(tree, x, z)?
                } else {
                    rotate_right(tree, x, z)
                };
                return replace_child(tree, grand.as_ref(), x_id, new_root);
            }
            if x.balance() > 0 {
                tree.put(x.with_balance(0));
                return Ok(());
            }
            tree.put(x.with_balance(-1));
        }

        match grand {
            None => return Ok(()),
            Some(grand) => {
                from_right = live_node(tree, grand.node_id())?.right_child_id() == x_id;
                child_id = x_id;
                path = grand;
            }
        }
    }
}

/// Finds the path to the live node `id` by searching for its own key.
///
/// Returns `None` if the node is deleted. A live node that cannot be reached
/// through its key means the tree is inconsistent.
pub(crate) fn find_path<E, S>(source: &S, codec: &EntityCodec<E>, id: i32) -> IndexResult<Option<NodePath>>
where
    E: Entity,
    S: NodeSource + ?Sized,
{
    let node = source.node(id)?;
    if node.is_deleted() {
        return Ok(None);
    }

    let entity = codec.decode_node(&node)?;
    let mut path = lower_bound(source, codec, &entity)?;
    while !path.is_end() {
        if path.node_id() == id {
            return Ok(Some(path));
        }
        let candidate = codec.decode_node(&live_node(source, path.node_id())?)?;
        if entity.compare_key(&candidate) != Ordering::Equal {
            break;
        }
        path = path.successor(source)?;
    }

    log::error!("Node {} is not reachable through its own key", id);
    Err(IndexError::new(
        &format!("Node {} is not linked into the tree", id),
        ErrorKind::IndexCorrupted,
    ))
}

/// Unlinks the node at the end of `path` from the tree and rebalances.
///
/// The detached node itself is left as it is; the caller decides whether it
/// is freed or linked in again.
pub(crate) fn detach<S>(tree: &mut S, path: NodePath) -> IndexResult<()>
where
    S: NodeSink + ?Sized,
{
    let x = live_node(tree, path.node_id())?;
    let (path, x) = if x.has_left_child() && x.has_right_child() {
        swap_with_successor(tree, path, x)?
    } else {
        (path, x)
    };

    let child_id = if x.has_left_child() {
        x.left_child_id()
    } else {
        x.right_child_id()
    };

    match path.parent() {
        None => {
            tree.set_root_node_id(child_id);
            Ok(())
        }
        Some(parent) => {
            let parent_node = live_node(tree, parent.node_id())?;
            let from_left = parent_node.left_child_id() == x.id();
            if from_left {
                tree.put(parent_node.with_left_child(child_id));
            } else {
                tree.put(parent_node.with_right_child(child_id));
            }
            retrace_delete(tree, parent.clone(), from_left)
        }
    }
}

/// Moves the in-order successor of `x` into x's position and x into the
/// successor's old position, which has no left child.
///
/// Returns the new path to x and its rewritten node.
fn swap_with_successor<S>(tree: &mut S, path: NodePath, x: EntityNode) -> IndexResult<(NodePath, EntityNode)>
where
    S: NodeSink + ?Sized,
{
    let successor_path = path.successor(tree)?;
    let s = live_node(tree, successor_path.node_id())?;
    let x_id = x.id();
    let s_id = s.id();

    // ids strictly between x and its successor
    let x_depth = match successor_path.trim(x_id) {
        Some(x_path) => x_path.depth(),
        None => {
            return Err(IndexError::new(
                &format!("Successor of node {} is not below it", x_id),
                ErrorKind::IndexCorrupted,
            ))
        }
    };
    let ids = successor_path.ids();
    let below_x = ids[x_depth..ids.len() - 1].to_vec();

    let new_x = x
        .clone()
        .with_shape(NO_NODE, s.right_child_id(), s.balance());

    if below_x.is_empty() {
        tree.put(s.with_shape(x.left_child_id(), x_id, x.balance()));
    } else {
        let s_parent_id = below_x[below_x.len() - 1];
        let s_parent = live_node(tree, s_parent_id)?;
        tree.put(s_parent.with_left_child(x_id));
        tree.put(s.with_shape(x.left_child_id(), x.right_child_id(), x.balance()));
    }
    tree.put(new_x.clone());

    let parent = path.parent().cloned();
    replace_child(tree, parent.as_ref(), x_id, s_id)?;

    let mut new_path = match &parent {
        Some(parent) => parent.child(s_id),
        None => NodePath::root(s_id),
    };
    for id in below_x {
        new_path = new_path.child(id);
    }
    Ok((new_path.child(x_id), new_x))
}

fn retrace_delete<S>(tree: &mut S, start: NodePath, from_left: bool) -> IndexResult<()>
where
    S: NodeSink + ?Sized,
{
    let mut path = start;
    let mut from_left = from_left;

    loop {
        let x = live_node(tree, path.node_id())?;
        let x_id = x.id();
        let grand = path.parent().cloned();

        let subtree_root = if from_left {
            if x.balance() > 0 {
                let z = live_node(tree, x.right_child_id())?;
                let z_balance = z.balance();
                let new_root = if z_balance < 0 {
                    rotate_right_left(tree, x, z)?
                } else {
                    rotate_left(tree, x, z)
                };
                replace_child(tree, grand.as_ref(), x_id, new_root)?;
                if z_balance == 0 {
                    return Ok(());
                }
                new_root
            } else if x.balance() == 0 {
                tree.put(x.with_balance(1));
                return Ok(());
            } else {
                tree.put(x.with_balance(0));
                x_id
            }
        } else if x.balance() < 0 {
            let z = live_node(tree, x.left_child_id())?;
            let z_balance = z.balance();
            let new_root = if z_balance > 0 {
                rotate_left_right(tree, x, z)?
            } else {
                rotate_right(tree, x, z)
            };
            replace_child(tree, grand.as_ref(), x_id, new_root)?;
            if z_balance == 0 {
                return Ok(());
            }
            new_root
        } else if x.balance() == 0 {
            tree.put(x.with_balance(-1));
            return Ok(());
        } else {
            tree.put(x.with_balance(0));
            x_id
        };

        match grand {
            None => return Ok(()),
            Some(grand) => {
                from_left = live_node(tree, grand.node_id())?.left_child_id() == subtree_root;
                path = grand;
            }
        }
    }
}

/// Points `parent`'s link to `old_id` at `new_id`, or makes `new_id` the root.
fn replace_child<S>(tree: &mut S, parent: Option<&NodePath>, old_id: i32, new_id: i32) -> IndexResult<()>
where
    S: NodeSink + ?Sized,
{
    let parent = match parent {
        None => {
            tree.set_root_node_id(new_id);
            return Ok(());
        }
        Some(parent) => live_node(tree, parent.node_id())?,
    };

    if parent.left_child_id() == old_id {
        tree.put(parent.with_left_child(new_id));
    } else if parent.right_child_id() == old_id {
        tree.put(parent.with_right_child(new_id));
    } else {
        log::error!("Node {} is not a child of node {}", old_id, parent.id());
        return Err(IndexError::new(
            &format!("Node {} is not a child of node {}", old_id, parent.id()),
            ErrorKind::IndexCorrupted,
        ));
    }
    Ok(())
}

/// Rotates left around `x` whose right child is `z`. Returns the new subtree root.
pub(crate) fn rotate_left<S>(tree: &mut S, x: EntityNode, z: EntityNode) -> i32
where
    S: NodeSink + ?Sized,
{
    let (x_balance, z_balance) = if z.balance() == 0 { (1, -1) } else { (0, 0) };
    let z_id = z.id();
    let z_left = z.left_child_id();
    tree.put(z.with_left_child(x.id()).with_balance(z_balance));
    tree.put(x.with_right_child(z_left).with_balance(x_balance));
    z_id
}

/// Rotates right around `x` whose left child is `z`. Returns the new subtree root.
pub(crate) fn rotate_right<S>(tree: &mut S, x: EntityNode, z: EntityNode) -> i32
where
    S: NodeSink + ?Sized,
{
    let (x_balance, z_balance) = if z.balance() == 0 { (-1, 1) } else { (0, 0) };
    let z_id = z.id();
    let z_right = z.right_child_id();
    tree.put(z.with_right_child(x.id()).with_balance(z_balance));
    tree.put(x.with_left_child(z_right).with_balance(x_balance));
    z_id
}

/// Right rotation at `z` followed by a left rotation at `x`, where `z` is x's
/// right child and leans left. Returns the new subtree root, z's former left child.
pub(crate) fn rotate_right_left<S>(tree: &mut S, x: EntityNode, z: EntityNode) -> IndexResult<i32>
where
    S: NodeSink + ?Sized,
{
    let y = live_node(tree, z.left_child_id())?;
    let (x_balance, z_balance) = match y.balance().cmp(&0) {
        Ordering::Greater => (-1, 0),
        Ordering::Less => (0, 1),
        Ordering::Equal => (0, 0),
    };

    let y_id = y.id();
    let (x_id, z_id) = (x.id(), z.id());
    let (y_left, y_right) = (y.left_child_id(), y.right_child_id());
    tree.put(z.with_left_child(y_right).with_balance(z_balance));
    tree.put(x.with_right_child(y_left).with_balance(x_balance));
    tree.put(y.with_shape(x_id, z_id, 0));
    Ok(y_id)
}

/// Left rotation at `z` followed by a right rotation at `x`, where `z` is x's
/// left child and leans right. Returns the new subtree root, z's former right child.
pub(crate) fn rotate_left_right<S>(tree: &mut S, x: EntityNode, z: EntityNode) -> IndexResult<i32>
where
    S: NodeSink + ?Sized,
{
    let y = live_node(tree, z.right_child_id())?;
    let (x_balance, z_balance) = match y.balance().cmp(&0) {
        Ordering::Less => (1, 0),
        Ordering::Greater => (0, -1),
        Ordering::Equal => (0, 0),
    };

    let y_id = y.id();
    let (x_id, z_id) = (x.id(), z.id());
    let (y_left, y_right) = (y.left_child_id(), y.right_child_id());
    tree.put(z.with_right_child(y_left).with_balance(z_balance));
    tree.put(x.with_left_child(y_right).with_balance(x_balance));
    tree.put(y.with_shape(z_id, x_id, 0));
    Ok(y_id)
}
