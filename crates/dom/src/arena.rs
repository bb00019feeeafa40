//! Snapshot arena
//!
//! A point-in-time copy of part of a live tree, keyed by node id. Each
//! entry is the snapshot its node published; the arena never talks to
//! the live nodes. Queries use it for document order and combinator pools.
//!
//! ## Memory Layout
//!
//! ```text
//! Arena: AHashMap<NodeId, Arc<DomNode>>
//!        id -> shared snapshot (no copy of node state)
//! ```

use crate::error::{DomError, Result};
use crate::types::{DomNode, NodeId};
use ahash::AHashMap;
use std::sync::Arc;

/// Arena of node snapshots
///
/// Design:
/// - Snapshots are shared, adding one is a refcount bump
/// - No pointers between entries: use ids everywhere
/// - Missing ids are not an error during traversal (the live tree may
///   have moved on since the snapshots were taken)
#[derive(Debug, Clone)]
pub struct DomArena {
    nodes: AHashMap<NodeId, Arc<DomNode>>,

    /// Root node ID (if set)
    root_id: Option<NodeId>,
}

impl DomArena {
    pub fn new() -> Self {
        Self {
            nodes: AHashMap::with_capacity(64),
            root_id: None,
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            nodes: AHashMap::with_capacity(capacity),
            root_id: None,
        }
    }

    /// Add a snapshot, replacing any earlier one for the same node
    pub fn add_node(&mut self, node: Arc<DomNode>) -> NodeId {
        let node_id = node.node_id;
        self.nodes.insert(node_id, node);
        node_id
    }

    pub fn get(&self, node_id: NodeId) -> Result<&Arc<DomNode>> {
        self.nodes
            .get(&node_id)
            .ok_or(DomError::NodeNotFound(node_id))
    }

    pub fn contains(&self, node_id: NodeId) -> bool {
        self.nodes.contains_key(&node_id)
    }

    /// Where document order starts. Fails for an id not in the arena.
    pub fn set_root(&mut self, node_id: NodeId) -> Result<()> {
        self.get(node_id)?;
        self.root_id = Some(node_id);
        Ok(())
    }

    pub fn root_id(&self) -> Option<NodeId> {
        self.root_id
    }

    pub fn root(&self) -> Result<&Arc<DomNode>> {
        let root_id = self.root_id.ok_or(DomError::NodeNotFound(0))?;
        self.get(root_id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Iterator over all snapshots (unordered)
    pub fn iter(&self) -> impl Iterator<Item = &Arc<DomNode>> {
        self.nodes.values()
    }

    /// Get children of a node that are present in the arena
    pub fn children(&self, node_id: NodeId) -> Result<Vec<&Arc<DomNode>>> {
        let node = self.get(node_id)?;
        Ok(node
            .children_ids
            .iter()
            .filter_map(|child_id| self.nodes.get(child_id))
            .collect())
    }

    pub fn parent(&self, node_id: NodeId) -> Result<Option<&Arc<DomNode>>> {
        let node = self.get(node_id)?;
        Ok(node.parent_id.and_then(|parent_id| self.nodes.get(&parent_id)))
    }

    /// Sibling that immediately follows `node_id` in its parent's child list
    pub fn next_sibling(&self, node_id: NodeId) -> Option<NodeId> {
        self.following_siblings(node_id).first().copied()
    }

    /// All siblings after `node_id`, in order
    ///
    /// Read from the parent's list rather than the node's own sibling
    /// pointer so the answer agrees with the parent's `children_ids`.
    pub fn following_siblings(&self, node_id: NodeId) -> Vec<NodeId> {
        let Ok(Some(parent)) = self.parent(node_id) else {
            return Vec::new();
        };
        match parent.children_ids.iter().position(|&id| id == node_id) {
            Some(pos) => parent.children_ids[pos + 1..].to_vec(),
            None => Vec::new(),
        }
    }

    /// Pre-order walk from `start_id`. Ids missing from the arena are
    /// skipped along with whatever hangs below them.
    pub fn traverse_df<F>(&self, start_id: NodeId, mut visit: F) -> Result<()>
    where
        F: FnMut(&DomNode) -> Result<()>,
    {
        let mut stack = vec![start_id];

        while let Some(node_id) = stack.pop() {
            let Some(node) = self.nodes.get(&node_id) else {
                continue;
            };
            visit(node)?;

            // reversed so the leftmost child pops first
            for &child_id in node.children_ids.iter().rev() {
                stack.push(child_id);
            }
        }

        Ok(())
    }

    /// Pre-order ids reachable from `start_id`, `start_id` first
    pub fn document_order(&self, start_id: NodeId) -> Vec<NodeId> {
        let mut order = Vec::with_capacity(self.nodes.len());
        // The visitor never fails
        let _ = self.traverse_df(start_id, |node| {
            order.push(node.node_id);
            Ok(())
        });
        order
    }
}

impl Default for DomArena {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NodeInit;

    // root -> [a -> [a1], b]
    fn sample() -> DomArena {
        let mut root = DomNode::from_init(1, NodeInit::element("div"));
        let mut a = DomNode::from_init(2, NodeInit::element("span").with_id("a"));
        let mut a1 = DomNode::from_init(3, NodeInit::text("hello"));
        let mut b = DomNode::from_init(4, NodeInit::element("span"));

        root.children_ids.extend([2, 4]);
        a.parent_id = Some(1);
        a.children_ids.push(3);
        a1.parent_id = Some(2);
        b.parent_id = Some(1);

        let mut arena = DomArena::new();
        for node in [root, a, a1, b] {
            arena.add_node(Arc::new(node));
        }
        arena.set_root(1).unwrap();
        arena
    }

    #[test]
    fn test_arena_basic() {
        let arena = sample();
        assert_eq!(arena.len(), 4);
        assert_eq!(arena.root().unwrap().node_name, "div");
        assert!(matches!(arena.get(99), Err(DomError::NodeNotFound(99))));
    }

    #[test]
    fn test_document_order() {
        let arena = sample();
        assert_eq!(arena.document_order(1), vec![1, 2, 3, 4]);
        assert_eq!(arena.document_order(2), vec![2, 3]);
    }

    #[test]
    fn test_traverse_df_skips_missing() {
        let mut arena = sample();
        let mut root = (**arena.get(1).unwrap()).clone();
        root.children_ids.insert(1, 42);
        arena.add_node(Arc::new(root));

        let mut visited = Vec::new();
        arena
            .traverse_df(1, |node| {
                visited.push(node.node_name.clone());
                Ok(())
            })
            .unwrap();

        assert_eq!(visited, vec!["div", "span", "#text", "span"]);
    }

    #[test]
    fn test_siblings_and_lookup() {
        let arena = sample();
        assert_eq!(arena.next_sibling(2), Some(4));
        assert_eq!(arena.next_sibling(4), None);
        assert_eq!(arena.following_siblings(2), vec![4]);
        assert!(arena.following_siblings(1).is_empty());
        assert_eq!(arena.parent(3).unwrap().map(|p| p.node_id), Some(2));

        assert_eq!(arena.children(1).unwrap().len(), 2);
    }
}
