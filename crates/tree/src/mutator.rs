//! Child list splicing and sibling pointer derivation
//!
//! The parent's `children_ids` is the only authoritative order. Sibling
//! pointers are recomputed from it before and after a splice, and only the
//! children whose pointers changed are told about it.

use ahash::AHashMap;
use dom::NodeId;
use smallvec::SmallVec;

use crate::elements;

pub(crate) type ChildList = SmallVec<[NodeId; 4]>;

/// Sibling pointers a parent materializes on one of its children
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Links {
    pub previous_sibling: Option<NodeId>,
    pub next_sibling: Option<NodeId>,
    pub previous_element_sibling: Option<NodeId>,
    pub next_element_sibling: Option<NodeId>,
}

/// Where an inserted child lands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Position {
    End,
    Before(NodeId),
}

/// Insert `child`, first removing any earlier occurrence. Returns the index.
///
/// A reference that is not in the list degrades to an append.
pub(crate) fn insert(children: &mut ChildList, child: NodeId, position: Position) -> usize {
    children.retain(|id| *id != child);
    let index = match position {
        Position::End => children.len(),
        Position::Before(reference) => children
            .iter()
            .position(|&id| id == reference)
            .unwrap_or(children.len()),
    };
    children.insert(index, child);
    index
}

pub(crate) fn remove(children: &mut ChildList, child: NodeId) -> Option<usize> {
    let index = children.iter().position(|&id| id == child)?;
    children.remove(index);
    Some(index)
}

/// Put `new_child` in `old_child`'s slot
pub(crate) fn replace(children: &mut ChildList, new_child: NodeId, old_child: NodeId) -> Option<usize> {
    children.retain(|id| *id != new_child);
    let index = children.iter().position(|&id| id == old_child)?;
    children[index] = new_child;
    Some(index)
}

/// Sibling pointers for every child of one parent
pub(crate) fn links<F>(children: &[NodeId], is_element: F) -> AHashMap<NodeId, Links>
where
    F: Fn(NodeId) -> bool,
{
    let element_siblings = elements::element_siblings(children, &is_element);
    children
        .iter()
        .enumerate()
        .map(|(index, &id)| {
            let (previous_element_sibling, next_element_sibling) =
                element_siblings.get(&id).copied().unwrap_or_default();
            let links = Links {
                previous_sibling: index.checked_sub(1).map(|i| children[i]),
                next_sibling: children.get(index + 1).copied(),
                previous_element_sibling,
                next_element_sibling,
            };
            (id, links)
        })
        .collect()
}

/// Children (in list order) whose pointers differ between two link maps
pub(crate) fn changed_links(
    children: &[NodeId],
    before: &AHashMap<NodeId, Links>,
    after: &AHashMap<NodeId, Links>,
) -> Vec<(NodeId, Links)> {
    children
        .iter()
        .filter_map(|id| {
            let now = after.get(id)?;
            (before.get(id) != Some(now)).then_some((*id, *now))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use smallvec::smallvec;

    #[test]
    fn test_insert_positions() {
        let mut children: ChildList = smallvec![1, 2, 3];
        assert_eq!(insert(&mut children, 4, Position::End), 3);
        assert_eq!(insert(&mut children, 5, Position::Before(2)), 1);
        assert_eq!(children.as_slice(), [1, 5, 2, 3, 4]);

        // Missing reference appends
        assert_eq!(insert(&mut children, 6, Position::Before(99)), 5);
        // Re-inserting moves instead of duplicating
        insert(&mut children, 1, Position::End);
        assert_eq!(children.as_slice(), [5, 2, 3, 4, 6, 1]);
    }

    #[test]
    fn test_remove_and_replace() {
        let mut children: ChildList = smallvec![1, 2, 3];
        assert_eq!(remove(&mut children, 2), Some(1));
        assert_eq!(remove(&mut children, 2), None);
        assert_eq!(replace(&mut children, 9, 3), Some(1));
        assert_eq!(children.as_slice(), [1, 9]);
        assert_eq!(replace(&mut children, 1, 9), Some(0));
        assert_eq!(children.as_slice(), [1]);
        assert_eq!(replace(&mut children, 5, 42), None);
    }

    #[test]
    fn test_links_agree_with_order() {
        let children = [1, 2, 3];
        let map = links(&children, |_| true);
        assert_eq!(map[&1].previous_sibling, None);
        assert_eq!(map[&1].next_sibling, Some(2));
        assert_eq!(map[&2].previous_sibling, Some(1));
        assert_eq!(map[&3].next_sibling, None);
        assert_eq!(map[&3].previous_element_sibling, Some(2));
    }

    #[test]
    fn test_changed_links_only_touches_neighbours() {
        let before = links(&[1, 2, 3], |_| true);
        let after = links(&[1, 2, 3, 4], |_| true);
        let changed = changed_links(&[1, 2, 3, 4], &before, &after);
        let ids: Vec<_> = changed.iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, vec![3, 4]);
    }
}
