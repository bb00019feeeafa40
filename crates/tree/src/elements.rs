//! Element-only overlay
//!
//! Filters a parent's child list down to its elements and derives the
//! element sibling pointers from it. Non-element children never receive
//! element sibling pointers. Also routes reserved tags into the owning
//! document's singleton and aggregate bindings.

use ahash::AHashMap;
use dom::{DocumentData, NodeId};

use crate::mutator::ChildList;

/// Element children, preserving relative order
pub(crate) fn project<F>(children: &[NodeId], is_element: F) -> ChildList
where
    F: Fn(NodeId) -> bool,
{
    children.iter().copied().filter(|&id| is_element(id)).collect()
}

/// `(previous_element_sibling, next_element_sibling)` for each element child
pub(crate) fn element_siblings<F>(
    children: &[NodeId],
    is_element: F,
) -> AHashMap<NodeId, (Option<NodeId>, Option<NodeId>)>
where
    F: Fn(NodeId) -> bool,
{
    let elements = project(children, is_element);
    elements
        .iter()
        .enumerate()
        .map(|(index, &id)| {
            let previous = index.checked_sub(1).map(|i| elements[i]);
            let next = elements.get(index + 1).copied();
            (id, (previous, next))
        })
        .collect()
}

/// Document binding a reserved tag feeds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DocumentSlot {
    Body,
    Head,
    Form,
    Image,
    Script,
}

impl DocumentSlot {
    pub(crate) fn for_tag(tag: &str) -> Option<Self> {
        match tag.to_ascii_lowercase().as_str() {
            "body" => Some(Self::Body),
            "head" => Some(Self::Head),
            "form" => Some(Self::Form),
            "img" => Some(Self::Image),
            "script" => Some(Self::Script),
            _ => None,
        }
    }
}

/// Returns whether the document changed
pub(crate) fn bind(document: &mut DocumentData, slot: DocumentSlot, node: NodeId) -> bool {
    let list = match slot {
        DocumentSlot::Body => return replace_singleton(&mut document.body, node),
        DocumentSlot::Head => return replace_singleton(&mut document.head, node),
        DocumentSlot::Form => &mut document.forms,
        DocumentSlot::Image => &mut document.images,
        DocumentSlot::Script => &mut document.scripts,
    };
    if list.contains(&node) {
        return false;
    }
    list.push(node);
    true
}

fn replace_singleton(slot: &mut Option<NodeId>, node: NodeId) -> bool {
    let changed = *slot != Some(node);
    *slot = Some(node);
    changed
}

/// Drop every binding that refers to one of `nodes`. Returns whether the
/// document changed.
pub(crate) fn unbind(document: &mut DocumentData, nodes: &[NodeId]) -> bool {
    let mut changed = false;
    for singleton in [&mut document.body, &mut document.head] {
        if singleton.is_some_and(|id| nodes.contains(&id)) {
            *singleton = None;
            changed = true;
        }
    }
    for list in [
        &mut document.forms,
        &mut document.images,
        &mut document.scripts,
    ] {
        let before = list.len();
        list.retain(|id| !nodes.contains(id));
        changed |= list.len() != before;
    }
    changed
}
