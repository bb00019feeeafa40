//! Subtree membership bookkeeping
//!
//! Every node keeps the set of its strict descendants. When a subtree is
//! attached or detached, the parent applies the change locally and forwards
//! it to its own parent, which does the same, until the root is reached.
//! A parent's copy of a child subtree is read from the child's published
//! snapshot, so the child reconciles it when it handles the adoption.

use std::sync::Arc;

use dom::{DomNode, MemberSet, NodeId};

use crate::ack::AckToken;
use crate::actor::{Command, NodeHandle};

/// Change forwarded to every ancestor of the splice point
#[derive(Debug, Clone)]
pub(crate) enum MembershipUpdate {
    Join(Arc<[NodeId]>),
    Leave(Arc<[NodeId]>),
}

/// `{node} ∪ node.members`
pub(crate) fn subtree(node: &DomNode) -> Arc<[NodeId]> {
    std::iter::once(node.node_id)
        .chain(node.members.iter().copied())
        .collect()
}

/// Returns how many ids were new
pub(crate) fn join(members: &mut Arc<MemberSet>, nodes: &[NodeId]) -> usize {
    let set = Arc::make_mut(members);
    nodes.iter().filter(|id| set.insert(**id)).count()
}

/// Returns how many ids were present
pub(crate) fn leave(members: &mut Arc<MemberSet>, nodes: &[NodeId]) -> usize {
    if nodes.iter().all(|id| !members.contains(id)) {
        return 0;
    }
    let set = Arc::make_mut(members);
    nodes.iter().filter(|id| set.remove(*id)).count()
}

impl MembershipUpdate {
    pub(crate) fn apply(&self, members: &mut Arc<MemberSet>) -> usize {
        match self {
            Self::Join(nodes) => join(members, nodes),
            Self::Leave(nodes) => leave(members, nodes),
        }
    }
}

/// Hand the update to the next ancestor, if any
pub(crate) fn forward(
    from: NodeId,
    parent: Option<&NodeHandle>,
    update: MembershipUpdate,
    ack: &Option<AckToken>,
) {
    if let Some(parent) = parent {
        parent.notify(Command::Membership {
            from,
            update,
            ack: ack.clone(),
        });
    }
}
