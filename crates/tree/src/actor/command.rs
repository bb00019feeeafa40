use std::sync::Arc;

use dom::{DomNode, Field, NodeId};
use tokio::sync::oneshot;

use super::NodeHandle;
use crate::ack::AckToken;
use crate::elements::DocumentSlot;
use crate::error::Result;
use crate::membership::MembershipUpdate;
use crate::mutator::Links;
use crate::notify::{MutationKind, MutationOptions};

/// Structural change requested of a parent
#[derive(Debug, Clone)]
pub(crate) enum Mutation {
    Append {
        child: NodeHandle,
    },
    InsertBefore {
        child: NodeHandle,
        reference: NodeId,
    },
    Remove {
        child: NodeId,
    },
    Replace {
        new_child: NodeHandle,
        old_child: NodeId,
    },
}

impl Mutation {
    pub(crate) fn kind(&self) -> MutationKind {
        match self {
            Self::Append { .. } => MutationKind::AppendChild,
            Self::InsertBefore { .. } => MutationKind::InsertBefore,
            Self::Remove { .. } => MutationKind::RemoveChild,
            Self::Replace { .. } => MutationKind::ReplaceChild,
        }
    }
}

/// Mailbox message of a node actor
///
/// Every variant that is follow-up work of a structural change carries the
/// caller's ack token, if any, and holds it until the handler returns.
#[derive(Debug)]
pub(crate) enum Command {
    Get {
        reply: oneshot::Sender<Arc<DomNode>>,
    },
    Put {
        fields: Vec<Field>,
        reply: Option<oneshot::Sender<Arc<DomNode>>>,
    },
    Mutate {
        mutation: Mutation,
        options: MutationOptions,
        ack: Option<AckToken>,
        reply: Option<oneshot::Sender<Result<Arc<DomNode>>>>,
    },
    /// Sent by a new parent to the child it just attached. `joined` is the
    /// subtree the parent added to its members, `None` for a reorder.
    Adopt {
        parent: NodeHandle,
        links: Links,
        joined: Option<Arc<[NodeId]>>,
        ack: Option<AckToken>,
    },
    /// Sibling pointers changed; ignored unless `parent` is still the parent
    Relink {
        parent: NodeId,
        links: Links,
        ack: Option<AckToken>,
    },
    /// Detached; ignored unless `parent` is still the parent
    Orphan {
        parent: NodeId,
        ack: Option<AckToken>,
    },
    /// `from` is the child that forwarded the update
    Membership {
        from: NodeId,
        update: MembershipUpdate,
        ack: Option<AckToken>,
    },
    /// `cascade` forwards the owner to every member
    SetOwner {
        document: NodeId,
        cascade: bool,
        ack: Option<AckToken>,
    },
    Bind {
        slot: DocumentSlot,
        node: NodeId,
        ack: Option<AckToken>,
    },
    Unbind {
        nodes: Arc<[NodeId]>,
        ack: Option<AckToken>,
    },
    Terminate {
        reply: Option<oneshot::Sender<()>>,
    },
}
