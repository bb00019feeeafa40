use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use dom::{DomNode, NodeId, NodeType};
use tokio::sync::{mpsc, watch};

use super::Command;
use crate::error::{Result, TreeError};

/// Cloneable address of one live node
///
/// Carries the actor's mailbox and a watch on its latest published
/// snapshot. Reading the snapshot never goes through the mailbox.
#[derive(Clone)]
pub struct NodeHandle {
    id: NodeId,
    node_type: NodeType,
    tx: mpsc::UnboundedSender<Command>,
    snapshot: watch::Receiver<Arc<DomNode>>,
}

impl NodeHandle {
    pub(crate) fn new(
        id: NodeId,
        node_type: NodeType,
        tx: mpsc::UnboundedSender<Command>,
        snapshot: watch::Receiver<Arc<DomNode>>,
    ) -> Self {
        Self {
            id,
            node_type,
            tx,
            snapshot,
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn node_type(&self) -> NodeType {
        self.node_type
    }

    pub fn is_element(&self) -> bool {
        self.node_type.is_element()
    }

    /// Latest published state. Stays readable after the actor terminates.
    pub fn snapshot(&self) -> Arc<DomNode> {
        self.snapshot.borrow().clone()
    }

    pub fn is_alive(&self) -> bool {
        !self.tx.is_closed()
    }

    /// Resolves once the actor has terminated and dropped its mailbox
    pub async fn closed(&self) {
        self.tx.closed().await
    }

    pub(crate) fn send(&self, command: Command) -> Result<()> {
        self.tx
            .send(command)
            .map_err(|_| TreeError::DeadActor(self.id))
    }

    /// Best-effort follow-up delivery
    pub(crate) fn notify(&self, command: Command) {
        if self.tx.send(command).is_err() {
            tracing::trace!(node = self.id, "dropping follow-up for terminated node");
        }
    }
}

impl fmt::Debug for NodeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeHandle")
            .field("id", &self.id)
            .field("node_type", &self.node_type)
            .field("alive", &self.is_alive())
            .finish()
    }
}

impl PartialEq for NodeHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for NodeHandle {}

impl Hash for NodeHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}
