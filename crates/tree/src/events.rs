//! Tree lifecycle events
//!
//! One bus per tree. Structural events are published by the child's actor
//! when it takes or drops a parent pointer, so the events about one node
//! arrive in the order that node applied them.

use std::sync::Arc;

use dom::{NodeId, NodeType};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TreeEvent {
    NodeCreated { node_id: NodeId, node_type: NodeType },
    Attached { node_id: NodeId, parent_id: NodeId },
    Detached { node_id: NodeId, parent_id: NodeId },
    NodeTerminated { node_id: NodeId, node_type: NodeType },
}

impl TreeEvent {
    /// Node the event is about
    pub fn node_id(&self) -> NodeId {
        match self {
            Self::NodeCreated { node_id, .. }
            | Self::Attached { node_id, .. }
            | Self::Detached { node_id, .. }
            | Self::NodeTerminated { node_id, .. } => *node_id,
        }
    }
}

/// Lifecycle event bus of one tree, backed by a tokio broadcast channel
#[derive(Debug, Clone)]
pub struct EventBus {
    tree_id: Arc<str>,
    tx: broadcast::Sender<TreeEvent>,
}

impl EventBus {
    pub fn new(tree_id: &str) -> Self {
        let (tx, _) = broadcast::channel(1024);
        Self {
            tree_id: Arc::from(tree_id),
            tx,
        }
    }

    pub fn tree_id(&self) -> &str {
        &self.tree_id
    }

    pub fn publish(&self, event: TreeEvent) {
        tracing::trace!(tree = %self.tree_id, ?event, "tree event");
        let _ = self.tx.send(event); // no subscribers
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TreeEvent> {
        self.tx.subscribe()
    }

    /// Subscribe to the events about `node_id` only
    pub fn watch_node(&self, node_id: NodeId) -> NodeEvents {
        NodeEvents {
            tree_id: self.tree_id.clone(),
            node_id,
            rx: self.tx.subscribe(),
            terminated: false,
        }
    }
}

/// Receiver filtered to one node
#[derive(Debug)]
pub struct NodeEvents {
    tree_id: Arc<str>,
    node_id: NodeId,
    rx: broadcast::Receiver<TreeEvent>,
    terminated: bool,
}

impl NodeEvents {
    /// Next event about the node. `None` once the bus is gone or after the
    /// node's termination has been delivered.
    pub async fn recv(&mut self) -> Option<TreeEvent> {
        if self.terminated {
            return None;
        }
        loop {
            match self.rx.recv().await {
                Ok(event) if event.node_id() == self.node_id => {
                    self.terminated = matches!(event, TreeEvent::NodeTerminated { .. });
                    return Some(event);
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(
                        tree = %self.tree_id,
                        node = self.node_id,
                        skipped,
                        "node event watcher lagged"
                    );
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_event_bus() {
        let bus = EventBus::new("t");
        let mut rx = bus.subscribe();

        bus.publish(TreeEvent::NodeTerminated {
            node_id: 4,
            node_type: NodeType::Text,
        });

        match rx.recv().await {
            Ok(TreeEvent::NodeTerminated { node_id: 4, .. }) => {}
            other => panic!("Expected NodeTerminated event, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_watch_node_filters_other_nodes() {
        let bus = EventBus::new("t");
        let mut watcher = bus.watch_node(2);

        bus.publish(TreeEvent::Attached {
            node_id: 3,
            parent_id: 1,
        });
        bus.publish(TreeEvent::Attached {
            node_id: 2,
            parent_id: 1,
        });
        assert_eq!(
            watcher.recv().await,
            Some(TreeEvent::Attached {
                node_id: 2,
                parent_id: 1
            })
        );
        assert_eq!(bus.tree_id(), "t");
    }

    #[test]
    fn test_publish_without_subscribers() {
        EventBus::new("t").publish(TreeEvent::NodeCreated {
            node_id: 1,
            node_type: NodeType::Element,
        });
    }
}
