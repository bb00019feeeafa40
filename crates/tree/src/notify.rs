//! Mutation notifications
//!
//! A caller that wants to observe a structural change passes a receiver in
//! [`MutationOptions`]. The parent actor sends one [`MutationRecord`] per
//! change it applies, optionally carrying an encoded form of the affected
//! node produced by the tree's [`NodeEncoder`].

use dom::{DomNode, NodeId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MutationKind {
    AppendChild,
    InsertBefore,
    RemoveChild,
    ReplaceChild,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MutationRecord {
    pub kind: MutationKind,
    /// Parent whose child list changed
    pub target: NodeId,
    pub added: Vec<NodeId>,
    pub removed: Vec<NodeId>,
    /// Reference node of an insert, when one was given
    pub reference: Option<NodeId>,
    /// Encoded form of the inserted node
    pub encoded: Option<Value>,
}

/// Per-call options for structural operations
#[derive(Debug, Clone, Default)]
pub struct MutationOptions {
    pub receiver: Option<mpsc::UnboundedSender<MutationRecord>>,
}

impl MutationOptions {
    pub fn notify(receiver: mpsc::UnboundedSender<MutationRecord>) -> Self {
        Self {
            receiver: Some(receiver),
        }
    }
}

/// Turns a node snapshot into the payload attached to mutation records
pub trait NodeEncoder: Send + Sync {
    fn encode(&self, node: &DomNode) -> Option<Value>;
}

/// Default encoder: the snapshot's serde representation
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonEncoder;

impl NodeEncoder for JsonEncoder {
    fn encode(&self, node: &DomNode) -> Option<Value> {
        match serde_json::to_value(node) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(node = node.node_id, "failed to encode node: {}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dom::NodeInit;

    #[test]
    fn test_json_encoder() {
        let node = DomNode::from_init(3, NodeInit::element("div").with_id("x"));
        let value = JsonEncoder.encode(&node).unwrap();
        assert_eq!(value["node_id"], 3);
        assert_eq!(value["node_name"], "div");
        assert_eq!(value["attributes"]["id"], "x");
    }

    #[test]
    fn test_record_wire_names() {
        let record = MutationRecord {
            kind: MutationKind::InsertBefore,
            target: 1,
            added: vec![2],
            removed: vec![],
            reference: Some(3),
            encoded: None,
        };
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["kind"], "insertBefore");
        assert_eq!(value["reference"], 3);
    }
}
