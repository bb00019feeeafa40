//! Error types for live tree operations

use dom::{DomError, NodeId};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TreeError {
    #[error("Node actor {0} has terminated")]
    DeadActor(NodeId),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Concurrent task failed: {0}")]
    TaskFailure(String),

    #[error("Cannot insert node {child} under {parent}: it is the parent or one of its ancestors")]
    HierarchyRequest { parent: NodeId, child: NodeId },

    #[error("DOM error: {0}")]
    Dom(#[from] DomError),
}

/// Result type for tree operations
pub type Result<T> = std::result::Result<T, TreeError>;
