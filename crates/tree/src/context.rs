//! State shared by every actor of one tree

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use dom::NodeId;

use crate::actor::NodeHandle;
use crate::events::EventBus;
use crate::notify::NodeEncoder;
use crate::tree::TreeConfig;

pub(crate) struct TreeContext {
    pub config: TreeConfig,
    /// Live nodes by id. Actors remove themselves on termination.
    pub nodes: DashMap<NodeId, NodeHandle>,
    pub encoder: Arc<dyn NodeEncoder>,
    pub events: EventBus,
    next_id: AtomicU64,
}

impl TreeContext {
    pub(crate) fn new(config: TreeConfig, encoder: Arc<dyn NodeEncoder>) -> Self {
        Self {
            events: EventBus::new(&config.id),
            config,
            nodes: DashMap::new(),
            encoder,
            next_id: AtomicU64::new(1),
        }
    }

    pub(crate) fn allocate_id(&self) -> NodeId {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    pub(crate) fn lookup(&self, id: NodeId) -> Option<NodeHandle> {
        self.nodes.get(&id).map(|entry| entry.value().clone())
    }
}
