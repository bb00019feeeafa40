//! Event listener registry
//!
//! Listeners are kept outside the node actors, keyed by node id. The first
//! listener on a node starts a monitor task that waits for the node's
//! mailbox to close and then drops every listener of that node.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use dom::NodeId;
use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::task::JoinHandle;

use crate::actor::NodeHandle;

/// Event delivered to listeners
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomEvent {
    pub event_type: String,
    pub target: NodeId,
    #[serde(default)]
    pub detail: Value,
}

impl DomEvent {
    pub fn new(event_type: &str, target: NodeId) -> Self {
        Self {
            event_type: event_type.to_string(),
            target,
            detail: Value::Null,
        }
    }

    pub fn with_detail(mut self, detail: Value) -> Self {
        self.detail = detail;
        self
    }
}

#[async_trait]
pub trait EventListener: Send + Sync {
    async fn handle_event(&self, event: &DomEvent);
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListenerOptions {
    pub capture: bool,
    /// Removed before its first invocation
    pub once: bool,
    pub passive: bool,
}

#[derive(Clone)]
struct ListenerRecord {
    listener: Arc<dyn EventListener>,
    options: ListenerOptions,
}

impl ListenerRecord {
    fn is(&self, listener: &Arc<dyn EventListener>, capture: bool) -> bool {
        same_listener(&self.listener, listener) && self.options.capture == capture
    }
}

fn same_listener(a: &Arc<dyn EventListener>, b: &Arc<dyn EventListener>) -> bool {
    std::ptr::eq(
        Arc::as_ptr(a) as *const (),
        Arc::as_ptr(b) as *const (),
    )
}

struct NodeEntry {
    /// Most recently added first
    by_type: HashMap<String, Vec<ListenerRecord>>,
    monitor: JoinHandle<()>,
}

impl NodeEntry {
    fn len(&self) -> usize {
        self.by_type.values().map(Vec::len).sum()
    }
}

#[derive(Clone, Default)]
pub struct EventRegistry {
    entries: Arc<DashMap<NodeId, NodeEntry>>,
}

impl EventRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_event_listener(
        &self,
        node: &NodeHandle,
        event_type: &str,
        listener: Arc<dyn EventListener>,
        options: ListenerOptions,
    ) {
        if !node.is_alive() {
            tracing::debug!(node = node.id(), event_type, "not listening on a terminated node");
            return;
        }

        let record = ListenerRecord { listener, options };
        match self.entries.entry(node.id()) {
            Entry::Occupied(mut entry) => {
                entry
                    .get_mut()
                    .by_type
                    .entry(event_type.to_string())
                    .or_default()
                    .insert(0, record);
            }
            Entry::Vacant(entry) => {
                let monitor = spawn_monitor(Arc::downgrade(&self.entries), node.clone());
                let mut by_type = HashMap::new();
                by_type.insert(event_type.to_string(), vec![record]);
                entry.insert(NodeEntry { by_type, monitor });
            }
        }
    }

    /// Returns whether a matching listener was registered
    pub fn remove_event_listener(
        &self,
        node_id: NodeId,
        event_type: &str,
        listener: &Arc<dyn EventListener>,
        capture: bool,
    ) -> bool {
        let removed = {
            let Some(mut entry) = self.entries.get_mut(&node_id) else {
                return false;
            };
            let Some(records) = entry.by_type.get_mut(event_type) else {
                return false;
            };
            let before = records.len();
            records.retain(|record| !record.is(listener, capture));
            let removed = records.len() != before;
            if records.is_empty() {
                entry.by_type.remove(event_type);
            }
            removed
        };

        if let Some((_, entry)) = self
            .entries
            .remove_if(&node_id, |_, entry| entry.by_type.is_empty())
        {
            entry.monitor.abort();
        }
        removed
    }

    pub fn listener_count(&self, node_id: NodeId, event_type: &str) -> usize {
        self.entries
            .get(&node_id)
            .and_then(|entry| entry.by_type.get(event_type).map(Vec::len))
            .unwrap_or(0)
    }

    pub fn has_listeners(&self, node_id: NodeId) -> bool {
        self.entries.contains_key(&node_id)
    }

    /// Invoke every listener of `event.target` for `event.event_type`.
    /// Returns how many were invoked.
    pub async fn dispatch(&self, event: &DomEvent) -> usize {
        let records = match self.entries.get(&event.target) {
            Some(entry) => entry
                .by_type
                .get(&event.event_type)
                .cloned()
                .unwrap_or_default(),
            None => return 0,
        };

        for record in records.iter().filter(|record| record.options.once) {
            self.remove_event_listener(
                event.target,
                &event.event_type,
                &record.listener,
                record.options.capture,
            );
        }

        join_all(
            records
                .iter()
                .map(|record| record.listener.handle_event(event)),
        )
        .await;
        records.len()
    }
}

fn spawn_monitor(entries: Weak<DashMap<NodeId, NodeEntry>>, node: NodeHandle) -> JoinHandle<()> {
    tokio::spawn(async move {
        node.closed().await;
        let Some(entries) = entries.upgrade() else {
            return;
        };
        if let Some((node_id, entry)) = entries.remove(&node.id()) {
            tracing::debug!(node = node_id, listeners = entry.len(), "purged listeners of terminated node");
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::Tree;
    use dom::NodeInit;
    use std::sync::Mutex;
    use std::time::Duration;

    struct Recorder {
        name: &'static str,
        log: Arc<Mutex<Vec<&'static str>>>,
    }

    #[async_trait]
    impl EventListener for Recorder {
        async fn handle_event(&self, _event: &DomEvent) {
            self.log.lock().unwrap().push(self.name);
        }
    }

    fn recorder(name: &'static str, log: &Arc<Mutex<Vec<&'static str>>>) -> Arc<dyn EventListener> {
        Arc::new(Recorder {
            name,
            log: log.clone(),
        })
    }

    #[tokio::test]
    async fn test_newest_listener_runs_first() {
        let tree = Tree::default();
        let node = tree.create(NodeInit::element("button"));
        let log = Arc::new(Mutex::new(Vec::new()));
        let registry = tree.listeners();

        registry.add_event_listener(&node, "click", recorder("a", &log), ListenerOptions::default());
        registry.add_event_listener(&node, "click", recorder("b", &log), ListenerOptions::default());

        let invoked = registry.dispatch(&DomEvent::new("click", node.id())).await;
        assert_eq!(invoked, 2);
        assert_eq!(*log.lock().unwrap(), vec!["b", "a"]);
        assert_eq!(registry.dispatch(&DomEvent::new("input", node.id())).await, 0);
    }

    #[tokio::test]
    async fn test_remove_matches_identity_and_capture() {
        let tree = Tree::default();
        let node = tree.create(NodeInit::element("button"));
        let log = Arc::new(Mutex::new(Vec::new()));
        let listener = recorder("a", &log);
        let registry = tree.listeners();

        let capture = ListenerOptions {
            capture: true,
            ..Default::default()
        };
        registry.add_event_listener(&node, "click", listener.clone(), capture);
        assert!(!registry.remove_event_listener(node.id(), "click", &listener, false));
        assert!(!registry.remove_event_listener(node.id(), "click", &recorder("a", &log), true));
        assert!(registry.remove_event_listener(node.id(), "click", &listener, true));
        assert!(!registry.has_listeners(node.id()));
    }

    #[tokio::test]
    async fn test_once_listener_runs_once() {
        let tree = Tree::default();
        let node = tree.create(NodeInit::element("button"));
        let log = Arc::new(Mutex::new(Vec::new()));
        let registry = tree.listeners();
        let once = ListenerOptions {
            once: true,
            ..Default::default()
        };

        registry.add_event_listener(&node, "click", recorder("once", &log), once);
        registry.dispatch(&DomEvent::new("click", node.id())).await;
        registry.dispatch(&DomEvent::new("click", node.id())).await;
        assert_eq!(*log.lock().unwrap(), vec!["once"]);
        assert_eq!(registry.listener_count(node.id(), "click"), 0);
    }

    #[tokio::test]
    async fn test_listeners_purged_when_node_terminates() {
        let tree = Tree::default();
        let node = tree.create(NodeInit::element("div"));
        let log = Arc::new(Mutex::new(Vec::new()));
        let registry = tree.listeners();
        registry.add_event_listener(&node, "click", recorder("a", &log), ListenerOptions::default());
        assert_eq!(registry.listener_count(node.id(), "click"), 1);

        tree.terminate(&node).await.unwrap();
        tokio::time::timeout(Duration::from_secs(1), async {
            while registry.has_listeners(node.id()) {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("listeners were not purged");

        // Registering on a dead node is a no-op
        registry.add_event_listener(&node, "click", recorder("b", &log), ListenerOptions::default());
        assert!(!registry.has_listeners(node.id()));
    }
}
