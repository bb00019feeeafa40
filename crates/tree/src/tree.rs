//! Tree facade
//!
//! The entry point callers use. Owns the shared context every node actor
//! sees, and turns each public operation into mailbox traffic plus the
//! caller-side waiting that makes the blocking variants blocking.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use dom::{DomNode, Field, NodeId, NodeInit, Selector};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, oneshot};
use tokio::time::timeout;
use uuid::Uuid;

use crate::ack;
use crate::actor::{self, Command, Mutation, NodeHandle};
use crate::context::TreeContext;
use crate::error::{Result, TreeError};
use crate::events::{EventBus, TreeEvent};
use crate::listeners::EventRegistry;
use crate::notify::{JsonEncoder, MutationOptions, NodeEncoder};
use crate::query::{self, QueryEngine};

/// Tree configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeConfig {
    /// Identifies this tree in logs
    pub id: String,
    /// Deadline of every scatter/gather round of a query
    pub query_timeout: Duration,
    /// Bound on each wait of a blocking call
    pub mutation_timeout: Duration,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            query_timeout: Duration::from_secs(5),
            mutation_timeout: Duration::from_secs(5),
        }
    }
}

/// Handle to one live tree. Cheap to clone.
///
/// Creating nodes spawns tokio tasks, so a `Tree` must be used from
/// within a tokio runtime.
#[derive(Clone)]
pub struct Tree {
    context: Arc<TreeContext>,
    listeners: EventRegistry,
}

impl Tree {
    pub fn new(config: TreeConfig) -> Self {
        Self::with_encoder(config, Arc::new(JsonEncoder))
    }

    /// Use `encoder` for the payload of mutation records
    pub fn with_encoder(config: TreeConfig, encoder: Arc<dyn NodeEncoder>) -> Self {
        tracing::debug!(tree = %config.id, "creating tree");
        Self {
            context: Arc::new(TreeContext::new(config, encoder)),
            listeners: EventRegistry::new(),
        }
    }

    pub fn config(&self) -> &TreeConfig {
        &self.context.config
    }

    /// Lifecycle events of this tree's nodes
    pub fn events(&self) -> &EventBus {
        &self.context.events
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TreeEvent> {
        self.context.events.subscribe()
    }

    pub fn listeners(&self) -> &EventRegistry {
        &self.listeners
    }

    /// Number of live nodes
    pub fn len(&self) -> usize {
        self.context.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.context.nodes.is_empty()
    }

    // --- node lifecycle ---

    /// Spawn a detached node
    pub fn create(&self, init: NodeInit) -> NodeHandle {
        let node_id = self.context.allocate_id();
        let node = DomNode::from_init(node_id, init);
        let node_type = node.node_type;
        let handle = actor::spawn(self.context.clone(), node);
        self.context.nodes.insert(node_id, handle.clone());
        self.context
            .events
            .publish(TreeEvent::NodeCreated { node_id, node_type });
        tracing::debug!(tree = %self.context.config.id, node = node_id, ?node_type, "created node");
        handle
    }

    /// Handle of a live node
    pub fn handle(&self, node_id: NodeId) -> Option<NodeHandle> {
        self.context.lookup(node_id)
    }

    /// Snapshot taken after every request already queued at `node`
    pub async fn get(&self, node: &NodeHandle) -> Result<Arc<DomNode>> {
        let (reply, response) = oneshot::channel();
        node.send(Command::Get { reply })?;
        self.await_reply(node.id(), response).await
    }

    /// Latest published snapshot, without queueing
    pub fn snapshot(&self, node: &NodeHandle) -> Arc<DomNode> {
        node.snapshot()
    }

    pub async fn put(&self, node: &NodeHandle, field: Field) -> Result<Arc<DomNode>> {
        self.merge(node, vec![field]).await
    }

    pub fn put_nowait(&self, node: &NodeHandle, field: Field) -> Result<()> {
        self.merge_nowait(node, vec![field])
    }

    /// Apply `fields` in order as one state change
    pub async fn merge(&self, node: &NodeHandle, fields: Vec<Field>) -> Result<Arc<DomNode>> {
        let (reply, response) = oneshot::channel();
        node.send(Command::Put {
            fields,
            reply: Some(reply),
        })?;
        self.await_reply(node.id(), response).await
    }

    pub fn merge_nowait(&self, node: &NodeHandle, fields: Vec<Field>) -> Result<()> {
        node.send(Command::Put {
            fields,
            reply: None,
        })
    }

    /// Stop a node's actor. Its parent drops it and its children are
    /// orphaned; the handle reports [`TreeError::DeadActor`] from then on.
    pub async fn terminate(&self, node: &NodeHandle) -> Result<()> {
        let (reply, response) = oneshot::channel();
        node.send(Command::Terminate { reply: Some(reply) })?;
        self.await_reply(node.id(), response).await
    }

    /// Terminate every live node and wait for the actors to stop
    pub async fn shutdown(&self) {
        let nodes: Vec<NodeHandle> = self
            .context
            .nodes
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        tracing::debug!(tree = %self.context.config.id, nodes = nodes.len(), "shutting down");

        for node in &nodes {
            node.notify(Command::Terminate { reply: None });
        }
        for node in &nodes {
            if timeout(self.context.config.mutation_timeout, node.closed())
                .await
                .is_err()
            {
                tracing::warn!(node = node.id(), "node did not stop before the deadline");
            }
        }
    }

    // --- structure ---

    /// Append `child` as the last child of `parent`, detaching it from any
    /// previous parent first. Returns the new parent snapshot.
    pub async fn append_child(
        &self,
        parent: &NodeHandle,
        child: &NodeHandle,
        options: MutationOptions,
    ) -> Result<Arc<DomNode>> {
        self.prepare_attach(parent, child).await?;
        self.mutate(
            parent,
            Mutation::Append {
                child: child.clone(),
            },
            options,
        )
        .await
    }

    /// Splice `new_node` immediately before `reference`. A reference that
    /// is not a child of `parent` makes this an append.
    pub async fn insert_before(
        &self,
        parent: &NodeHandle,
        new_node: &NodeHandle,
        reference: &NodeHandle,
        options: MutationOptions,
    ) -> Result<Arc<DomNode>> {
        self.prepare_attach(parent, new_node).await?;
        self.mutate(
            parent,
            Mutation::InsertBefore {
                child: new_node.clone(),
                reference: reference.id(),
            },
            options,
        )
        .await
    }

    /// Detach `child` and its subtree. A node that is not a child is left
    /// alone.
    pub async fn remove_child(
        &self,
        parent: &NodeHandle,
        child: &NodeHandle,
        options: MutationOptions,
    ) -> Result<Arc<DomNode>> {
        self.mutate(parent, Mutation::Remove { child: child.id() }, options)
            .await
    }

    /// Put `new_child` in `old_child`'s position
    pub async fn replace_child(
        &self,
        parent: &NodeHandle,
        new_child: &NodeHandle,
        old_child: &NodeHandle,
        options: MutationOptions,
    ) -> Result<Arc<DomNode>> {
        self.prepare_attach(parent, new_child).await?;
        self.mutate(
            parent,
            Mutation::Replace {
                new_child: new_child.clone(),
                old_child: old_child.id(),
            },
            options,
        )
        .await
    }

    pub fn append_child_nowait(&self, parent: &NodeHandle, child: &NodeHandle, options: MutationOptions) {
        let (tree, parent, child) = (self.clone(), parent.clone(), child.clone());
        spawn_detached("appendChild", async move {
            tree.append_child(&parent, &child, options).await
        });
    }

    pub fn insert_before_nowait(
        &self,
        parent: &NodeHandle,
        new_node: &NodeHandle,
        reference: &NodeHandle,
        options: MutationOptions,
    ) {
        let (tree, parent, new_node, reference) =
            (self.clone(), parent.clone(), new_node.clone(), reference.clone());
        spawn_detached("insertBefore", async move {
            tree.insert_before(&parent, &new_node, &reference, options).await
        });
    }

    pub fn remove_child_nowait(&self, parent: &NodeHandle, child: &NodeHandle, options: MutationOptions) {
        let (tree, parent, child) = (self.clone(), parent.clone(), child.clone());
        spawn_detached("removeChild", async move {
            tree.remove_child(&parent, &child, options).await
        });
    }

    pub fn replace_child_nowait(
        &self,
        parent: &NodeHandle,
        new_child: &NodeHandle,
        old_child: &NodeHandle,
        options: MutationOptions,
    ) {
        let (tree, parent, new_child, old_child) =
            (self.clone(), parent.clone(), new_child.clone(), old_child.clone());
        spawn_detached("replaceChild", async move {
            tree.replace_child(&parent, &new_child, &old_child, options).await
        });
    }

    /// Reject cycles early and detach `child` from a different parent
    async fn prepare_attach(&self, parent: &NodeHandle, child: &NodeHandle) -> Result<()> {
        let snapshot = self.get(child).await?;
        if child.id() == parent.id() || snapshot.has_member(parent.id()) {
            return Err(TreeError::HierarchyRequest {
                parent: parent.id(),
                child: child.id(),
            });
        }

        let Some(previous) = snapshot.parent_id.filter(|&id| id != parent.id()) else {
            return Ok(());
        };
        let Some(previous) = self.handle(previous) else {
            return Ok(());
        };
        tracing::debug!(child = child.id(), from = previous.id(), to = parent.id(), "moving node");
        match self
            .remove_child(&previous, child, MutationOptions::default())
            .await
        {
            Ok(_) | Err(TreeError::DeadActor(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn mutate(
        &self,
        parent: &NodeHandle,
        mutation: Mutation,
        options: MutationOptions,
    ) -> Result<Arc<DomNode>> {
        let (token, barrier) = ack::barrier();
        let (reply, response) = oneshot::channel();
        parent.send(Command::Mutate {
            mutation,
            options,
            ack: Some(token),
            reply: Some(reply),
        })?;

        let snapshot = self.await_reply(parent.id(), response).await??;
        timeout(self.context.config.mutation_timeout, barrier.wait())
            .await
            .map_err(|_| {
                TreeError::Timeout(format!(
                    "follow-up work of a change to node {} did not finish",
                    parent.id()
                ))
            })?;
        Ok(snapshot)
    }

    async fn await_reply<T>(&self, node_id: NodeId, response: oneshot::Receiver<T>) -> Result<T> {
        match timeout(self.context.config.mutation_timeout, response).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(_)) => Err(TreeError::DeadActor(node_id)),
            Err(_) => Err(TreeError::Timeout(format!("no reply from node {}", node_id))),
        }
    }

    // --- queries ---

    /// First member of `root` matching `selector`
    pub async fn query_selector(
        &self,
        root: &NodeHandle,
        selector: &Selector,
    ) -> Result<Option<NodeHandle>> {
        let scope = self.get(root).await?;
        let arena = query::collect(&self.context, &scope, query::needs_whole_tree(selector));
        let found = self.engine().select_first(arena, scope, selector).await?;
        Ok(found.and_then(|id| self.handle(id)))
    }

    /// Every member of `root` matching `selector`, in document order
    pub async fn query_selector_all(
        &self,
        root: &NodeHandle,
        selector: &Selector,
    ) -> Result<Vec<NodeHandle>> {
        let scope = self.get(root).await?;
        let arena = query::collect(&self.context, &scope, query::needs_whole_tree(selector));
        let found = self.engine().select_all(arena, scope, selector).await?;
        Ok(found.into_iter().filter_map(|id| self.handle(id)).collect())
    }

    fn engine(&self) -> QueryEngine {
        QueryEngine::new(self.context.config.query_timeout)
    }

    // --- membership ---

    /// Whether `candidate` is `ancestor` or one of its descendants
    pub async fn contains(&self, ancestor: &NodeHandle, candidate: &NodeHandle) -> Result<bool> {
        if ancestor.id() == candidate.id() {
            return Ok(true);
        }
        Ok(self.get(ancestor).await?.has_member(candidate.id()))
    }

    /// Top-most ancestor of `node`, or `node` itself when detached
    pub async fn root_node(&self, node: &NodeHandle) -> Result<NodeHandle> {
        let snapshot = self.get(node).await?;
        let top = query::top_most(&self.context, &snapshot);
        Ok(self.handle(top.node_id).unwrap_or_else(|| node.clone()))
    }
}

impl Default for Tree {
    fn default() -> Self {
        Self::new(TreeConfig::default())
    }
}

fn spawn_detached<F>(operation: &'static str, mutation: F)
where
    F: Future<Output = Result<Arc<DomNode>>> + Send + 'static,
{
    tokio::spawn(async move {
        if let Err(e) = mutation.await {
            tracing::warn!(operation, "fire-and-forget mutation failed: {}", e);
        }
    });
}
