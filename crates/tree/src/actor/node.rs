use std::sync::Arc;

use ahash::{AHashMap, AHashSet};
use dom::{DomNode, Field, NodeId};
use tokio::sync::{mpsc, watch};

use super::{Command, Mutation, NodeHandle};
use crate::ack::AckToken;
use crate::context::TreeContext;
use crate::elements::{self, DocumentSlot};
use crate::error::{Result, TreeError};
use crate::events::TreeEvent;
use crate::membership::{self, MembershipUpdate};
use crate::mutator::{self, Links, Position};
use crate::notify::{MutationKind, MutationOptions, MutationRecord};

enum Flow {
    Continue,
    Stop,
}

/// Sole owner of one node's state
///
/// Handlers never wait on another actor. Anything another node has to do as
/// a consequence of a change here is sent to it as a follow-up message
/// after the local state has been published.
pub(crate) struct NodeActor {
    state: DomNode,
    me: NodeHandle,
    parent: Option<NodeHandle>,
    children: AHashMap<NodeId, NodeHandle>,
    context: Arc<TreeContext>,
    publisher: watch::Sender<Arc<DomNode>>,
}

/// Start an actor for `node` and return its handle. The caller registers it.
pub(crate) fn spawn(context: Arc<TreeContext>, node: DomNode) -> NodeHandle {
    let (tx, inbox) = mpsc::unbounded_channel();
    let (publisher, snapshot) = watch::channel(Arc::new(node.clone()));
    let handle = NodeHandle::new(node.node_id, node.node_type, tx, snapshot);

    let actor = NodeActor {
        state: node,
        me: handle.clone(),
        parent: None,
        children: AHashMap::new(),
        context,
        publisher,
    };
    tokio::spawn(actor.run(inbox));
    handle
}

impl NodeActor {
    async fn run(mut self, mut inbox: mpsc::UnboundedReceiver<Command>) {
        let node_id = self.state.node_id;
        tracing::trace!(node = node_id, "node actor started");

        while let Some(command) = inbox.recv().await {
            if let Flow::Stop = self.handle(command) {
                break;
            }
        }

        // Dropping the inbox closes every handle's `closed()` future
        drop(inbox);
        tracing::debug!(node = node_id, "node actor stopped");
    }

    fn handle(&mut self, command: Command) -> Flow {
        match command {
            Command::Get { reply } => {
                let _ = reply.send(self.current());
            }
            Command::Put { fields, reply } => {
                let snapshot = self.put(fields);
                if let Some(reply) = reply {
                    let _ = reply.send(snapshot);
                }
            }
            Command::Mutate {
                mutation,
                options,
                ack,
                reply,
            } => {
                let result = self.mutate(mutation, &options, ack);
                match reply {
                    Some(reply) => {
                        let _ = reply.send(result);
                    }
                    None => {
                        if let Err(e) = result {
                            tracing::warn!(node = self.state.node_id, "mutation failed: {}", e);
                        }
                    }
                }
            }
            Command::Adopt {
                parent,
                links,
                joined,
                ack,
            } => self.adopt(parent, links, joined, ack),
            Command::Relink { parent, links, ack } => self.relink(parent, links, ack),
            Command::Orphan { parent, ack } => self.orphan(parent, ack),
            Command::Membership { from, update, ack } => {
                self.update_membership(from, update, ack)
            }
            Command::SetOwner {
                document,
                cascade,
                ack,
            } => self.set_owner(document, cascade, ack),
            Command::Bind { slot, node, ack } => self.bind(slot, node, ack),
            Command::Unbind { nodes, ack } => self.unbind(&nodes, ack),
            Command::Terminate { reply } => {
                self.terminate();
                if let Some(reply) = reply {
                    let _ = reply.send(());
                }
                return Flow::Stop;
            }
        }
        Flow::Continue
    }

    fn publish(&self) -> Arc<DomNode> {
        let snapshot = Arc::new(self.state.clone());
        self.publisher.send_replace(snapshot.clone());
        snapshot
    }

    fn current(&self) -> Arc<DomNode> {
        self.publisher.borrow().clone()
    }

    fn put(&mut self, fields: Vec<Field>) -> Arc<DomNode> {
        for field in fields {
            self.state.apply(field);
        }
        self.publish()
    }

    fn mutate(
        &mut self,
        mutation: Mutation,
        options: &MutationOptions,
        ack: Option<AckToken>,
    ) -> Result<Arc<DomNode>> {
        let kind = mutation.kind();
        match mutation {
            Mutation::Append { child } => self.attach(kind, child, Position::End, options, ack),
            Mutation::InsertBefore { child, reference } => {
                self.attach(kind, child, Position::Before(reference), options, ack)
            }
            Mutation::Remove { child } => Ok(self.detach(child, options, ack)),
            Mutation::Replace {
                new_child,
                old_child,
            } => self.replace(new_child, old_child, options, ack),
        }
    }

    // --- structural changes (this node is the parent) ---

    fn attach(
        &mut self,
        kind: MutationKind,
        child: NodeHandle,
        position: Position,
        options: &MutationOptions,
        ack: Option<AckToken>,
    ) -> Result<Arc<DomNode>> {
        let child_id = child.id();
        let child_snapshot = child.snapshot();
        self.check_hierarchy(&child_snapshot)?;

        let already_ours = self.children.contains_key(&child_id);
        if !already_ours {
            self.release_from_previous_parent(&child_snapshot, &ack);
        }

        let position = match position {
            Position::Before(reference) if reference == child_id => Position::End,
            Position::Before(reference) if !self.children.contains_key(&reference) => {
                tracing::debug!(
                    node = self.state.node_id,
                    reference,
                    "reference is not a child, appending"
                );
                Position::End
            }
            other => other,
        };

        let before = self.links();
        mutator::insert(&mut self.state.children_ids, child_id, position);
        self.children.insert(child_id, child.clone());

        let joined = (!already_ours).then(|| membership::subtree(&child_snapshot));
        if let Some(joined) = &joined {
            membership::join(&mut self.state.members, joined);
        }
        self.refresh_projection();
        let after = self.links();
        let snapshot = self.publish();

        child.notify(Command::Adopt {
            parent: self.me.clone(),
            links: after.get(&child_id).copied().unwrap_or_default(),
            joined: joined.clone(),
            ack: ack.clone(),
        });
        self.send_relinks(&before, &after, Some(child_id), &ack);
        if let Some(joined) = joined {
            membership::forward(
                self.state.node_id,
                self.parent.as_ref(),
                MembershipUpdate::Join(joined),
                &ack,
            );
            self.cascade_owner(&child, &ack);
        }

        let reference = match position {
            Position::Before(reference) => Some(reference),
            Position::End => None,
        };
        self.report(
            options,
            kind,
            vec![child_id],
            Vec::new(),
            reference,
            Some(child_snapshot.as_ref()),
        );
        tracing::trace!(node = self.state.node_id, child = child_id, ?kind, "attached");
        Ok(snapshot)
    }

    fn detach(
        &mut self,
        child_id: NodeId,
        options: &MutationOptions,
        ack: Option<AckToken>,
    ) -> Arc<DomNode> {
        let Some(child) = self.children.remove(&child_id) else {
            tracing::debug!(
                node = self.state.node_id,
                child = child_id,
                "not a child, nothing to remove"
            );
            return self.current();
        };
        let child_snapshot = child.snapshot();

        let before = self.links();
        mutator::remove(&mut self.state.children_ids, child_id);
        let left = membership::subtree(&child_snapshot);
        membership::leave(&mut self.state.members, &left);
        self.refresh_projection();
        self.unbind_local(&left);
        let after = self.links();
        let snapshot = self.publish();

        child.notify(Command::Orphan {
            parent: self.state.node_id,
            ack: ack.clone(),
        });
        self.send_relinks(&before, &after, None, &ack);
        membership::forward(
            self.state.node_id,
            self.parent.as_ref(),
            MembershipUpdate::Leave(left.clone()),
            &ack,
        );
        self.unbind_remote(left, &ack);

        self.report(
            options,
            MutationKind::RemoveChild,
            Vec::new(),
            vec![child_id],
            None,
            None,
        );
        tracing::trace!(node = self.state.node_id, child = child_id, "detached");
        snapshot
    }

    fn replace(
        &mut self,
        new_child: NodeHandle,
        old_child_id: NodeId,
        options: &MutationOptions,
        ack: Option<AckToken>,
    ) -> Result<Arc<DomNode>> {
        let new_id = new_child.id();
        if new_id == old_child_id || !self.children.contains_key(&old_child_id) {
            tracing::debug!(
                node = self.state.node_id,
                old_child = old_child_id,
                "nothing to replace"
            );
            return Ok(self.current());
        }

        let new_snapshot = new_child.snapshot();
        self.check_hierarchy(&new_snapshot)?;
        let already_ours = self.children.contains_key(&new_id);
        if !already_ours {
            self.release_from_previous_parent(&new_snapshot, &ack);
        }

        let Some(old_child) = self.children.remove(&old_child_id) else {
            return Ok(self.current());
        };
        let old_snapshot = old_child.snapshot();

        let before = self.links();
        mutator::replace(&mut self.state.children_ids, new_id, old_child_id);
        self.children.insert(new_id, new_child.clone());

        let left = membership::subtree(&old_snapshot);
        membership::leave(&mut self.state.members, &left);
        let joined = (!already_ours).then(|| membership::subtree(&new_snapshot));
        if let Some(joined) = &joined {
            membership::join(&mut self.state.members, joined);
        }
        self.refresh_projection();
        self.unbind_local(&left);
        let after = self.links();
        let snapshot = self.publish();

        old_child.notify(Command::Orphan {
            parent: self.state.node_id,
            ack: ack.clone(),
        });
        new_child.notify(Command::Adopt {
            parent: self.me.clone(),
            links: after.get(&new_id).copied().unwrap_or_default(),
            joined: joined.clone(),
            ack: ack.clone(),
        });
        self.send_relinks(&before, &after, Some(new_id), &ack);
        membership::forward(
            self.state.node_id,
            self.parent.as_ref(),
            MembershipUpdate::Leave(left.clone()),
            &ack,
        );
        self.unbind_remote(left, &ack);
        if let Some(joined) = joined {
            membership::forward(
                self.state.node_id,
                self.parent.as_ref(),
                MembershipUpdate::Join(joined),
                &ack,
            );
            self.cascade_owner(&new_child, &ack);
        }

        self.report(
            options,
            MutationKind::ReplaceChild,
            vec![new_id],
            vec![old_child_id],
            None,
            Some(new_snapshot.as_ref()),
        );
        tracing::trace!(
            node = self.state.node_id,
            new_child = new_id,
            old_child = old_child_id,
            "replaced"
        );
        Ok(snapshot)
    }

    fn check_hierarchy(&self, child: &DomNode) -> Result<()> {
        let parent = self.state.node_id;
        if child.node_id == parent || child.has_member(parent) {
            return Err(TreeError::HierarchyRequest {
                parent,
                child: child.node_id,
            });
        }
        Ok(())
    }

    /// Callers detach a moved child before attaching it elsewhere. If the
    /// child still reports a foreign parent, a concurrent move raced that
    /// detach; ask the old parent to let go.
    fn release_from_previous_parent(&self, child: &DomNode, ack: &Option<AckToken>) {
        let Some(previous) = child.parent_id.filter(|&id| id != self.state.node_id) else {
            return;
        };
        tracing::debug!(
            node = self.state.node_id,
            child = child.node_id,
            previous,
            "child still attached elsewhere"
        );
        if let Some(previous) = self.context.lookup(previous) {
            previous.notify(remove_command(child.node_id, ack.clone()));
        }
    }

    fn links(&self) -> AHashMap<NodeId, Links> {
        let children = &self.children;
        mutator::links(&self.state.children_ids, |id| {
            children.get(&id).is_some_and(NodeHandle::is_element)
        })
    }

    fn refresh_projection(&mut self) {
        let children = &self.children;
        self.state.element_children_ids = elements::project(&self.state.children_ids, |id| {
            children.get(&id).is_some_and(NodeHandle::is_element)
        });
    }

    fn send_relinks(
        &self,
        before: &AHashMap<NodeId, Links>,
        after: &AHashMap<NodeId, Links>,
        skip: Option<NodeId>,
        ack: &Option<AckToken>,
    ) {
        for (id, links) in mutator::changed_links(&self.state.children_ids, before, after) {
            if Some(id) == skip {
                continue;
            }
            if let Some(child) = self.children.get(&id) {
                child.notify(Command::Relink {
                    parent: self.state.node_id,
                    links,
                    ack: ack.clone(),
                });
            }
        }
    }

    /// Document that children of this node belong to
    fn document_for_children(&self) -> Option<NodeId> {
        if self.state.is_document() {
            Some(self.state.node_id)
        } else {
            self.state.owner_document_id
        }
    }

    fn cascade_owner(&self, child: &NodeHandle, ack: &Option<AckToken>) {
        if let Some(document) = self.document_for_children() {
            child.notify(Command::SetOwner {
                document,
                cascade: true,
                ack: ack.clone(),
            });
        }
    }

    fn unbind_local(&mut self, nodes: &[NodeId]) {
        if let Some(document) = self.state.document.as_mut() {
            elements::unbind(document, nodes);
        }
    }

    fn unbind_remote(&self, nodes: Arc<[NodeId]>, ack: &Option<AckToken>) {
        if self.state.is_document() {
            return;
        }
        let Some(document) = self
            .state
            .owner_document_id
            .and_then(|id| self.context.lookup(id))
        else {
            return;
        };
        document.notify(Command::Unbind {
            nodes,
            ack: ack.clone(),
        });
    }

    fn report(
        &self,
        options: &MutationOptions,
        kind: MutationKind,
        added: Vec<NodeId>,
        removed: Vec<NodeId>,
        reference: Option<NodeId>,
        inserted: Option<&DomNode>,
    ) {
        let Some(receiver) = options.receiver.as_ref() else {
            return;
        };
        let record = MutationRecord {
            kind,
            target: self.state.node_id,
            added,
            removed,
            reference,
            encoded: inserted.and_then(|node| self.context.encoder.encode(node)),
        };
        if receiver.send(record).is_err() {
            tracing::debug!(node = self.state.node_id, "mutation receiver dropped");
        }
    }

    // --- follow-up work (this node is the child or an ancestor) ---

    /// The child settles races its parents could not see: adoptions that
    /// close a cycle are undone, a second parent makes the first one let go,
    /// and the subtree the parent joined is brought up to date.
    fn adopt(
        &mut self,
        parent: NodeHandle,
        links: Links,
        joined: Option<Arc<[NodeId]>>,
        ack: Option<AckToken>,
    ) {
        let node_id = self.state.node_id;
        let parent_id = parent.id();
        if parent_id == node_id || self.state.has_member(parent_id) {
            tracing::debug!(node = node_id, parent = parent_id, "adoption closes a cycle, undoing");
            parent.notify(remove_command(node_id, ack));
            return;
        }

        if let Some(previous) = self.parent.as_ref().filter(|p| p.id() != parent_id) {
            tracing::debug!(
                node = node_id,
                previous = previous.id(),
                parent = parent_id,
                "adopted while attached elsewhere, releasing the previous parent"
            );
            previous.notify(remove_command(node_id, ack.clone()));
        }

        self.state.parent_id = Some(parent_id);
        self.state.parent_element_id = parent.is_element().then_some(parent_id);
        self.apply_links(links);
        self.publish();
        if self.parent.as_ref().map(NodeHandle::id) != Some(parent_id) {
            self.context.events.publish(TreeEvent::Attached { node_id, parent_id });
        }
        if let Some(joined) = joined {
            self.reconcile_membership(&parent, &joined, &ack);
        }
        self.parent = Some(parent);
    }

    /// Correct the parent's copy of this subtree, read from an older snapshot
    fn reconcile_membership(&self, parent: &NodeHandle, joined: &[NodeId], ack: &Option<AckToken>) {
        let node_id = self.state.node_id;
        let known: AHashSet<NodeId> = joined.iter().copied().collect();
        let fresh: Vec<NodeId> = membership::subtree(&self.state)
            .iter()
            .copied()
            .filter(|id| !known.contains(id))
            .collect();
        let stale: Vec<NodeId> = joined
            .iter()
            .copied()
            .filter(|id| *id != node_id && !self.state.has_member(*id))
            .collect();

        if !stale.is_empty() {
            tracing::trace!(node = node_id, stale = stale.len(), "parent joined departed members");
            membership::forward(
                node_id,
                Some(parent),
                MembershipUpdate::Leave(stale.into()),
                ack,
            );
        }
        if !fresh.is_empty() {
            tracing::trace!(node = node_id, fresh = fresh.len(), "parent missed new members");
            membership::forward(
                node_id,
                Some(parent),
                MembershipUpdate::Join(fresh.into()),
                ack,
            );
        }
    }

    fn relink(&mut self, parent: NodeId, links: Links, _ack: Option<AckToken>) {
        if self.state.parent_id != Some(parent) {
            return;
        }
        self.apply_links(links);
        self.publish();
    }

    fn orphan(&mut self, parent: NodeId, _ack: Option<AckToken>) {
        if self.state.parent_id != Some(parent) {
            tracing::trace!(node = self.state.node_id, parent, "stale orphan ignored");
            return;
        }
        self.state.parent_id = None;
        self.state.parent_element_id = None;
        self.apply_links(Links::default());
        self.parent = None;
        self.publish();
        self.context.events.publish(TreeEvent::Detached {
            node_id: self.state.node_id,
            parent_id: parent,
        });
    }

    fn apply_links(&mut self, links: Links) {
        self.state.previous_sibling_id = links.previous_sibling;
        self.state.next_sibling_id = links.next_sibling;
        self.state.previous_element_sibling_id = links.previous_element_sibling;
        self.state.next_element_sibling_id = links.next_element_sibling;
    }

    fn update_membership(&mut self, from: NodeId, update: MembershipUpdate, ack: Option<AckToken>) {
        // A join from a node removed since it sent the update is stale
        if matches!(update, MembershipUpdate::Join(_)) && !self.children.contains_key(&from) {
            tracing::trace!(node = self.state.node_id, from, "join from a former child ignored");
            return;
        }
        if update.apply(&mut self.state.members) == 0 {
            return;
        }
        self.publish();
        membership::forward(self.state.node_id, self.parent.as_ref(), update, &ack);
    }

    fn set_owner(&mut self, document: NodeId, cascade: bool, ack: Option<AckToken>) {
        if self.state.is_document() {
            return;
        }
        if self.state.owner_document_id != Some(document) {
            self.state.owner_document_id = Some(document);
            self.publish();
        }

        if let Some(slot) = self.state.tag_name().and_then(DocumentSlot::for_tag) {
            if let Some(owner) = self.context.lookup(document) {
                owner.notify(Command::Bind {
                    slot,
                    node: self.state.node_id,
                    ack: ack.clone(),
                });
            }
        }

        if cascade {
            for member in self.state.members.iter() {
                if let Some(member) = self.context.lookup(*member) {
                    member.notify(Command::SetOwner {
                        document,
                        cascade: false,
                        ack: ack.clone(),
                    });
                }
            }
        }
    }

    fn bind(&mut self, slot: DocumentSlot, node: NodeId, _ack: Option<AckToken>) {
        let Some(document) = self.state.document.as_mut() else {
            return;
        };
        if elements::bind(document, slot, node) {
            tracing::trace!(node = self.state.node_id, bound = node, ?slot, "document binding");
            self.publish();
        }
    }

    fn unbind(&mut self, nodes: &[NodeId], _ack: Option<AckToken>) {
        let Some(document) = self.state.document.as_mut() else {
            return;
        };
        if elements::unbind(document, nodes) {
            self.publish();
        }
    }

    fn terminate(&mut self) {
        let node_id = self.state.node_id;
        if let Some(parent) = self.parent.take() {
            parent.notify(remove_command(node_id, None));
        }
        for child in self.children.values() {
            child.notify(Command::Orphan {
                parent: node_id,
                ack: None,
            });
        }
        self.context.nodes.remove(&node_id);
        self.context
            .events
            .publish(TreeEvent::NodeTerminated {
                node_id,
                node_type: self.state.node_type,
            });
        tracing::debug!(node = node_id, children = self.children.len(), "terminating");
    }
}

/// Fire-and-forget removal of `child` from whichever parent receives it
fn remove_command(child: NodeId, ack: Option<AckToken>) -> Command {
    Command::Mutate {
        mutation: Mutation::Remove { child },
        options: MutationOptions::default(),
        ack,
        reply: None,
    }
}
