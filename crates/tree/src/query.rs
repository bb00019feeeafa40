//! Selector queries over a live tree
//!
//! A query copies the snapshots it needs into a [`DomArena`], then fans
//! the per-node matcher out over the candidate pool with
//! [`scatter`](crate::scatter). Rule chains are evaluated left to right: the
//! matches of one rule define the pool of the next through its combinator.
//! Only the last rule's pool is restricted to the query root's members.

use std::sync::Arc;
use std::time::Duration;

use ahash::{AHashMap, AHashSet};
use dom::{matcher, ChainStep, Combinator, DomArena, DomNode, NodeId, Selector};
use futures_util::future::BoxFuture;
use futures_util::FutureExt;

use crate::context::TreeContext;
use crate::error::Result;
use crate::scatter;

/// Runs `querySelector`-style lookups against a snapshot arena
#[derive(Debug, Clone, Copy)]
pub struct QueryEngine {
    timeout: Duration,
}

impl QueryEngine {
    /// `timeout` bounds every scatter/gather round of a query
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Every member of `root` that matches, in document order
    ///
    /// `arena` must hold `root`. Its root id, when set, is where the
    /// document-order walk starts.
    pub async fn select_all(
        &self,
        arena: DomArena,
        root: Arc<DomNode>,
        selector: &Selector,
    ) -> Result<Vec<NodeId>> {
        let scope = QueryScope::new(arena, root, self.timeout);
        select_all(scope, Arc::new(selector.clone())).await
    }

    /// First member of `root` whose evaluation reports a match
    pub async fn select_first(
        &self,
        arena: DomArena,
        root: Arc<DomNode>,
        selector: &Selector,
    ) -> Result<Option<NodeId>> {
        let scope = QueryScope::new(arena, root, self.timeout);
        select_first(scope, Arc::new(selector.clone())).await
    }
}

/// Whether evaluating `selector` needs nodes outside the query root
pub(crate) fn needs_whole_tree(selector: &Selector) -> bool {
    match selector {
        Selector::RuleChain { .. } => true,
        Selector::List { selectors } => selectors.iter().any(needs_whole_tree),
        _ => false,
    }
}

/// Top-most ancestor reachable through published parent pointers
pub(crate) fn top_most(context: &TreeContext, node: &Arc<DomNode>) -> Arc<DomNode> {
    let mut current = node.clone();
    let mut seen = AHashSet::new();
    seen.insert(current.node_id);
    while let Some(parent_id) = current.parent_id {
        if !seen.insert(parent_id) {
            tracing::warn!(node = node.node_id, parent_id, "parent cycle in snapshots");
            break;
        }
        match context.lookup(parent_id) {
            Some(parent) => current = parent.snapshot(),
            None => break,
        }
    }
    current
}

/// Copy the snapshots a query over `root` needs
pub(crate) fn collect(context: &TreeContext, root: &Arc<DomNode>, whole_tree: bool) -> DomArena {
    let top = if whole_tree {
        top_most(context, root)
    } else {
        root.clone()
    };

    let mut arena = DomArena::with_capacity(top.members.len() + root.members.len() + 2);
    for id in top.members.iter().chain(root.members.iter()) {
        if arena.contains(*id) {
            continue;
        }
        if let Some(handle) = context.lookup(*id) {
            arena.add_node(handle.snapshot());
        }
    }
    let top_id = arena.add_node(top);
    arena.add_node(root.clone());
    let _ = arena.set_root(top_id); // just added
    arena
}

/// Arena plus the document order of everything in it
#[derive(Clone)]
struct QueryScope {
    arena: Arc<DomArena>,
    order: Arc<Vec<NodeId>>,
    rank: Arc<AHashMap<NodeId, usize>>,
    root: Arc<DomNode>,
    timeout: Duration,
}

impl QueryScope {
    fn new(arena: DomArena, root: Arc<DomNode>, timeout: Duration) -> Self {
        let start = arena.root_id().unwrap_or(root.node_id);
        let mut order = arena.document_order(start);

        // Snapshots the walk could not reach (moved mid-query) go last
        let walked: AHashSet<NodeId> = order.iter().copied().collect();
        let mut unreached: Vec<NodeId> = arena
            .iter()
            .map(|node| node.node_id)
            .filter(|id| !walked.contains(id))
            .collect();
        unreached.sort_unstable();
        order.extend(unreached);

        let rank = order.iter().enumerate().map(|(i, id)| (*id, i)).collect();
        Self {
            arena: Arc::new(arena),
            order: Arc::new(order),
            rank: Arc::new(rank),
            root,
            timeout,
        }
    }

    fn in_scope(&self, id: NodeId) -> bool {
        self.root.has_member(id)
    }

    fn universe(&self) -> Vec<NodeId> {
        self.order.to_vec()
    }

    fn candidates(&self) -> Vec<NodeId> {
        self.order
            .iter()
            .copied()
            .filter(|id| self.in_scope(*id))
            .collect()
    }

    /// Document order, duplicates removed
    fn ordered(&self, mut ids: Vec<NodeId>) -> Vec<NodeId> {
        ids.sort_unstable_by_key(|id| (self.rank.get(id).copied().unwrap_or(usize::MAX), *id));
        ids.dedup();
        ids
    }

    /// Pool the next rule of a chain is evaluated against
    fn pool(&self, matched: &[NodeId], combinator: Combinator) -> Vec<NodeId> {
        let mut pool = Vec::new();
        for &id in matched {
            let Ok(node) = self.arena.get(id) else {
                continue;
            };
            match combinator {
                Combinator::Descendant => pool.extend(node.members.iter().copied()),
                Combinator::Child => pool.extend(node.children_ids.iter().copied()),
                Combinator::AdjacentSibling => pool.extend(self.arena.next_sibling(id)),
                Combinator::GeneralSibling => pool.extend(self.arena.following_siblings(id)),
            }
        }
        pool.retain(|id| self.arena.contains(*id));
        self.ordered(pool)
    }

    fn tasks(
        &self,
        pool: Vec<NodeId>,
        rule: Arc<Selector>,
    ) -> Vec<impl std::future::Future<Output = Option<NodeId>> + Send + 'static> {
        pool.into_iter()
            .filter_map(|id| self.arena.get(id).ok().cloned())
            .map(|node| {
                let rule = rule.clone();
                async move { matcher::matches(&node, &rule).then_some(node.node_id) }
            })
            .collect()
    }

    async fn evaluate_all(&self, pool: Vec<NodeId>, rule: Arc<Selector>) -> Result<Vec<NodeId>> {
        let replies = scatter::await_all(self.tasks(pool, rule), self.timeout).await?;
        Ok(replies.into_iter().flatten().collect())
    }

    async fn evaluate_first(&self, pool: Vec<NodeId>, rule: Arc<Selector>) -> Result<Option<NodeId>> {
        scatter::await_first(self.tasks(pool, rule), self.timeout).await
    }

    /// Resolve every step but the last; return the last rule and its pool
    async fn final_pool(
        &self,
        head: &Selector,
        steps: &[ChainStep],
    ) -> Result<(Vec<NodeId>, Arc<Selector>)> {
        let Some((last, prefix)) = steps.split_last() else {
            return Ok((self.candidates(), Arc::new(head.clone())));
        };

        let mut matched = self
            .evaluate_all(self.universe(), Arc::new(head.clone()))
            .await?;
        for step in prefix {
            if matched.is_empty() {
                break;
            }
            let pool = self.pool(&matched, step.combinator);
            matched = self.evaluate_all(pool, Arc::new(step.rule.clone())).await?;
        }

        let mut pool = self.pool(&matched, last.combinator);
        pool.retain(|id| self.in_scope(*id));
        Ok((pool, Arc::new(last.rule.clone())))
    }
}

fn select_all(scope: QueryScope, selector: Arc<Selector>) -> BoxFuture<'static, Result<Vec<NodeId>>> {
    async move {
        let matched = match selector.as_ref() {
            Selector::List { selectors } => {
                let branches: Vec<_> = selectors
                    .iter()
                    .map(|alt| select_all(scope.clone(), Arc::new(alt.clone())))
                    .collect();
                let mut ids = Vec::new();
                for branch in scatter::await_all(branches, scope.timeout).await? {
                    ids.extend(branch?);
                }
                ids
            }
            Selector::RuleChain { head, steps } => {
                let (pool, rule) = scope.final_pool(head, steps).await?;
                scope.evaluate_all(pool, rule).await?
            }
            _ => scope.evaluate_all(scope.candidates(), selector.clone()).await?,
        };
        Ok(scope.ordered(matched))
    }
    .boxed()
}

fn select_first(
    scope: QueryScope,
    selector: Arc<Selector>,
) -> BoxFuture<'static, Result<Option<NodeId>>> {
    async move {
        match selector.as_ref() {
            Selector::List { selectors } => {
                let branches: Vec<_> = selectors
                    .iter()
                    .map(|alt| {
                        let branch = select_first(scope.clone(), Arc::new(alt.clone()));
                        async move { branch.await.transpose() }
                    })
                    .collect();
                scatter::await_first(branches, scope.timeout)
                    .await?
                    .transpose()
            }
            Selector::RuleChain { head, steps } => {
                let (pool, rule) = scope.final_pool(head, steps).await?;
                scope.evaluate_first(pool, rule).await
            }
            _ => scope.evaluate_first(scope.candidates(), selector.clone()).await,
        }
    }
    .boxed()
}
