//! The transition resolver.
//!
//! Owns the candidate pool, data catalog, history and the active node, and
//! drives everything from a single per-tick call.

use super::error::ResolveError;
use super::find::find_policy;
use super::pool::{NodePool, PoolError};
use crate::checkpoint::{Checkpoint, PersistenceError};
use crate::core::{
    DataAccess, DataAsset, DataCatalog, DataScope, History, HistoryEntry, Node, NodeId,
    SpatialProbe,
};
use crate::policy::{ActivatedPolicy, DebugLog, PolicyContext, PolicyRegistry};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use stillwater::validation::Validation;

/// What the resolver is currently doing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResolverMode {
    /// No active node. Transition requests are accepted.
    #[default]
    Idle,
    /// A node is running its lifecycle.
    Active,
    /// History is being replayed; transition requests are suppressed.
    LoadingHistory,
}

/// The running node and the data it has touched.
#[derive(Clone, Debug)]
pub struct ActiveNode {
    pub node: NodeId,
    /// Versions of writable assets accessed while active, by asset id.
    pub cache: BTreeMap<String, DataAsset>,
    pub started_at: DateTime<Utc>,
}

/// Policy-driven dynamic state machine.
///
/// # Example
///
/// ```rust
/// use dynamic_state_machine::builder::NodeBuilder;
/// use dynamic_state_machine::core::Constant;
/// use dynamic_state_machine::resolver::{Resolver, ResolverMode};
///
/// let mut resolver = Resolver::new();
/// let node = NodeBuilder::new("guard", "salute")
///     .condition("always", Constant(true))
///     .group("enter", "always")
///     .build()
///     .unwrap();
/// resolver.register_node(node).unwrap();
///
/// assert!(resolver.request_transition().unwrap());
/// assert_eq!(resolver.mode(), ResolverMode::Active);
/// assert_eq!(resolver.active_node().unwrap().name, "salute");
/// ```
pub struct Resolver {
    pool: NodePool,
    policies: PolicyRegistry,
    catalog: DataCatalog,
    history: History,
    spatial: Option<Box<dyn SpatialProbe>>,
    transition_on_start: bool,
    mode: ResolverMode,
    active: Option<ActiveNode>,
    current_policy: Option<ActivatedPolicy>,
    has_state_ended: bool,
    debug: DebugLog,
}

impl fmt::Debug for Resolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolver")
            .field("mode", &self.mode)
            .field("active", &self.active.as_ref().map(|a| &a.node))
            .field("nodes", &self.pool.len())
            .field("history", &self.history.len())
            .field("policies", &self.policies)
            .finish_non_exhaustive()
    }
}

impl Default for Resolver {
    fn default() -> Self {
        Self::new()
    }
}

impl Resolver {
    /// An idle resolver with the built-in policies and no data.
    pub fn new() -> Self {
        Self {
            pool: NodePool::new(),
            policies: PolicyRegistry::with_builtin(),
            catalog: DataCatalog::new(),
            history: History::new(),
            spatial: None,
            transition_on_start: false,
            mode: ResolverMode::Idle,
            active: None,
            current_policy: None,
            has_state_ended: false,
            debug: DebugLog::new(),
        }
    }

    /// Register a data template. Nodes bound afterwards can declare it;
    /// nodes already registered see it after [`Resolver::rebind_nodes`].
    pub fn register_asset(&mut self, asset: DataAsset) {
        self.catalog.register(asset);
    }

    pub fn policies_mut(&mut self) -> &mut PolicyRegistry {
        &mut self.policies
    }

    pub fn set_spatial(&mut self, probe: impl SpatialProbe + 'static) {
        self.spatial = Some(Box::new(probe));
    }

    pub fn set_transition_on_start(&mut self, enabled: bool) {
        self.transition_on_start = enabled;
    }

    /// Keep at most `limit` debug records, dropping the current ones.
    pub fn set_debug_limit(&mut self, limit: usize) {
        self.debug = DebugLog::with_limit(limit);
    }

    pub fn clear_debug_log(&mut self) {
        self.debug.clear();
    }

    /// Bind `node` and add it to the pool.
    ///
    /// Nodes that fail to bind are still registered but can never be
    /// entered. Returns whether binding succeeded.
    pub fn register_node(&mut self, mut node: Node) -> Result<bool, PoolError> {
        if self.pool.contains(node.id()) {
            return Err(PoolError::AlreadyRegistered(node.id().clone()));
        }

        let valid = bind_node(&mut node, &self.catalog, &self.history, self.spatial.as_deref());
        tracing::debug!(node = %node.id(), valid, "registered node");
        self.pool.insert(node)?;
        Ok(valid)
    }

    /// Re-bind every registered node against the current data and
    /// recompile its groups. Returns how many nodes are valid afterwards.
    pub fn rebind_nodes(&mut self) -> usize {
        let spatial = self.spatial.as_deref();
        let valid = self
            .pool
            .iter_mut()
            .map(|node| bind_node(node, &self.catalog, &self.history, spatial))
            .filter(|valid| *valid)
            .count();
        tracing::info!(valid, nodes = self.pool.len(), "re-bound nodes");
        valid
    }

    /// Re-bind one node. `None` when it is not registered.
    pub fn rebind_node(&mut self, id: &NodeId) -> Option<bool> {
        let node = self.pool.get_mut(id)?;
        Some(bind_node(node, &self.catalog, &self.history, self.spatial.as_deref()))
    }

    /// Clear a node's bound flags so it cannot be entered until re-bound.
    /// Returns whether the node is registered.
    pub fn reset_node_bindings(&mut self, id: &NodeId) -> bool {
        match self.pool.get_mut(id) {
            Some(node) => {
                node.reset_bindings();
                tracing::debug!(node = %id, "reset node bindings");
                true
            }
            None => false,
        }
    }

    /// Remove a node from the pool.
    ///
    /// If it is the active node, its remaining phases are skipped and the
    /// next tick transitions away without recording it.
    pub fn unregister_node(&mut self, id: &NodeId) -> Option<Node> {
        let removed = self.pool.remove(id)?;
        if self.active.as_ref().map_or(false, |active| &active.node == id) {
            tracing::info!(node = %id, "active node was unregistered");
            self.has_state_ended = true;
        }
        Some(removed)
    }

    /// Start running. Requests a transition when `transition_on_start` is
    /// set; returns whether a node became active.
    pub fn start(&mut self) -> Result<bool, ResolveError> {
        if self.transition_on_start {
            self.request_transition()
        } else {
            Ok(false)
        }
    }

    /// End the active node, recording it, and go idle. The pool is kept.
    pub fn stop(&mut self) {
        self.end_state();
        self.go_idle();
    }

    /// Resolve and begin the next node.
    ///
    /// Only accepted while idle with no end pending; otherwise returns
    /// `Ok(false)`. Returns whether a node is active afterwards.
    pub fn request_transition(&mut self) -> Result<bool, ResolveError> {
        if self.mode != ResolverMode::Idle || self.has_state_ended || self.active.is_some() {
            tracing::debug!(mode = ?self.mode, "transition request ignored");
            return Ok(false);
        }
        self.transition_state()?;
        Ok(self.is_active())
    }

    /// Resolve policies with `id` as the only candidate.
    ///
    /// Only permitted while idle. Returns whether `id`'s resolution led to an
    /// active node.
    pub fn request_self_transition(&mut self, id: &NodeId) -> Result<bool, ResolveError> {
        if self.mode != ResolverMode::Idle || self.active.is_some() {
            tracing::warn!(node = %id, mode = ?self.mode, "self transition rejected while not idle");
            return Ok(false);
        }
        if !self.pool.contains(id) {
            tracing::warn!(node = %id, "self transition requested by unregistered node");
            return Ok(false);
        }

        match self.resolve_policy(vec![id.clone()], true) {
            Ok(Some(policy)) => {
                self.current_policy = Some(policy);
                self.advance();
                Ok(self.is_active())
            }
            Ok(None) => {
                self.go_idle();
                Ok(false)
            }
            Err(err) => {
                tracing::error!(node = %id, "self transition aborted: {}", err);
                self.go_idle();
                Err(err)
            }
        }
    }

    /// Drive the machine by one frame.
    ///
    /// An ended node is replaced in the same call; otherwise the active node
    /// updates.
    pub fn tick(&mut self, delta: f32) -> Result<(), ResolveError> {
        if self.mode == ResolverMode::LoadingHistory {
            return Ok(());
        }
        if self.has_state_ended {
            self.transition_state()
        } else {
            if self.active.is_some() {
                self.update_state(delta);
            }
            Ok(())
        }
    }

    fn transition_state(&mut self) -> Result<(), ResolveError> {
        self.end_state();

        if let Some(policy) = &self.current_policy {
            if policy.has_finished() {
                if !policy.transition_after_policy() {
                    tracing::info!(policy = %policy.name(), "policy chain halted");
                    self.go_idle();
                    return Ok(());
                }
                self.current_policy = None;
            }
        }

        if self.current_policy.is_none() {
            match self.resolve_policy(self.pool.ids(), false) {
                Ok(Some(policy)) => self.current_policy = Some(policy),
                Ok(None) => {
                    self.go_idle();
                    return Ok(());
                }
                Err(err) => {
                    tracing::error!("transition aborted: {}", err);
                    self.go_idle();
                    return Err(err);
                }
            }
        }

        self.advance();
        Ok(())
    }

    /// Begin the next registered node of the current policy, or go idle.
    fn advance(&mut self) {
        loop {
            let next = self
                .current_policy
                .as_mut()
                .and_then(ActivatedPolicy::next_node);
            match next {
                Some(id) if self.pool.contains(&id) => {
                    self.begin_state(id);
                    return;
                }
                Some(id) => tracing::warn!(node = %id, "skipping unregistered node"),
                None => {
                    tracing::info!("policy has no nodes left");
                    self.go_idle();
                    return;
                }
            }
        }
    }

    fn begin_state(&mut self, id: NodeId) {
        let Some(node) = self.pool.get_mut(&id) else {
            return;
        };
        let mut cache = BTreeMap::new();
        let ended = node.begin(DataAccess {
            catalog: &self.catalog,
            history: &self.history,
            cache: Some(&mut cache),
        });
        tracing::info!(node = %id, ended, "began state");

        self.active = Some(ActiveNode {
            node: id,
            cache,
            started_at: Utc::now(),
        });
        self.mode = ResolverMode::Active;
        self.has_state_ended = ended;
    }

    fn update_state(&mut self, delta: f32) {
        let Some(active) = self.active.as_mut() else {
            return;
        };
        let Some(node) = self.pool.get_mut(&active.node) else {
            self.has_state_ended = true;
            return;
        };
        self.has_state_ended = node.update(
            DataAccess {
                catalog: &self.catalog,
                history: &self.history,
                cache: Some(&mut active.cache),
            },
            delta,
        );
    }

    fn end_state(&mut self) {
        let Some(mut active) = self.active.take() else {
            return;
        };
        match self.pool.get_mut(&active.node) {
            Some(node) => {
                node.end(DataAccess {
                    catalog: &self.catalog,
                    history: &self.history,
                    cache: Some(&mut active.cache),
                });
                tracing::info!(node = %active.node, assets = active.cache.len(), "ended state");
                self.history
                    .append(HistoryEntry::new(active.node, active.cache));
            }
            None => tracing::debug!(node = %active.node, "unregistered node ended without a record"),
        }
        self.has_state_ended = false;
    }

    fn go_idle(&mut self) {
        self.active = None;
        self.current_policy = None;
        self.has_state_ended = false;
        self.mode = ResolverMode::Idle;
    }

    fn resolve_policy(
        &mut self,
        candidates: Vec<NodeId>,
        self_transition: bool,
    ) -> Result<Option<ActivatedPolicy>, ResolveError> {
        let scope = DataScope::new(&self.catalog, &self.history)
            .with_active(self.active.as_ref().map(|active| &active.cache));
        let mut ctx = PolicyContext::new(
            &self.pool,
            scope,
            self.spatial.as_deref(),
            self_transition,
            &mut self.debug,
        );
        find_policy(&self.policies, candidates, &mut ctx)
    }

    pub fn active_node(&self) -> Option<&NodeId> {
        self.active.as_ref().map(|active| &active.node)
    }

    pub fn active(&self) -> Option<&ActiveNode> {
        self.active.as_ref()
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    pub fn mode(&self) -> ResolverMode {
        self.mode
    }

    pub fn nodes(&self) -> &NodePool {
        &self.pool
    }

    pub fn node(&self, id: &NodeId) -> Option<&Node> {
        self.pool.get(id)
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn debug_log(&self) -> &DebugLog {
        &self.debug
    }

    pub fn current_policy(&self) -> Option<&ActivatedPolicy> {
        self.current_policy.as_ref()
    }

    pub fn catalog(&self) -> &DataCatalog {
        &self.catalog
    }

    /// Newest version of `asset_id`, including the active node's cache.
    pub fn latest_data(&self, asset_id: &str) -> Option<DataAsset> {
        DataScope::new(&self.catalog, &self.history)
            .with_active(self.active.as_ref().map(|active| &active.cache))
            .latest(asset_id)
            .cloned()
    }

    /// Capture history up to `index` for saving.
    pub fn checkpoint(
        &self,
        slot: impl Into<String>,
        index: usize,
        keep_state: bool,
    ) -> Result<Checkpoint, PersistenceError> {
        Checkpoint::capture(&self.history, slot, index, keep_state)
    }

    /// Rebuild history from `checkpoint`.
    ///
    /// The active node is discarded without being recorded. Every entry up
    /// to the checkpoint's index is re-appended and its node re-runs its
    /// apply phases. Transition requests are ignored meanwhile, and the
    /// resolver is idle afterwards whatever the outcome.
    pub fn restore(&mut self, checkpoint: &Checkpoint) -> Result<(), PersistenceError> {
        checkpoint.validate()?;

        if let Some(active) = self.active.take() {
            tracing::info!(node = %active.node, "discarding active node for restore");
        }
        self.current_policy = None;
        self.has_state_ended = false;
        self.mode = ResolverMode::LoadingHistory;

        let result = self.replay(checkpoint);
        self.mode = ResolverMode::Idle;

        match &result {
            Ok(()) => tracing::info!(
                slot = %checkpoint.slot,
                entries = self.history.len(),
                "restored history"
            ),
            Err(err) => tracing::error!(slot = %checkpoint.slot, "restore failed: {}", err),
        }
        result
    }

    fn replay(&mut self, checkpoint: &Checkpoint) -> Result<(), PersistenceError> {
        self.history.clear();
        for entry in checkpoint.replay_entries() {
            self.history.append(entry.clone());
            let Some(node) = self.pool.get_mut(&entry.node) else {
                return Err(PersistenceError::UnknownNode(entry.node.clone()));
            };
            let mut scratch = entry.data.clone();
            node.replay(DataAccess {
                catalog: &self.catalog,
                history: &self.history,
                cache: Some(&mut scratch),
            });
        }

        if checkpoint.keep_state {
            self.history.replace_all(checkpoint.entries.clone());
        }
        Ok(())
    }
}

/// Bind `node` against the catalog and history, logging failures.
fn bind_node(
    node: &mut Node,
    catalog: &DataCatalog,
    history: &History,
    spatial: Option<&dyn SpatialProbe>,
) -> bool {
    match node.bind(DataScope::new(catalog, history), spatial) {
        Validation::Success(_) => true,
        Validation::Failure(errors) => {
            tracing::warn!(node = %node.id(), errors = errors.len(), "node failed to bind");
            false
        }
    }
}
