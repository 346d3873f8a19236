//! Policies decide which node runs next.
//!
//! A policy receives a candidate list and produces an ordered node list plus
//! a success flag. Each policy has a native implementation and an optional
//! scripted hook; only one of them may produce a result. Policies are
//! instantiated fresh from a [`PolicyRegistry`] for every resolution attempt.

pub mod builtin;
pub mod debug;

pub use builtin::{DefaultPolicy, OrderByTagPolicy};
pub use debug::{DebugLog, TransitionDebug, DEFAULT_DEBUG_LIMIT};

use crate::core::{DataScope, EnterVerdict, Node, NodeId, SpatialProbe};
use crate::resolver::{NodePool, ResolveError};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::fmt;

/// Identifier of a registered policy kind.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PolicyType(String);

impl PolicyType {
    pub const DEFAULT: &'static str = "default";
    pub const ORDER_BY_TAG: &'static str = "order_by_tag";

    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The type of [`DefaultPolicy`].
    pub fn default_policy() -> Self {
        Self::new(Self::DEFAULT)
    }

    /// The type of [`OrderByTagPolicy`].
    pub fn order_by_tag() -> Self {
        Self::new(Self::ORDER_BY_TAG)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PolicyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What one implementation of a policy produced.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PolicyOutcome {
    pub nodes: Vec<NodeId>,
    pub success: bool,
}

impl PolicyOutcome {
    pub fn new(nodes: Vec<NodeId>, success: bool) -> Self {
        Self { nodes, success }
    }
}

/// A node selection strategy.
pub trait Policy: Send {
    fn name(&self) -> &str;

    /// Higher priorities are activated first.
    fn priority(&self) -> i32;

    /// Whether a new policy should be resolved once this one runs out of
    /// nodes.
    fn transition_after_policy(&self) -> bool {
        true
    }

    /// Native implementation.
    fn apply(&self, candidates: &[NodeId], ctx: &mut PolicyContext<'_>) -> PolicyOutcome;

    /// Scripted implementation. Produces nothing unless overridden.
    fn apply_hook(&self, _candidates: &[NodeId], _ctx: &mut PolicyContext<'_>) -> PolicyOutcome {
        PolicyOutcome::default()
    }
}

/// What a policy can look at while it runs.
pub struct PolicyContext<'a> {
    nodes: &'a NodePool,
    scope: DataScope<'a>,
    spatial: Option<&'a dyn SpatialProbe>,
    self_transition: bool,
    debug: &'a mut DebugLog,
}

impl<'a> PolicyContext<'a> {
    pub fn new(
        nodes: &'a NodePool,
        scope: DataScope<'a>,
        spatial: Option<&'a dyn SpatialProbe>,
        self_transition: bool,
        debug: &'a mut DebugLog,
    ) -> Self {
        Self {
            nodes,
            scope,
            spatial,
            self_transition,
            debug,
        }
    }

    pub fn nodes(&self) -> &'a NodePool {
        self.nodes
    }

    pub fn node(&self, id: &NodeId) -> Option<&'a Node> {
        self.nodes.get(id)
    }

    /// Evaluate whether `id` may be entered. `None` for unknown nodes.
    pub fn can_enter(&self, id: &NodeId) -> Option<EnterVerdict> {
        self.nodes
            .get(id)
            .map(|node| node.can_enter(self.self_transition, self.scope, self.spatial))
    }

    pub fn is_self_transition(&self) -> bool {
        self.self_transition
    }

    pub fn record(&mut self, entry: TransitionDebug) {
        self.debug.push(entry);
    }
}

/// Creates a fresh policy instance.
pub type PolicyFactory = Box<dyn Fn() -> Box<dyn Policy> + Send + Sync>;

/// Policy factories by type.
pub struct PolicyRegistry {
    factories: BTreeMap<PolicyType, PolicyFactory>,
}

impl fmt::Debug for PolicyRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.factories.keys()).finish()
    }
}

impl Default for PolicyRegistry {
    fn default() -> Self {
        Self::with_builtin()
    }
}

impl PolicyRegistry {
    /// A registry without any policy.
    pub fn empty() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }

    /// A registry holding [`DefaultPolicy`] and an [`OrderByTagPolicy`] with
    /// an empty tag order.
    pub fn with_builtin() -> Self {
        let mut registry = Self::empty();
        registry.register(PolicyType::default_policy(), || Box::new(DefaultPolicy));
        registry.register_order_by_tag(Vec::new());
        registry
    }

    pub fn register<F>(&mut self, policy_type: PolicyType, factory: F)
    where
        F: Fn() -> Box<dyn Policy> + Send + Sync + 'static,
    {
        self.factories.insert(policy_type, Box::new(factory));
    }

    /// Register the tag-ordering policy with the given tag order.
    pub fn register_order_by_tag(&mut self, tag_order: Vec<String>) {
        self.register(PolicyType::order_by_tag(), move || {
            Box::new(OrderByTagPolicy::new(tag_order.clone()))
        });
    }

    pub fn contains(&self, policy_type: &PolicyType) -> bool {
        self.factories.contains_key(policy_type)
    }

    pub fn instantiate(&self, policy_type: &PolicyType) -> Option<Box<dyn Policy>> {
        self.factories.get(policy_type).map(|factory| factory())
    }
}

/// A policy that has run, holding its node queue.
pub struct ActivatedPolicy {
    policy_type: PolicyType,
    policy: Box<dyn Policy>,
    nodes: VecDeque<NodeId>,
    success: bool,
}

impl fmt::Debug for ActivatedPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActivatedPolicy")
            .field("policy_type", &self.policy_type)
            .field("nodes", &self.nodes)
            .field("success", &self.success)
            .finish()
    }
}

impl ActivatedPolicy {
    /// Run both implementations of `policy` over `candidates`.
    ///
    /// Fails when both the native and the scripted implementation produce
    /// nodes, or both report success.
    pub fn activate(
        policy_type: PolicyType,
        policy: Box<dyn Policy>,
        candidates: &[NodeId],
        ctx: &mut PolicyContext<'_>,
    ) -> Result<Self, ResolveError> {
        let native = policy.apply(candidates, ctx);
        let hook = policy.apply_hook(candidates, ctx);

        let both_produced_nodes = !native.nodes.is_empty() && !hook.nodes.is_empty();
        if both_produced_nodes || (native.success && hook.success) {
            tracing::error!(
                policy = %policy.name(),
                "native and scripted implementation both produced a result"
            );
            return Err(ResolveError::AmbiguousPolicy {
                policy: policy.name().to_string(),
            });
        }

        let nodes: VecDeque<NodeId> = native.nodes.into_iter().chain(hook.nodes).collect();
        let success = native.success || hook.success;
        tracing::info!(
            policy = %policy.name(),
            success,
            nodes = ?nodes.iter().map(|n| n.to_string()).collect::<Vec<_>>(),
            "activated policy"
        );

        Ok(Self {
            policy_type,
            policy,
            nodes,
            success,
        })
    }

    pub fn policy_type(&self) -> &PolicyType {
        &self.policy_type
    }

    pub fn name(&self) -> &str {
        self.policy.name()
    }

    pub fn priority(&self) -> i32 {
        self.policy.priority()
    }

    pub fn transition_after_policy(&self) -> bool {
        self.policy.transition_after_policy()
    }

    pub fn is_successful(&self) -> bool {
        self.success
    }

    /// Remaining nodes, front first.
    pub fn nodes(&self) -> impl Iterator<Item = &NodeId> {
        self.nodes.iter()
    }

    /// Take the next node off the front of the queue.
    pub fn next_node(&mut self) -> Option<NodeId> {
        self.nodes.pop_front()
    }

    pub fn has_finished(&self) -> bool {
        self.nodes.is_empty()
    }
}
