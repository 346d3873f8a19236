//! State machine nodes.
//!
//! A node owns named conditions, condition group expressions, data key
//! declarations, tags and the list of policy types it accepts. Its behavior
//! comes from two [`NodeBehavior`] implementations that are always both
//! invoked: the native one and the scripted hook.

use super::access::{DataAccess, DataBindings, DataScope, NodeContext, NodeView, SpatialProbe};
use super::condition::{ConditionContext, ConditionError, ConditionSet};
use super::expression::{compile, CompileError, CompiledGroup};
use crate::policy::PolicyType;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use stillwater::validation::Validation;
use stillwater::NonEmptyVec;
use thiserror::Error;

/// Identity of a node: the owning entity plus the node's name.
///
/// # Example
///
/// ```rust
/// use dynamic_state_machine::core::NodeId;
///
/// let id = NodeId::new("blacksmith", "greeting");
/// assert_eq!(id.to_string(), "blacksmith -> greeting");
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId {
    pub owner: String,
    pub name: String,
}

impl NodeId {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.owner, self.name)
    }
}

/// Errors collected while binding a node.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum BindError {
    #[error("node {node}: condition '{condition}' failed to bind: {source}")]
    Condition {
        node: NodeId,
        condition: String,
        source: ConditionError,
    },

    #[error("node {node}: {source}")]
    Group { node: NodeId, source: CompileError },
}

/// Named results of every check made while deciding enterability.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EnterChecks {
    entries: BTreeMap<String, bool>,
}

impl EnterChecks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, name: impl Into<String>, passed: bool) {
        self.entries.insert(name.into(), passed);
    }

    pub fn get(&self, name: &str) -> Option<bool> {
        self.entries.get(name).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, bool)> {
        self.entries.iter().map(|(name, passed)| (name.as_str(), *passed))
    }

    /// Whether no recorded check failed.
    pub fn all_passed(&self) -> bool {
        self.entries.values().all(|passed| *passed)
    }

    /// Fold `other` into these checks. A name recorded by both keeps
    /// `false` if either side failed.
    pub fn merge(&mut self, other: EnterChecks) {
        for (name, passed) in other.entries {
            self.entries
                .entry(name)
                .and_modify(|current| *current &= passed)
                .or_insert(passed);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Outcome of [`Node::can_enter`].
#[derive(Clone, Debug, PartialEq)]
pub struct EnterVerdict {
    pub node: NodeId,
    pub enterable: bool,
    pub checks: EnterChecks,
}

/// Lifecycle callbacks of a node.
///
/// All methods default to no-ops. The `on_*` phases report whether the node
/// has ended; the `apply_*` phases are the ones re-run when history is
/// replayed, so they should hold every side effect that must survive a load.
pub trait NodeBehavior: Send {
    fn init(&mut self, _ctx: &mut NodeContext<'_>) {}

    /// Extra enter checks; record named results into `checks`.
    ///
    /// The node is refused when this returns `false` or when any recorded
    /// check is `false`.
    fn can_enter(
        &self,
        _self_transition: bool,
        _data: &dyn ConditionContext,
        _checks: &mut EnterChecks,
    ) -> bool {
        true
    }

    fn on_begin(&mut self, _ctx: &mut NodeContext<'_>) -> bool {
        false
    }

    fn apply_begin(&mut self, _ctx: &mut NodeContext<'_>) {}

    fn on_update(&mut self, _ctx: &mut NodeContext<'_>, _delta: f32) -> bool {
        false
    }

    fn apply_update(&mut self, _ctx: &mut NodeContext<'_>) {}

    fn on_end(&mut self, _ctx: &mut NodeContext<'_>) {}

    fn apply_end(&mut self, _ctx: &mut NodeContext<'_>) {}
}

/// Behavior that does nothing.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoBehavior;

impl NodeBehavior for NoBehavior {}

/// A state machine node. Build one with [`crate::builder::NodeBuilder`].
pub struct Node {
    pub(crate) id: NodeId,
    pub(crate) tags: Vec<String>,
    pub(crate) policies: Vec<PolicyType>,
    pub(crate) bindings: DataBindings,
    pub(crate) conditions: ConditionSet,
    pub(crate) groups: Vec<(String, String)>,
    pub(crate) compiled: Vec<CompiledGroup>,
    pub(crate) bound: bool,
    pub(crate) behavior: Box<dyn NodeBehavior>,
    pub(crate) script: Box<dyn NodeBehavior>,
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("tags", &self.tags)
            .field("policies", &self.policies)
            .field("groups", &self.groups)
            .field("bound", &self.bound)
            .finish_non_exhaustive()
    }
}

impl Node {
    pub fn id(&self) -> &NodeId {
        &self.id
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    /// Policy types this node accepts, in declaration order.
    pub fn policies(&self) -> &[PolicyType] {
        &self.policies
    }

    pub fn bindings(&self) -> &DataBindings {
        &self.bindings
    }

    pub fn conditions(&self) -> &ConditionSet {
        &self.conditions
    }

    /// Group names and their source expressions.
    pub fn groups(&self) -> impl Iterator<Item = (&str, &str)> {
        self.groups
            .iter()
            .map(|(name, source)| (name.as_str(), source.as_str()))
    }

    pub fn compiled_groups(&self) -> &[CompiledGroup] {
        &self.compiled
    }

    /// A node is valid once every condition bound and every group compiled.
    pub fn is_valid(&self) -> bool {
        self.bound
    }

    /// Bind all conditions, then compile all groups.
    ///
    /// Every failure is collected; the node is valid only when none occur.
    pub fn bind(
        &mut self,
        scope: DataScope<'_>,
        spatial: Option<&dyn SpatialProbe>,
    ) -> Validation<(), NonEmptyVec<BindError>> {
        let view = NodeView::new(&self.id, &self.bindings, scope, spatial);
        let mut checks: Vec<Validation<(), NonEmptyVec<BindError>>> = self
            .conditions
            .bind_all(&view)
            .into_iter()
            .map(|(condition, source)| {
                Validation::fail(BindError::Condition {
                    node: self.id.clone(),
                    condition,
                    source,
                })
            })
            .collect();

        self.compiled.clear();
        for (name, source) in &self.groups {
            match compile(name, source, |c| self.conditions.contains(c)) {
                Ok(expr) => {
                    tracing::debug!(node = %self.id, group = %name, expr = %expr, "compiled condition group");
                    self.compiled.push(CompiledGroup {
                        name: name.clone(),
                        source: source.clone(),
                        expr,
                    });
                    checks.push(Validation::success(()));
                }
                Err(err) => {
                    tracing::warn!(node = %self.id, "{}", err);
                    checks.push(Validation::fail(BindError::Group {
                        node: self.id.clone(),
                        source: err,
                    }));
                }
            }
        }

        let result = Validation::all_vec(checks).map(|_| ());
        self.bound = matches!(result, Validation::Success(_));
        result
    }

    /// Clear bound flags without recompiling. The node becomes invalid until
    /// bound again.
    pub fn reset_bindings(&mut self) {
        self.conditions.reset();
        self.bound = false;
    }

    /// The condition view of this node over `scope`.
    pub fn view<'a>(
        &'a self,
        scope: DataScope<'a>,
        spatial: Option<&'a dyn SpatialProbe>,
    ) -> NodeView<'a> {
        NodeView::new(&self.id, &self.bindings, scope, spatial)
    }

    /// Evaluate every compiled group, recording each result.
    pub fn evaluate_groups(&self, view: &dyn ConditionContext, checks: &mut EnterChecks) -> bool {
        let mut all_passed = true;
        for group in &self.compiled {
            let passed = group
                .expr
                .evaluate(&mut |name: &str| self.conditions.evaluate(name, view));
            tracing::debug!(node = %self.id, group = %group.name, passed, "evaluated condition group");
            checks.record(group.name.clone(), passed);
            all_passed &= passed;
        }
        all_passed
    }

    /// Whether this node may become active now.
    ///
    /// Combines the native check, the hook check and every group. All of
    /// them run even when an earlier one already failed.
    pub fn can_enter(
        &self,
        self_transition: bool,
        scope: DataScope<'_>,
        spatial: Option<&dyn SpatialProbe>,
    ) -> EnterVerdict {
        let mut checks = EnterChecks::new();
        if !self.bound {
            checks.record("valid", false);
            return EnterVerdict {
                node: self.id.clone(),
                enterable: false,
                checks,
            };
        }

        let view = self.view(scope, spatial);
        let mut native_checks = EnterChecks::new();
        let native = self
            .behavior
            .can_enter(self_transition, &view, &mut native_checks)
            && native_checks.all_passed();
        let mut hook_checks = EnterChecks::new();
        let hook = self
            .script
            .can_enter(self_transition, &view, &mut hook_checks)
            && hook_checks.all_passed();
        let mut group_checks = EnterChecks::new();
        let groups = self.evaluate_groups(&view, &mut group_checks);

        checks.merge(native_checks);
        checks.merge(hook_checks);
        checks.merge(group_checks);

        EnterVerdict {
            node: self.id.clone(),
            enterable: native && hook && groups,
            checks,
        }
    }

    /// Init, begin and apply-begin. Returns whether the node already ended.
    pub fn begin(&mut self, access: DataAccess<'_>) -> bool {
        let mut ctx = NodeContext::new(&self.id, &self.bindings, access);
        self.behavior.init(&mut ctx);
        self.script.init(&mut ctx);
        let native_ended = self.behavior.on_begin(&mut ctx);
        let hook_ended = self.script.on_begin(&mut ctx);
        self.behavior.apply_begin(&mut ctx);
        self.script.apply_begin(&mut ctx);
        native_ended || hook_ended
    }

    /// Update and apply-update. Returns whether the node ended.
    pub fn update(&mut self, access: DataAccess<'_>, delta: f32) -> bool {
        let mut ctx = NodeContext::new(&self.id, &self.bindings, access);
        let native_ended = self.behavior.on_update(&mut ctx, delta);
        let hook_ended = self.script.on_update(&mut ctx, delta);
        self.behavior.apply_update(&mut ctx);
        self.script.apply_update(&mut ctx);
        native_ended || hook_ended
    }

    /// End and apply-end.
    pub fn end(&mut self, access: DataAccess<'_>) {
        let mut ctx = NodeContext::new(&self.id, &self.bindings, access);
        self.behavior.on_end(&mut ctx);
        self.script.on_end(&mut ctx);
        self.behavior.apply_end(&mut ctx);
        self.script.apply_end(&mut ctx);
    }

    /// Re-run only the apply phases, as done when history is loaded.
    pub fn replay(&mut self, access: DataAccess<'_>) {
        let mut ctx = NodeContext::new(&self.id, &self.bindings, access);
        self.behavior.apply_begin(&mut ctx);
        self.script.apply_begin(&mut ctx);
        self.behavior.apply_update(&mut ctx);
        self.script.apply_update(&mut ctx);
        self.behavior.apply_end(&mut ctx);
        self.script.apply_end(&mut ctx);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::NodeBuilder;
    use crate::core::condition::{BoolField, Constant};
    use crate::core::data::{DataAsset, DataCatalog, Value};
    use crate::core::history::History;
    use std::sync::{Arc, Mutex};

    fn catalog() -> DataCatalog {
        let mut catalog = DataCatalog::new();
        catalog.register(DataAsset::new("door", "Door").with("open", Value::Bool(true)));
        catalog
    }

    fn literal_node(groups: &[&str]) -> Node {
        let mut builder = NodeBuilder::new("npc", "talk")
            .condition("true", Constant(true))
            .condition("false", Constant(false));
        for (i, group) in groups.iter().enumerate() {
            builder = builder.group(format!("g{}", i), *group);
        }
        builder.build().unwrap()
    }

    fn enterable(node: &mut Node) -> bool {
        let catalog = catalog();
        let history = History::new();
        let scope = DataScope::new(&catalog, &history);
        assert!(matches!(node.bind(scope, None), Validation::Success(_)));
        node.can_enter(false, scope, None).enterable
    }

    #[test]
    fn groups_are_and_combined() {
        assert!(enterable(&mut literal_node(&["true", "!false"])));
        assert!(!enterable(&mut literal_node(&["true || false && false", "false"])));
        assert!(enterable(&mut literal_node(&[
            "(true || false) && true",
            "true && false || true && true || false && true",
        ])));
    }

    #[test]
    fn node_without_groups_is_enterable() {
        assert!(enterable(&mut literal_node(&[])));
    }

    #[test]
    fn checks_record_every_group() {
        let catalog = catalog();
        let history = History::new();
        let scope = DataScope::new(&catalog, &history);
        let mut node = literal_node(&["true", "false"]);
        let _ = node.bind(scope, None);

        let verdict = node.can_enter(false, scope, None);
        assert!(!verdict.enterable);
        assert_eq!(verdict.checks.get("g0"), Some(true));
        assert_eq!(verdict.checks.get("g1"), Some(false));
    }

    #[test]
    fn bind_accumulates_condition_and_group_errors() {
        let catalog = catalog();
        let history = History::new();
        let mut node = NodeBuilder::new("npc", "door")
            .read_only("door", "door")
            .read_only("gate", "gate")
            .condition("isOpen", BoolField::new("door", ["open"]))
            .condition("wrongField", BoolField::new("door", ["closed"]))
            .condition("wrongAsset", BoolField::new("gate", ["open"]))
            .group("enter", "isOpen && unknown")
            .build()
            .unwrap();

        match node.bind(DataScope::new(&catalog, &history), None) {
            Validation::Failure(errors) => {
                assert_eq!(errors.len(), 3);
                let group_errors = errors
                    .iter()
                    .filter(|e| matches!(e, BindError::Group { .. }))
                    .count();
                assert_eq!(group_errors, 1);
            }
            Validation::Success(_) => panic!("Expected failures, got success"),
        }
        assert!(!node.is_valid());
    }

    #[test]
    fn invalid_node_is_never_enterable() {
        let catalog = catalog();
        let history = History::new();
        let scope = DataScope::new(&catalog, &history);
        let mut node = literal_node(&["falses"]);

        assert!(matches!(node.bind(scope, None), Validation::Failure(_)));
        let verdict = node.can_enter(false, scope, None);
        assert!(!verdict.enterable);
        assert_eq!(verdict.checks.get("valid"), Some(false));
    }

    #[test]
    fn reset_bindings_invalidates_node() {
        let catalog = catalog();
        let history = History::new();
        let scope = DataScope::new(&catalog, &history);
        let mut node = literal_node(&["true"]);
        let _ = node.bind(scope, None);
        assert!(node.is_valid());

        node.reset_bindings();
        assert!(!node.is_valid());
        assert_eq!(node.compiled_groups().len(), 1);
        assert!(!node.can_enter(false, scope, None).enterable);
    }

    struct Refuse;

    impl NodeBehavior for Refuse {
        fn can_enter(&self, _: bool, _: &dyn ConditionContext, checks: &mut EnterChecks) -> bool {
            checks.record("refuse", false);
            false
        }
    }

    #[test]
    fn native_check_can_refuse() {
        let catalog = catalog();
        let history = History::new();
        let scope = DataScope::new(&catalog, &history);
        let mut node = NodeBuilder::new("npc", "talk")
            .condition("yes", Constant(true))
            .group("g", "yes")
            .behavior(Refuse)
            .build()
            .unwrap();
        let _ = node.bind(scope, None);

        let verdict = node.can_enter(false, scope, None);
        assert!(!verdict.enterable);
        assert_eq!(verdict.checks.get("refuse"), Some(false));
        assert_eq!(verdict.checks.get("g"), Some(true));
    }

    /// Records a failed check but leaves the returned verdict at `true`.
    struct MissingItem;

    impl NodeBehavior for MissingItem {
        fn can_enter(&self, _: bool, _: &dyn ConditionContext, checks: &mut EnterChecks) -> bool {
            checks.record("hasQuestItem", false);
            checks.record("g", false);
            true
        }
    }

    #[test]
    fn recorded_failure_refuses_entry() {
        let catalog = catalog();
        let history = History::new();
        let scope = DataScope::new(&catalog, &history);
        let mut node = NodeBuilder::new("npc", "talk")
            .condition("yes", Constant(true))
            .group("g", "yes")
            .script(MissingItem)
            .build()
            .unwrap();
        let _ = node.bind(scope, None);

        let verdict = node.can_enter(false, scope, None);
        assert!(!verdict.enterable);
        assert_eq!(verdict.checks.get("hasQuestItem"), Some(false));
        // a passing group of the same name does not hide the hook's failure
        assert_eq!(verdict.checks.get("g"), Some(false));
    }

    #[test]
    fn merge_keeps_failures() {
        let mut checks = EnterChecks::new();
        checks.record("a", true);
        checks.record("b", false);

        let mut other = EnterChecks::new();
        other.record("a", false);
        other.record("b", true);
        other.record("c", true);
        checks.merge(other);

        assert_eq!(checks.get("a"), Some(false));
        assert_eq!(checks.get("b"), Some(false));
        assert_eq!(checks.get("c"), Some(true));
        assert!(!checks.all_passed());
    }

    #[derive(Clone, Default)]
    struct Recorder {
        phases: Arc<Mutex<Vec<&'static str>>>,
        end_on_begin: bool,
    }

    impl Recorder {
        fn push(&self, phase: &'static str) {
            self.phases.lock().unwrap().push(phase);
        }
    }

    impl NodeBehavior for Recorder {
        fn init(&mut self, _ctx: &mut NodeContext<'_>) {
            self.push("init");
        }

        fn on_begin(&mut self, _ctx: &mut NodeContext<'_>) -> bool {
            self.push("begin");
            self.end_on_begin
        }

        fn apply_begin(&mut self, ctx: &mut NodeContext<'_>) {
            self.push("apply_begin");
            if let Ok(door) = ctx.write("door") {
                door.set("open", Value::Bool(false));
            }
        }

        fn on_end(&mut self, _ctx: &mut NodeContext<'_>) {
            self.push("end");
        }

        fn apply_end(&mut self, _ctx: &mut NodeContext<'_>) {
            self.push("apply_end");
        }
    }

    #[test]
    fn begin_runs_native_then_hook_and_ors_ended() {
        let native = Recorder::default();
        let hook = Recorder {
            end_on_begin: true,
            ..Recorder::default()
        };
        let mut node = NodeBuilder::new("npc", "door")
            .writable("door", "door")
            .behavior(native.clone())
            .script(hook.clone())
            .build()
            .unwrap();

        let catalog = catalog();
        let history = History::new();
        let mut cache = BTreeMap::new();
        let ended = node.begin(DataAccess {
            catalog: &catalog,
            history: &history,
            cache: Some(&mut cache),
        });

        assert!(ended);
        assert_eq!(*native.phases.lock().unwrap(), vec!["init", "begin", "apply_begin"]);
        assert_eq!(*hook.phases.lock().unwrap(), vec!["init", "begin", "apply_begin"]);
        assert_eq!(
            cache.get("door").and_then(|d| d.get("open")),
            Some(&Value::Bool(false))
        );
    }

    #[test]
    fn replay_runs_only_apply_phases() {
        let native = Recorder::default();
        let mut node = NodeBuilder::new("npc", "door")
            .behavior(native.clone())
            .build()
            .unwrap();

        let catalog = catalog();
        let history = History::new();
        node.replay(DataAccess {
            catalog: &catalog,
            history: &history,
            cache: None,
        });

        assert_eq!(*native.phases.lock().unwrap(), vec!["apply_begin", "apply_end"]);
    }
}
