//! Builder for constructing nodes.

use crate::builder::error::BuildError;
use crate::core::{
    Condition, ConditionSet, DataBindings, NoBehavior, Node, NodeBehavior, NodeId,
};
use crate::policy::PolicyType;

/// Builder for constructing nodes with a fluent API.
///
/// # Example
///
/// ```rust
/// use dynamic_state_machine::builder::NodeBuilder;
/// use dynamic_state_machine::core::{BoolField, Constant};
///
/// let node = NodeBuilder::new("blacksmith", "greeting")
///     .tag("dialogue")
///     .read_only("world", "world_state")
///     .condition("isDay", BoolField::new("world", ["day"]))
///     .condition("always", Constant(true))
///     .group("enter", "isDay && always")
///     .build()
///     .unwrap();
///
/// assert_eq!(node.id().to_string(), "blacksmith -> greeting");
/// assert!(node.has_tag("dialogue"));
/// assert!(!node.is_valid());
/// ```
pub struct NodeBuilder {
    owner: String,
    name: String,
    tags: Vec<String>,
    policies: Option<Vec<PolicyType>>,
    bindings: DataBindings,
    conditions: Vec<(String, Box<dyn Condition>)>,
    groups: Vec<(String, String)>,
    behavior: Option<Box<dyn NodeBehavior>>,
    script: Option<Box<dyn NodeBehavior>>,
}

impl NodeBuilder {
    /// Create a new builder for the node `name` owned by `owner`.
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
            tags: Vec::new(),
            policies: None,
            bindings: DataBindings::new(),
            conditions: Vec::new(),
            groups: Vec::new(),
            behavior: None,
            script: None,
        }
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Accept `policy_type`. Without any call the node accepts only the
    /// default policy.
    pub fn policy(mut self, policy_type: PolicyType) -> Self {
        self.policies.get_or_insert_with(Vec::new).push(policy_type);
        self
    }

    /// Replace the accepted policy types.
    pub fn policies(mut self, policy_types: impl IntoIterator<Item = PolicyType>) -> Self {
        self.policies = Some(policy_types.into_iter().collect());
        self
    }

    /// Declare `key` as a writable reference to the asset `asset`.
    pub fn writable(mut self, key: impl Into<String>, asset: impl Into<String>) -> Self {
        self.bindings.add_writable(key, asset);
        self
    }

    /// Declare `key` as a read-only reference to the asset `asset`.
    pub fn read_only(mut self, key: impl Into<String>, asset: impl Into<String>) -> Self {
        self.bindings.add_read_only(key, asset);
        self
    }

    pub fn condition(self, name: impl Into<String>, condition: impl Condition + 'static) -> Self {
        self.condition_boxed(name, Box::new(condition))
    }

    pub fn condition_boxed(mut self, name: impl Into<String>, condition: Box<dyn Condition>) -> Self {
        self.conditions.push((name.into(), condition));
        self
    }

    /// Add a condition group expression such as `"a && (b || !c)"`.
    pub fn group(mut self, name: impl Into<String>, expression: impl Into<String>) -> Self {
        self.groups.push((name.into(), expression.into()));
        self
    }

    /// Native lifecycle behavior.
    pub fn behavior(mut self, behavior: impl NodeBehavior + 'static) -> Self {
        self.behavior = Some(Box::new(behavior));
        self
    }

    /// Scripted hook behavior, run after the native one in every phase.
    pub fn script(mut self, script: impl NodeBehavior + 'static) -> Self {
        self.script = Some(Box::new(script));
        self
    }

    /// Build the node.
    /// The node is unbound until registered with a resolver.
    pub fn build(self) -> Result<Node, BuildError> {
        if self.owner.is_empty() {
            return Err(BuildError::EmptyOwner);
        }
        if self.name.is_empty() {
            return Err(BuildError::EmptyName);
        }

        let policies = match self.policies {
            None => vec![PolicyType::default_policy()],
            Some(policies) if policies.is_empty() => return Err(BuildError::NoPolicies),
            Some(policies) => policies,
        };

        let mut conditions = ConditionSet::new();
        for (name, condition) in self.conditions {
            if conditions.contains(&name) {
                return Err(BuildError::DuplicateCondition(name));
            }
            conditions.insert(name, condition);
        }

        for (i, (name, _)) in self.groups.iter().enumerate() {
            if self.groups[..i].iter().any(|(other, _)| other == name) {
                return Err(BuildError::DuplicateGroup(name.clone()));
            }
        }

        Ok(Node {
            id: NodeId::new(self.owner, self.name),
            tags: self.tags,
            policies,
            bindings: self.bindings,
            conditions,
            groups: self.groups,
            compiled: Vec::new(),
            bound: false,
            behavior: self.behavior.unwrap_or_else(|| Box::new(NoBehavior)),
            script: self.script.unwrap_or_else(|| Box::new(NoBehavior)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Constant;

    #[test]
    fn builder_validates_identity() {
        assert!(matches!(
            NodeBuilder::new("", "a").build(),
            Err(BuildError::EmptyOwner)
        ));
        assert!(matches!(
            NodeBuilder::new("npc", "").build(),
            Err(BuildError::EmptyName)
        ));
    }

    #[test]
    fn default_policy_is_used_when_none_declared() {
        let node = NodeBuilder::new("npc", "a").build().unwrap();
        assert_eq!(node.policies(), &[PolicyType::default_policy()]);

        let node = NodeBuilder::new("npc", "a")
            .policy(PolicyType::order_by_tag())
            .policy(PolicyType::default_policy())
            .build()
            .unwrap();
        assert_eq!(
            node.policies(),
            &[PolicyType::order_by_tag(), PolicyType::default_policy()]
        );
    }

    #[test]
    fn empty_policy_list_is_rejected() {
        let result = NodeBuilder::new("npc", "a").policies(Vec::new()).build();
        assert!(matches!(result, Err(BuildError::NoPolicies)));
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let result = NodeBuilder::new("npc", "a")
            .condition("x", Constant(true))
            .condition("x", Constant(false))
            .build();
        assert_eq!(result.err(), Some(BuildError::DuplicateCondition("x".into())));

        let result = NodeBuilder::new("npc", "a")
            .condition("x", Constant(true))
            .group("g", "x")
            .group("g", "!x")
            .build();
        assert_eq!(result.err(), Some(BuildError::DuplicateGroup("g".into())));
    }

    #[test]
    fn built_node_is_unbound() {
        let node = NodeBuilder::new("npc", "a")
            .condition("x", Constant(true))
            .group("g", "x")
            .build()
            .unwrap();

        assert!(!node.is_valid());
        assert!(node.compiled_groups().is_empty());
        assert_eq!(node.groups().collect::<Vec<_>>(), vec![("g", "x")]);
    }
}
