//! Named boolean predicates over node data.
//!
//! A [`Condition`] is bound once against the node's declared data templates
//! and evaluated many times against the latest data versions. Conditions
//! live in a node's [`ConditionSet`] under unique names that group
//! expressions refer to.

pub mod builtin;
pub mod spec;

pub use builtin::{
    BoolField, Compare, ComponentOverlap, Constant, ContainedInArray, FieldRef, NumberCompare,
    NumberComparison, PointerValid,
};
pub use spec::ConditionSpec;

use super::access::DataError;
use super::data::{DataAsset, PathError, ValueKind};
use super::node::NodeId;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Reasons a condition fails to bind.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConditionError {
    #[error(transparent)]
    Data(#[from] DataError),

    #[error(transparent)]
    Path(#[from] PathError),

    #[error("'{field}' is {found}, expected {expected}")]
    WrongType {
        field: String,
        expected: ValueKind,
        found: ValueKind,
    },

    #[error("'{left}' and '{right}' do not have the same type")]
    TypeMismatch { left: String, right: String },

    #[error("no comparison operator selected")]
    MissingComparison,

    #[error("owner has no component '{0}'")]
    UnknownComponent(String),

    #[error("arrays of {0} are not supported")]
    UnsupportedElement(ValueKind),
}

/// Data a condition binds and evaluates against.
pub trait ConditionContext {
    fn node_id(&self) -> &NodeId;

    /// Template of the asset behind `key`, used while binding.
    fn declared(&self, key: &str) -> Result<&DataAsset, DataError>;

    /// Latest version of the asset behind `key`, used while evaluating.
    fn fetch(&self, key: &str) -> Result<&DataAsset, DataError>;

    fn has_component(&self, _component: &str) -> bool {
        false
    }

    fn is_overlapping(&self, _component: &str) -> bool {
        false
    }
}

/// A named boolean predicate.
///
/// `bind` checks that everything the condition reads exists with the right
/// type. `evaluate` is only called on bound conditions and must not fail;
/// unexpected data yields `false`.
pub trait Condition: Send + Sync + fmt::Debug {
    fn bind(&self, ctx: &dyn ConditionContext) -> Result<(), ConditionError>;

    fn evaluate(&self, ctx: &dyn ConditionContext) -> bool;
}

#[derive(Debug)]
struct Slot {
    condition: Box<dyn Condition>,
    bound: bool,
}

/// The conditions of one node, by name.
#[derive(Debug, Default)]
pub struct ConditionSet {
    slots: BTreeMap<String, Slot>,
}

impl ConditionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a condition. Returns `false` if the name was already taken, in
    /// which case the set is unchanged.
    pub fn insert(&mut self, name: impl Into<String>, condition: Box<dyn Condition>) -> bool {
        let name = name.into();
        if self.slots.contains_key(&name) {
            return false;
        }
        self.slots.insert(
            name,
            Slot {
                condition,
                bound: false,
            },
        );
        true
    }

    pub fn contains(&self, name: &str) -> bool {
        self.slots.contains_key(name)
    }

    pub fn is_bound(&self, name: &str) -> bool {
        self.slots.get(name).map_or(false, |slot| slot.bound)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.slots.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Bind every condition, returning the failures by name.
    pub fn bind_all(&mut self, ctx: &dyn ConditionContext) -> Vec<(String, ConditionError)> {
        let mut failures = Vec::new();
        for (name, slot) in self.slots.iter_mut() {
            match slot.condition.bind(ctx) {
                Ok(()) => slot.bound = true,
                Err(err) => {
                    slot.bound = false;
                    tracing::warn!(
                        node = %ctx.node_id(),
                        condition = %name,
                        "condition failed to bind: {}",
                        err
                    );
                    failures.push((name.clone(), err));
                }
            }
        }
        failures
    }

    /// Clear every bound flag.
    pub fn reset(&mut self) {
        for slot in self.slots.values_mut() {
            slot.bound = false;
        }
    }

    /// Evaluate the condition called `name`. Unknown or unbound conditions
    /// evaluate to `false`.
    pub fn evaluate(&self, name: &str, ctx: &dyn ConditionContext) -> bool {
        match self.slots.get(name) {
            Some(slot) if slot.bound => slot.condition.evaluate(ctx),
            Some(_) => {
                tracing::warn!(node = %ctx.node_id(), condition = %name, "condition is not bound");
                false
            }
            None => {
                tracing::warn!(node = %ctx.node_id(), condition = %name, "condition does not exist");
                false
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::BTreeSet;

    /// In-memory context with separate template and latest versions.
    pub(crate) struct TestContext {
        pub id: NodeId,
        pub templates: BTreeMap<String, DataAsset>,
        pub latest: BTreeMap<String, DataAsset>,
        pub components: BTreeSet<String>,
        pub overlapping: BTreeSet<String>,
    }

    impl TestContext {
        pub fn new() -> Self {
            Self {
                id: NodeId::new("owner", "node"),
                templates: BTreeMap::new(),
                latest: BTreeMap::new(),
                components: BTreeSet::new(),
                overlapping: BTreeSet::new(),
            }
        }

        /// Declare `key` with the same template and latest version.
        pub fn with(mut self, key: &str, asset: DataAsset) -> Self {
            self.templates.insert(key.to_string(), asset.clone());
            self.latest.insert(key.to_string(), asset);
            self
        }

        pub fn with_latest(mut self, key: &str, asset: DataAsset) -> Self {
            self.latest.insert(key.to_string(), asset);
            self
        }
    }

    impl ConditionContext for TestContext {
        fn node_id(&self) -> &NodeId {
            &self.id
        }

        fn declared(&self, key: &str) -> Result<&DataAsset, DataError> {
            self.templates.get(key).ok_or_else(|| DataError::UndeclaredKey {
                node: self.id.clone(),
                key: key.to_string(),
            })
        }

        fn fetch(&self, key: &str) -> Result<&DataAsset, DataError> {
            self.latest.get(key).ok_or_else(|| DataError::UndeclaredKey {
                node: self.id.clone(),
                key: key.to_string(),
            })
        }

        fn has_component(&self, component: &str) -> bool {
            self.components.contains(component)
        }

        fn is_overlapping(&self, component: &str) -> bool {
            self.overlapping.contains(component)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::TestContext;
    use super::*;
    use crate::core::data::Value;

    fn flags() -> DataAsset {
        DataAsset::new("flags", "Flags").with("open", Value::Bool(true))
    }

    #[test]
    fn insert_rejects_duplicate_names() {
        let mut set = ConditionSet::new();
        assert!(set.insert("a", Box::new(Constant(true))));
        assert!(!set.insert("a", Box::new(Constant(false))));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn unbound_conditions_evaluate_false() {
        let ctx = TestContext::new();
        let mut set = ConditionSet::new();
        set.insert("yes", Box::new(Constant(true)));

        assert!(!set.evaluate("yes", &ctx));
        assert!(set.bind_all(&ctx).is_empty());
        assert!(set.evaluate("yes", &ctx));

        set.reset();
        assert!(!set.is_bound("yes"));
        assert!(!set.evaluate("yes", &ctx));
    }

    #[test]
    fn bind_all_reports_every_failure() {
        let ctx = TestContext::new().with("f", flags());
        let mut set = ConditionSet::new();
        set.insert("ok", Box::new(BoolField::new("f", ["open"])));
        set.insert("wrong_key", Box::new(BoolField::new("g", ["open"])));
        set.insert("wrong_field", Box::new(BoolField::new("f", ["closed"])));

        let failures = set.bind_all(&ctx);
        let names: Vec<&str> = failures.iter().map(|(name, _)| name.as_str()).collect();

        assert_eq!(names, vec!["wrong_field", "wrong_key"]);
        assert!(set.is_bound("ok"));
        assert!(matches!(failures[1].1, ConditionError::Data(_)));
        assert!(matches!(failures[0].1, ConditionError::Path(_)));
    }

    #[test]
    fn unknown_condition_evaluates_false() {
        let ctx = TestContext::new();
        let set = ConditionSet::new();
        assert!(!set.evaluate("missing", &ctx));
    }
}
