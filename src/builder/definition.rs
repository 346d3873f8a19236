//! Declarative node definitions.
//!
//! A [`NodeDefinition`] describes everything about a node except its
//! behaviors, so node graphs can be authored as JSON documents.

use crate::builder::error::BuildError;
use crate::builder::node::NodeBuilder;
use crate::core::{ConditionSpec, Node};
use crate::policy::PolicyType;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Serializable node description.
///
/// # Example
///
/// ```rust
/// use dynamic_state_machine::builder::NodeDefinition;
///
/// let definition = NodeDefinition::from_json(r#"{
///     "owner": "merchant",
///     "name": "haggle",
///     "tags": ["trade"],
///     "read_only": { "purse": "player_purse" },
///     "conditions": {
///         "hasGold": {
///             "type": "number_compare",
///             "left": { "key": "purse", "path": [{ "field": "gold" }] },
///             "comparison": "greater",
///             "right": { "key": "purse", "path": [{ "field": "debt" }] }
///         }
///     },
///     "groups": { "enter": "hasGold" }
/// }"#).unwrap();
///
/// let node = definition.build().unwrap();
/// assert!(node.has_tag("trade"));
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NodeDefinition {
    pub owner: String,
    pub name: String,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Empty means the default policy only.
    #[serde(default)]
    pub policies: Vec<PolicyType>,
    #[serde(default)]
    pub writable: BTreeMap<String, String>,
    #[serde(default)]
    pub read_only: BTreeMap<String, String>,
    #[serde(default)]
    pub conditions: BTreeMap<String, ConditionSpec>,
    #[serde(default)]
    pub groups: BTreeMap<String, String>,
}

impl NodeDefinition {
    pub fn from_json(json: &str) -> Result<Self, BuildError> {
        serde_json::from_str(json).map_err(|e| BuildError::InvalidDefinition(e.to_string()))
    }

    pub fn to_json(&self) -> Result<String, BuildError> {
        serde_json::to_string_pretty(self).map_err(|e| BuildError::InvalidDefinition(e.to_string()))
    }

    /// A builder preloaded with this definition. Behaviors can be attached
    /// before building.
    pub fn into_builder(self) -> NodeBuilder {
        let mut builder = NodeBuilder::new(self.owner, self.name);
        for tag in self.tags {
            builder = builder.tag(tag);
        }
        if !self.policies.is_empty() {
            builder = builder.policies(self.policies);
        }
        for (key, asset) in self.writable {
            builder = builder.writable(key, asset);
        }
        for (key, asset) in self.read_only {
            builder = builder.read_only(key, asset);
        }
        for (name, spec) in self.conditions {
            builder = builder.condition_boxed(name, spec.into_condition());
        }
        for (name, expression) in self.groups {
            builder = builder.group(name, expression);
        }
        builder
    }

    pub fn build(self) -> Result<Node, BuildError> {
        self.into_builder().build()
    }
}
