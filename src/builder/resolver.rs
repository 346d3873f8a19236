//! Builder for constructing resolvers.

use crate::builder::error::BuildError;
use crate::core::{DataAsset, Node, SpatialProbe};
use crate::policy::{Policy, PolicyType};
use crate::resolver::Resolver;

/// Builder for a [`Resolver`] with its data, policies and nodes.
///
/// Assets are registered before any node, so nodes may be added in any
/// order relative to the assets they declare.
///
/// # Example
///
/// ```rust
/// use dynamic_state_machine::builder::{NodeBuilder, ResolverBuilder};
/// use dynamic_state_machine::core::{BoolField, DataAsset, Value};
///
/// let greeting = NodeBuilder::new("innkeeper", "greeting")
///     .read_only("world", "world_state")
///     .condition("isDay", BoolField::new("world", ["day"]))
///     .group("enter", "isDay")
///     .build()
///     .unwrap();
///
/// let mut resolver = ResolverBuilder::new()
///     .node(greeting)
///     .asset(DataAsset::new("world_state", "World").with("day", Value::Bool(true)))
///     .transition_on_start(true)
///     .build()
///     .unwrap();
///
/// assert!(resolver.start().unwrap());
/// ```
#[derive(Default)]
pub struct ResolverBuilder {
    resolver: Resolver,
    nodes: Vec<Node>,
}

impl ResolverBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a data template.
    pub fn asset(mut self, asset: DataAsset) -> Self {
        self.resolver.register_asset(asset);
        self
    }

    /// Register a policy factory under `policy_type`.
    pub fn policy<F>(mut self, policy_type: PolicyType, factory: F) -> Self
    where
        F: Fn() -> Box<dyn Policy> + Send + Sync + 'static,
    {
        self.resolver.policies_mut().register(policy_type, factory);
        self
    }

    /// Configure the tag order of the built-in tag-ordering policy.
    pub fn order_by_tag<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let tags = tags.into_iter().map(Into::into).collect();
        self.resolver.policies_mut().register_order_by_tag(tags);
        self
    }

    pub fn spatial(mut self, probe: impl SpatialProbe + 'static) -> Self {
        self.resolver.set_spatial(probe);
        self
    }

    /// Request the first transition from [`Resolver::start`].
    pub fn transition_on_start(mut self, enabled: bool) -> Self {
        self.resolver.set_transition_on_start(enabled);
        self
    }

    pub fn node(mut self, node: Node) -> Self {
        self.nodes.push(node);
        self
    }

    /// Bind and register every node.
    ///
    /// Nodes that fail to bind are still registered; only duplicate node
    /// ids fail the build.
    pub fn build(self) -> Result<Resolver, BuildError> {
        let mut resolver = self.resolver;
        for node in self.nodes {
            resolver.register_node(node)?;
        }
        Ok(resolver)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::NodeBuilder;
    use crate::core::{BoolField, NodeId, Value};
    use crate::resolver::PoolError;

    fn door_node(name: &str) -> Node {
        NodeBuilder::new("door", name)
            .read_only("state", "door_state")
            .condition("isOpen", BoolField::new("state", ["open"]))
            .group("enter", "isOpen")
            .build()
            .unwrap()
    }

    #[test]
    fn nodes_bind_against_assets_added_later() {
        let resolver = ResolverBuilder::new()
            .node(door_node("open"))
            .asset(DataAsset::new("door_state", "Door").with("open", Value::Bool(true)))
            .build()
            .unwrap();

        let node = resolver.node(&NodeId::new("door", "open")).unwrap();
        assert!(node.is_valid());
    }

    #[test]
    fn missing_asset_leaves_node_registered_but_invalid() {
        let resolver = ResolverBuilder::new()
            .node(door_node("open"))
            .build()
            .unwrap();

        let node = resolver.node(&NodeId::new("door", "open")).unwrap();
        assert!(!node.is_valid());
    }

    #[test]
    fn duplicate_nodes_fail_the_build() {
        let result = ResolverBuilder::new()
            .node(door_node("open"))
            .node(door_node("open"))
            .build();

        assert_eq!(
            result.err(),
            Some(BuildError::Pool(PoolError::AlreadyRegistered(NodeId::new(
                "door", "open"
            ))))
        );
    }
}
