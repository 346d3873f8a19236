//! The candidate pool.

use super::machine::Resolver;
use crate::core::{Node, NodeId};
use thiserror::Error;

/// Errors raised when registering nodes.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum PoolError {
    #[error("no candidate pool exists")]
    NoPool,

    #[error("expected exactly one candidate pool, found {0}")]
    MultiplePools(usize),

    #[error("node {0} is already registered")]
    AlreadyRegistered(NodeId),
}

/// Every registered node, in registration order.
#[derive(Debug, Default)]
pub struct NodePool {
    nodes: Vec<Node>,
}

impl NodePool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, node: Node) -> Result<(), PoolError> {
        if self.contains(node.id()) {
            return Err(PoolError::AlreadyRegistered(node.id().clone()));
        }
        self.nodes.push(node);
        Ok(())
    }

    pub fn remove(&mut self, id: &NodeId) -> Option<Node> {
        let index = self.nodes.iter().position(|node| node.id() == id)?;
        Some(self.nodes.remove(index))
    }

    pub fn get(&self, id: &NodeId) -> Option<&Node> {
        self.nodes.iter().find(|node| node.id() == id)
    }

    pub fn get_mut(&mut self, id: &NodeId) -> Option<&mut Node> {
        self.nodes.iter_mut().find(|node| node.id() == id)
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.get(id).is_some()
    }

    pub fn ids(&self) -> Vec<NodeId> {
        self.nodes.iter().map(|node| node.id().clone()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Node> {
        self.nodes.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

fn single(resolvers: &mut [Resolver]) -> Result<&mut Resolver, PoolError> {
    match resolvers {
        [] => Err(PoolError::NoPool),
        [resolver] => Ok(resolver),
        many => Err(PoolError::MultiplePools(many.len())),
    }
}

/// Register `node` with the only resolver in `resolvers`.
///
/// Returns whether the node bound successfully.
pub fn register_in(resolvers: &mut [Resolver], node: Node) -> Result<bool, PoolError> {
    let result = single(resolvers).and_then(|resolver| resolver.register_node(node));
    if let Err(err) = &result {
        tracing::error!("{}", err);
    }
    result
}

/// Unregister `id` from the only resolver in `resolvers`.
pub fn unregister_in(resolvers: &mut [Resolver], id: &NodeId) -> Result<Option<Node>, PoolError> {
    let resolver = single(resolvers)?;
    Ok(resolver.unregister_node(id))
}
