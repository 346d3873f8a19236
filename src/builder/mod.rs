//! Builder API for ergonomic node and resolver construction.
//!
//! This module provides fluent builders plus a serde-backed declarative
//! form for nodes, validating configuration before anything is bound.

pub mod definition;
pub mod error;
pub mod node;
pub mod resolver;

pub use definition::NodeDefinition;
pub use error::BuildError;
pub use node::NodeBuilder;
pub use resolver::ResolverBuilder;
