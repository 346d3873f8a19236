//! Dynamic State Machine: a policy-driven conditional state machine
//!
//! Instead of fixed transitions, every registered node is a candidate that
//! is continuously re-evaluated for enterability. Policies narrow and order
//! the candidates; the resolver runs the chosen nodes one after another and
//! records the data each of them changed.
//!
//! # Core Concepts
//!
//! - **Nodes**: Candidate states with conditions, condition groups, tags and
//!   accepted policy types
//! - **Conditions**: Named predicates bound against external data assets
//! - **Condition groups**: Boolean expressions such as `"a && (b || !c)"`,
//!   compiled once when a node is bound
//! - **Policies**: Strategies selecting and ordering candidate nodes
//! - **History**: Append-only log of ended nodes and their data, which can be
//!   checkpointed and restored
//!
//! # Example
//!
//! ```rust
//! use dynamic_state_machine::builder::{NodeBuilder, ResolverBuilder};
//! use dynamic_state_machine::core::{BoolField, DataAsset, NodeId, Value};
//!
//! let open = NodeBuilder::new("door", "open")
//!     .read_only("state", "door_state")
//!     .condition("isLocked", BoolField::new("state", ["locked"]))
//!     .group("enter", "!isLocked")
//!     .build()
//!     .unwrap();
//! let rattle = NodeBuilder::new("door", "rattle")
//!     .read_only("state", "door_state")
//!     .condition("isLocked", BoolField::new("state", ["locked"]))
//!     .group("enter", "isLocked")
//!     .build()
//!     .unwrap();
//!
//! let mut resolver = ResolverBuilder::new()
//!     .asset(DataAsset::new("door_state", "Door").with("locked", Value::Bool(true)))
//!     .node(open)
//!     .node(rattle)
//!     .build()
//!     .unwrap();
//!
//! assert!(resolver.request_transition().unwrap());
//! assert_eq!(resolver.active_node(), Some(&NodeId::new("door", "rattle")));
//! ```

pub mod builder;
pub mod checkpoint;
pub mod core;
pub mod policy;
pub mod resolver;

// Re-export commonly used types
pub use builder::{BuildError, NodeBuilder, NodeDefinition, ResolverBuilder};
pub use checkpoint::{Checkpoint, PersistenceError};
pub use core::{DataAsset, Node, NodeBehavior, NodeContext, NodeId, Value};
pub use policy::{Policy, PolicyType};
pub use resolver::{ResolveError, Resolver, ResolverMode};
