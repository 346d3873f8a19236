//! Core state machine types and logic.
//!
//! This module contains the synchronous core of the state machine:
//! - Data assets, property paths and the catalog of templates
//! - The condition expression compiler
//! - Conditions and their binding against node data
//! - Nodes with their lifecycle and enter checks
//! - Transition history

pub mod access;
pub mod condition;
pub mod data;
pub mod expression;
pub mod history;
pub mod node;

pub use access::{
    Access, DataAccess, DataBindings, DataError, DataHandle, DataScope, NodeContext, NodeView,
    SpatialProbe,
};
pub use condition::{
    BoolField, Compare, ComponentOverlap, Condition, ConditionContext, ConditionError,
    ConditionSet, ConditionSpec, Constant, ContainedInArray, FieldRef, NumberCompare,
    NumberComparison, PointerValid,
};
pub use data::{DataAsset, DataCatalog, PathError, PathSegment, PropertyPath, Value, ValueKind};
pub use expression::{compile, CompileError, CompiledGroup, Expr};
pub use history::{History, HistoryEntry};
pub use node::{BindError, EnterChecks, EnterVerdict, NoBehavior, Node, NodeBehavior, NodeId};
