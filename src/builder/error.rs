//! Build errors for node and resolver builders.

use crate::resolver::PoolError;
use thiserror::Error;

/// Errors that can occur when building nodes and resolvers.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum BuildError {
    #[error("Node owner not specified")]
    EmptyOwner,

    #[error("Node name not specified")]
    EmptyName,

    #[error("No policy types declared. Omit .policies() to use the default policy")]
    NoPolicies,

    #[error("Condition '{0}' is defined more than once")]
    DuplicateCondition(String),

    #[error("Condition group '{0}' is defined more than once")]
    DuplicateGroup(String),

    #[error("Invalid node definition: {0}")]
    InvalidDefinition(String),

    #[error(transparent)]
    Pool(#[from] PoolError),
}
