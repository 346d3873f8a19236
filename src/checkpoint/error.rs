//! Persistence error types.

use crate::core::NodeId;
use thiserror::Error;

/// Errors that can occur while saving, loading or restoring history.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum PersistenceError {
    /// Serialization to JSON or binary format failed
    #[error("Serialization failed: {0}")]
    SerializationFailed(String),

    /// Deserialization from JSON or binary format failed
    #[error("Deserialization failed: {0}")]
    DeserializationFailed(String),

    /// Checkpoint version is not supported by this version
    #[error("Unsupported checkpoint version {found}, supported: {supported}")]
    UnsupportedVersion { found: u32, supported: u32 },

    /// Checkpoint data failed validation
    #[error("Checkpoint validation failed: {0}")]
    ValidationFailed(String),

    #[error("Save slot '{0}' does not exist")]
    SlotNotFound(String),

    #[error("History index {index} is out of range for {len} entries")]
    InvalidIndex { index: usize, len: usize },

    /// A history entry names a node that is not registered
    #[error("History refers to unregistered node {0}")]
    UnknownNode(NodeId),

    #[error("Slot storage failed: {0}")]
    Storage(String),
}
