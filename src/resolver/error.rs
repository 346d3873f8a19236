//! Resolver error types.

use thiserror::Error;

/// Errors that abort a resolution attempt.
///
/// Resolving no policy at all is not an error; the resolver simply goes idle.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ResolveError {
    /// The native and scripted implementation of a policy both produced a
    /// result, so the authored intent cannot be determined.
    #[error("policy '{policy}' produced a result from both its native and scripted implementation")]
    AmbiguousPolicy { policy: String },
}
