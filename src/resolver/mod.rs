//! Transition resolution and the per-tick drive loop.
//!
//! The [`Resolver`] owns the candidate pool, finds the best policy with
//! [`find_policy`], drains its node queue one transition at a time and
//! records every ended node in history.

mod error;
mod find;
mod machine;
mod pool;

pub use error::ResolveError;
pub use find::{common_policies, find_policy};
pub use machine::{ActiveNode, Resolver, ResolverMode};
pub use pool::{register_in, unregister_in, NodePool, PoolError};
