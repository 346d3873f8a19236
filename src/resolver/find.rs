//! Policy discovery.
//!
//! Starting from a candidate list, the policy types every candidate accepts
//! are intersected, the highest-priority one not yet applied is activated,
//! and its output becomes the next candidate list. This repeats until no
//! common policy remains. The chosen policy is then the successful one with
//! the highest priority among all that were applied, which is not
//! necessarily the last one.

use super::error::ResolveError;
use crate::core::NodeId;
use crate::policy::{ActivatedPolicy, Policy, PolicyContext, PolicyRegistry, PolicyType};

/// Policy types declared by every registered candidate, in the order the
/// first candidate declares them.
pub fn common_policies(candidates: &[NodeId], ctx: &PolicyContext<'_>) -> Vec<PolicyType> {
    let mut nodes = candidates.iter().filter_map(|id| ctx.node(id));
    let Some(first) = nodes.next() else {
        return Vec::new();
    };

    let mut common: Vec<PolicyType> = Vec::new();
    for policy_type in first.policies() {
        if !common.contains(policy_type) {
            common.push(policy_type.clone());
        }
    }
    for node in nodes {
        common.retain(|policy_type| node.policies().contains(policy_type));
    }
    common
}

/// Narrow `candidates` through successive policies and return the best
/// successful one, or `None` when no applied policy succeeded.
///
/// A policy type is applied at most once per call.
pub fn find_policy(
    registry: &PolicyRegistry,
    candidates: Vec<NodeId>,
    ctx: &mut PolicyContext<'_>,
) -> Result<Option<ActivatedPolicy>, ResolveError> {
    let mut applied: Vec<ActivatedPolicy> = Vec::new();
    let mut candidates = candidates;

    while !candidates.is_empty() {
        let mut remaining: Vec<(PolicyType, Box<dyn Policy>)> = common_policies(&candidates, ctx)
            .into_iter()
            .filter(|policy_type| !applied.iter().any(|p| p.policy_type() == policy_type))
            .filter_map(|policy_type| match registry.instantiate(&policy_type) {
                Some(policy) => Some((policy_type, policy)),
                None => {
                    tracing::warn!(policy = %policy_type, "policy type is not registered");
                    None
                }
            })
            .collect();

        remaining.sort_by_key(|(_, policy)| policy.priority());
        let Some((policy_type, policy)) = remaining.pop() else {
            break;
        };

        let activated = ActivatedPolicy::activate(policy_type, policy, &candidates, ctx)?;
        candidates = activated.nodes().cloned().collect();
        applied.push(activated);
    }

    let best = applied
        .into_iter()
        .filter(ActivatedPolicy::is_successful)
        .max_by_key(ActivatedPolicy::priority);

    match &best {
        Some(policy) => tracing::info!(
            policy = %policy.name(),
            priority = policy.priority(),
            "selected policy"
        ),
        None => tracing::info!("no policy succeeded"),
    }
    Ok(best)
}
