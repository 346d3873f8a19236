//! Built-in policies.

use super::{Policy, PolicyContext, PolicyOutcome, TransitionDebug};
use crate::core::NodeId;

/// Picks the single enterable candidate.
///
/// Every candidate is evaluated. The outcome lists all enterable candidates
/// and succeeds only when exactly one exists.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultPolicy;

impl Policy for DefaultPolicy {
    fn name(&self) -> &str {
        "DefaultPolicy"
    }

    fn priority(&self) -> i32 {
        0
    }

    fn apply(&self, candidates: &[NodeId], ctx: &mut PolicyContext<'_>) -> PolicyOutcome {
        let mut record = TransitionDebug::new();
        let mut enterable = Vec::new();

        for id in candidates {
            match ctx.can_enter(id) {
                Some(verdict) if verdict.enterable => {
                    enterable.push(id.clone());
                    record.successful.insert(verdict.node, verdict.checks);
                }
                Some(verdict) => {
                    record.unsuccessful.insert(verdict.node, verdict.checks);
                }
                None => tracing::warn!(node = %id, "candidate is not registered"),
            }
        }
        ctx.record(record);

        let success = enterable.len() == 1;
        if enterable.len() > 1 {
            tracing::debug!(count = enterable.len(), "more than one enterable node");
        }
        PolicyOutcome::new(enterable, success)
    }
}

/// Orders candidates by a configured tag sequence.
///
/// For each tag in order, every candidate carrying it is appended, so a node
/// with several listed tags appears more than once.
#[derive(Clone, Debug, Default)]
pub struct OrderByTagPolicy {
    tag_order: Vec<String>,
}

impl OrderByTagPolicy {
    pub fn new(tag_order: Vec<String>) -> Self {
        Self { tag_order }
    }

    pub fn tag_order(&self) -> &[String] {
        &self.tag_order
    }
}

impl Policy for OrderByTagPolicy {
    fn name(&self) -> &str {
        "OrderByTagPolicy"
    }

    fn priority(&self) -> i32 {
        10
    }

    fn apply(&self, candidates: &[NodeId], ctx: &mut PolicyContext<'_>) -> PolicyOutcome {
        let mut ordered = Vec::new();
        for tag in &self.tag_order {
            ordered.extend(
                candidates
                    .iter()
                    .filter(|id| ctx.node(id).map_or(false, |node| node.has_tag(tag)))
                    .cloned(),
            );
        }
        let success = !ordered.is_empty();
        PolicyOutcome::new(ordered, success)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::NodeBuilder;
    use crate::core::{Constant, DataCatalog, DataScope, History};
    use crate::policy::DebugLog;
    use crate::resolver::NodePool;

    /// Nodes as (name, enterable, space separated tags).
    fn pool(nodes: &[(&str, bool, &str)]) -> NodePool {
        let catalog = DataCatalog::new();
        let history = History::new();
        let mut pool = NodePool::new();
        for (name, enterable, tags) in nodes {
            let mut builder = NodeBuilder::new("npc", *name)
                .condition("gate", Constant(*enterable))
                .group("enter", "gate");
            for tag in tags.split_whitespace() {
                builder = builder.tag(tag);
            }
            let mut node = builder.build().unwrap();
            let _ = node.bind(DataScope::new(&catalog, &history), None);
            pool.insert(node).unwrap();
        }
        pool
    }

    fn run(policy: &dyn Policy, pool: &NodePool, debug: &mut DebugLog) -> PolicyOutcome {
        let catalog = DataCatalog::new();
        let history = History::new();
        let candidates = pool.ids();
        let mut ctx = PolicyContext::new(
            pool,
            DataScope::new(&catalog, &history),
            None,
            false,
            debug,
        );
        policy.apply(&candidates, &mut ctx)
    }

    fn names(outcome: &PolicyOutcome) -> Vec<&str> {
        outcome.nodes.iter().map(|id| id.name.as_str()).collect()
    }

    #[test]
    fn default_policy_succeeds_with_exactly_one() {
        let pool = pool(&[("a", false, ""), ("b", true, ""), ("c", false, "")]);
        let mut debug = DebugLog::new();
        let outcome = run(&DefaultPolicy, &pool, &mut debug);

        assert!(outcome.success);
        assert_eq!(names(&outcome), vec!["b"]);

        let record = debug.last().unwrap();
        assert_eq!(record.successful.len(), 1);
        assert_eq!(record.unsuccessful.len(), 2);
    }

    #[test]
    fn default_policy_fails_without_enterable_nodes() {
        let pool = pool(&[("a", false, ""), ("b", false, "")]);
        let outcome = run(&DefaultPolicy, &pool, &mut DebugLog::new());

        assert!(!outcome.success);
        assert!(outcome.nodes.is_empty());
    }

    #[test]
    fn default_policy_fails_with_several_but_returns_them() {
        let pool = pool(&[("a", true, ""), ("b", false, ""), ("c", true, "")]);
        let outcome = run(&DefaultPolicy, &pool, &mut DebugLog::new());

        assert!(!outcome.success);
        assert_eq!(names(&outcome), vec!["a", "c"]);
    }

    #[test]
    fn order_by_tag_follows_tag_order() {
        let pool = pool(&[("n1", true, "B"), ("n2", true, "A"), ("n3", true, "A")]);
        let policy = OrderByTagPolicy::new(vec!["A".into(), "B".into()]);
        let outcome = run(&policy, &pool, &mut DebugLog::new());

        assert!(outcome.success);
        assert_eq!(names(&outcome), vec!["n2", "n3", "n1"]);
    }

    #[test]
    fn order_by_tag_repeats_nodes_with_several_tags() {
        let pool = pool(&[("n1", true, "A B"), ("n2", true, "C")]);
        let policy = OrderByTagPolicy::new(vec!["B".into(), "A".into()]);
        let outcome = run(&policy, &pool, &mut DebugLog::new());

        assert_eq!(names(&outcome), vec!["n1", "n1"]);
    }

    #[test]
    fn order_by_tag_fails_when_nothing_matches() {
        let pool = pool(&[("n1", true, "X")]);
        let policy = OrderByTagPolicy::new(vec!["A".into()]);
        let outcome = run(&policy, &pool, &mut DebugLog::new());

        assert!(!outcome.success);
        assert!(outcome.nodes.is_empty());
    }
}
