//! Record of enter checks made while resolving transitions.

use crate::core::{EnterChecks, NodeId};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, VecDeque};

/// Enter check results of one policy run.
#[derive(Clone, Debug, PartialEq)]
pub struct TransitionDebug {
    pub successful: BTreeMap<NodeId, EnterChecks>,
    pub unsuccessful: BTreeMap<NodeId, EnterChecks>,
    pub timestamp: DateTime<Utc>,
}

impl TransitionDebug {
    pub fn new() -> Self {
        Self {
            successful: BTreeMap::new(),
            unsuccessful: BTreeMap::new(),
            timestamp: Utc::now(),
        }
    }
}

impl Default for TransitionDebug {
    fn default() -> Self {
        Self::new()
    }
}

/// Records kept unless a different limit is configured.
pub const DEFAULT_DEBUG_LIMIT: usize = 64;

/// The most recent [`TransitionDebug`] records, oldest first.
///
/// Once `limit` records are held, pushing drops the oldest one.
#[derive(Clone, Debug)]
pub struct DebugLog {
    records: VecDeque<TransitionDebug>,
    limit: usize,
}

impl Default for DebugLog {
    fn default() -> Self {
        Self::with_limit(DEFAULT_DEBUG_LIMIT)
    }
}

impl DebugLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// A log keeping at most `limit` records. A limit of zero keeps none.
    pub fn with_limit(limit: usize) -> Self {
        Self {
            records: VecDeque::new(),
            limit,
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn push(&mut self, record: TransitionDebug) {
        if self.limit == 0 {
            return;
        }
        while self.records.len() >= self.limit {
            self.records.pop_front();
        }
        self.records.push_back(record);
    }

    pub fn records(&self) -> impl Iterator<Item = &TransitionDebug> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn last(&self) -> Option<&TransitionDebug> {
        self.records.back()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(node: &str) -> TransitionDebug {
        let mut record = TransitionDebug::new();
        record
            .successful
            .insert(NodeId::new("npc", node), EnterChecks::new());
        record
    }

    #[test]
    fn drops_oldest_records_past_the_limit() {
        let mut log = DebugLog::with_limit(2);
        log.push(record("a"));
        log.push(record("b"));
        log.push(record("c"));

        assert_eq!(log.len(), 2);
        let names: Vec<&str> = log
            .records()
            .flat_map(|r| r.successful.keys())
            .map(|id| id.name.as_str())
            .collect();
        assert_eq!(names, vec!["b", "c"]);
    }

    #[test]
    fn zero_limit_keeps_nothing() {
        let mut log = DebugLog::with_limit(0);
        log.push(record("a"));
        assert!(log.is_empty());
        assert!(log.last().is_none());
    }

    #[test]
    fn default_limit_applies() {
        let mut log = DebugLog::new();
        for _ in 0..DEFAULT_DEBUG_LIMIT + 10 {
            log.push(record("a"));
        }
        assert_eq!(log.len(), DEFAULT_DEBUG_LIMIT);
    }
}
