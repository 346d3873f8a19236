//! Transition history.
//!
//! Every time a node ends, the resolver appends one [`HistoryEntry`] holding
//! the node's identity and the versions of the data assets it modified. The
//! newest entry touching an asset defines that asset's latest version.

use super::data::DataAsset;
use super::node::NodeId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Record of a single completed node.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// The node that ended
    pub node: NodeId,
    /// Asset versions written while the node was active, by asset id
    pub data: BTreeMap<String, DataAsset>,
    /// When the node ended
    pub timestamp: DateTime<Utc>,
}

impl HistoryEntry {
    pub fn new(node: NodeId, data: BTreeMap<String, DataAsset>) -> Self {
        Self {
            node,
            data,
            timestamp: Utc::now(),
        }
    }
}

/// Ordered, append-only log of completed nodes.
///
/// # Example
///
/// ```rust
/// use dynamic_state_machine::core::{DataAsset, History, HistoryEntry, NodeId, Value};
/// use std::collections::BTreeMap;
///
/// let mut history = History::new();
/// let mut data = BTreeMap::new();
/// data.insert(
///     "quest".to_string(),
///     DataAsset::new("quest", "Quest").with("stage", Value::Int(2)),
/// );
/// history.append(HistoryEntry::new(NodeId::new("npc", "greet"), data));
///
/// assert_eq!(history.latest("quest").and_then(|q| q.get("stage")), Some(&Value::Int(2)));
/// assert!(history.latest("inventory").is_none());
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct History {
    entries: Vec<HistoryEntry>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, entry: HistoryEntry) {
        self.entries.push(entry);
    }

    /// Replace the whole log.
    pub fn replace_all(&mut self, entries: Vec<HistoryEntry>) {
        self.entries = entries;
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    pub fn get(&self, index: usize) -> Option<&HistoryEntry> {
        self.entries.get(index)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Newest recorded version of `asset_id`.
    pub fn latest(&self, asset_id: &str) -> Option<&DataAsset> {
        self.entries
            .iter()
            .rev()
            .find_map(|entry| entry.data.get(asset_id))
    }

    /// Newest recorded version of every asset ever written.
    pub fn latest_snapshot(&self) -> BTreeMap<&str, &DataAsset> {
        let mut snapshot = BTreeMap::new();
        for entry in &self.entries {
            for (id, asset) in &entry.data {
                snapshot.insert(id.as_str(), asset);
            }
        }
        snapshot
    }

    /// Index of the newest entry matching `predicate`.
    pub fn recent_index_by<P>(&self, predicate: P) -> Option<usize>
    where
        P: Fn(&HistoryEntry) -> bool,
    {
        self.entries.iter().rposition(predicate)
    }

    /// Nodes visited, oldest first.
    pub fn path(&self) -> Vec<&NodeId> {
        self.entries.iter().map(|entry| &entry.node).collect()
    }

    /// Time between the first and the last entry.
    pub fn duration(&self) -> Option<Duration> {
        if let (Some(first), Some(last)) = (self.entries.first(), self.entries.last()) {
            let duration = last.timestamp.signed_duration_since(first.timestamp);
            duration.to_std().ok()
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::data::Value;

    fn entry(owner: &str, name: &str, assets: &[(&str, i64)]) -> HistoryEntry {
        let data = assets
            .iter()
            .map(|(id, stage)| {
                (
                    id.to_string(),
                    DataAsset::new(*id, "Quest").with("stage", Value::Int(*stage)),
                )
            })
            .collect();
        HistoryEntry::new(NodeId::new(owner, name), data)
    }

    fn stage(asset: Option<&DataAsset>) -> Option<&Value> {
        asset.and_then(|a| a.get("stage"))
    }

    #[test]
    fn new_history_is_empty() {
        let history = History::new();
        assert!(history.is_empty());
        assert!(history.path().is_empty());
        assert!(history.duration().is_none());
    }

    #[test]
    fn latest_prefers_newest_entry() {
        let mut history = History::new();
        history.append(entry("npc", "a", &[("quest", 1)]));
        history.append(entry("npc", "b", &[("other", 5)]));
        history.append(entry("npc", "c", &[("quest", 3)]));

        assert_eq!(stage(history.latest("quest")), Some(&Value::Int(3)));
        assert_eq!(stage(history.latest("other")), Some(&Value::Int(5)));
    }

    #[test]
    fn snapshot_collects_latest_of_every_asset() {
        let mut history = History::new();
        history.append(entry("npc", "a", &[("quest", 1), ("other", 1)]));
        history.append(entry("npc", "b", &[("quest", 2)]));

        let snapshot = history.latest_snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(stage(snapshot.get("quest").copied()), Some(&Value::Int(2)));
        assert_eq!(stage(snapshot.get("other").copied()), Some(&Value::Int(1)));
    }

    #[test]
    fn recent_index_finds_last_match() {
        let mut history = History::new();
        history.append(entry("guard", "a", &[]));
        history.append(entry("npc", "b", &[]));
        history.append(entry("guard", "c", &[]));
        history.append(entry("npc", "d", &[]));

        assert_eq!(history.recent_index_by(|e| e.node.owner == "guard"), Some(2));
        assert_eq!(history.recent_index_by(|e| e.node.owner == "merchant"), None);
    }

    #[test]
    fn path_preserves_order() {
        let mut history = History::new();
        history.append(entry("npc", "a", &[]));
        history.append(entry("npc", "b", &[]));

        let names: Vec<&str> = history.path().iter().map(|id| id.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn replace_all_swaps_entries() {
        let mut history = History::new();
        history.append(entry("npc", "a", &[]));
        history.replace_all(vec![entry("npc", "x", &[]), entry("npc", "y", &[])]);

        assert_eq!(history.len(), 2);
        assert_eq!(history.get(0).map(|e| e.node.name.as_str()), Some("x"));
    }
}
