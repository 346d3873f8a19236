//! Saving and loading transition history.
//!
//! A [`Checkpoint`] captures the history log up to a chosen entry. It can be
//! encoded as JSON for readability or as binary for compactness, written to
//! a named slot of a [`SlotStore`], and later restored into a resolver,
//! which replays the recorded nodes' apply phases.

use crate::core::{History, HistoryEntry};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod error;
pub mod store;

pub use error::PersistenceError;
pub use store::{delete_slot, load_slot, save_slot, FileSlotStore, MemorySlotStore, SlotStore};

/// Version identifier for checkpoint format
pub const CHECKPOINT_VERSION: u32 = 1;

/// Encoding used when writing a slot.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SlotFormat {
    #[default]
    Json,
    Binary,
}

/// Serializable snapshot of transition history.
/// Does NOT include nodes or behaviors; those are looked up by id on restore.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Checkpoint format version
    pub version: u32,

    /// Unique checkpoint identifier
    pub id: String,

    /// When checkpoint was created
    pub timestamp: DateTime<Utc>,

    /// Slot the checkpoint is saved under
    pub slot: String,

    /// Saved history entries
    pub entries: Vec<HistoryEntry>,

    /// Last entry replayed on restore
    pub index_to_load: usize,

    /// Whether entries after `index_to_load` are kept
    pub keep_state: bool,
}

impl Checkpoint {
    /// Capture `history` for `slot`.
    ///
    /// Without `keep_state`, entries after `index` are dropped.
    ///
    /// # Example
    ///
    /// ```rust
    /// use dynamic_state_machine::checkpoint::Checkpoint;
    /// use dynamic_state_machine::core::{History, HistoryEntry, NodeId};
    /// use std::collections::BTreeMap;
    ///
    /// let mut history = History::new();
    /// history.append(HistoryEntry::new(NodeId::new("npc", "a"), BTreeMap::new()));
    /// history.append(HistoryEntry::new(NodeId::new("npc", "b"), BTreeMap::new()));
    ///
    /// let checkpoint = Checkpoint::capture(&history, "autosave", 0, false).unwrap();
    /// assert_eq!(checkpoint.entries.len(), 1);
    ///
    /// assert!(Checkpoint::capture(&history, "autosave", 2, false).is_err());
    /// ```
    pub fn capture(
        history: &History,
        slot: impl Into<String>,
        index: usize,
        keep_state: bool,
    ) -> Result<Self, PersistenceError> {
        let len = history.len();
        if index >= len {
            return Err(PersistenceError::InvalidIndex { index, len });
        }

        let entries = if keep_state {
            history.entries().to_vec()
        } else {
            history.entries()[..=index].to_vec()
        };

        Ok(Self {
            version: CHECKPOINT_VERSION,
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            slot: slot.into(),
            entries,
            index_to_load: index,
            keep_state,
        })
    }

    /// Check version, slot name and index.
    pub fn validate(&self) -> Result<(), PersistenceError> {
        if self.version != CHECKPOINT_VERSION {
            return Err(PersistenceError::UnsupportedVersion {
                found: self.version,
                supported: CHECKPOINT_VERSION,
            });
        }
        if self.slot.is_empty() {
            return Err(PersistenceError::ValidationFailed(
                "slot name is empty".to_string(),
            ));
        }
        if self.index_to_load >= self.entries.len() {
            return Err(PersistenceError::InvalidIndex {
                index: self.index_to_load,
                len: self.entries.len(),
            });
        }
        Ok(())
    }

    /// Entries replayed on restore.
    pub fn replay_entries(&self) -> &[HistoryEntry] {
        self.entries.get(..=self.index_to_load).unwrap_or(&[])
    }

    pub fn to_json(&self) -> Result<String, PersistenceError> {
        serde_json::to_string_pretty(self)
            .map_err(|e| PersistenceError::SerializationFailed(e.to_string()))
    }

    pub fn from_json(json: &str) -> Result<Self, PersistenceError> {
        let checkpoint: Self = serde_json::from_str(json)
            .map_err(|e| PersistenceError::DeserializationFailed(e.to_string()))?;
        checkpoint.validate()?;
        Ok(checkpoint)
    }

    pub fn to_binary(&self) -> Result<Vec<u8>, PersistenceError> {
        bincode::serialize(self).map_err(|e| PersistenceError::SerializationFailed(e.to_string()))
    }

    pub fn from_binary(bytes: &[u8]) -> Result<Self, PersistenceError> {
        let checkpoint: Self = bincode::deserialize(bytes)
            .map_err(|e| PersistenceError::DeserializationFailed(e.to_string()))?;
        checkpoint.validate()?;
        Ok(checkpoint)
    }

    pub fn encode(&self, format: SlotFormat) -> Result<Vec<u8>, PersistenceError> {
        match format {
            SlotFormat::Json => self.to_json().map(String::into_bytes),
            SlotFormat::Binary => self.to_binary(),
        }
    }

    /// Decode either format. JSON is recognized by its leading `{`.
    pub fn decode(bytes: &[u8]) -> Result<Self, PersistenceError> {
        let first = bytes.iter().find(|b| !b.is_ascii_whitespace());
        if first == Some(&b'{') {
            let json = std::str::from_utf8(bytes)
                .map_err(|e| PersistenceError::DeserializationFailed(e.to_string()))?;
            Self::from_json(json)
        } else {
            Self::from_binary(bytes)
        }
    }
}
