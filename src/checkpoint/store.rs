//! Slot storage and the persistence effects.
//!
//! Saving, loading and deleting slots are Stillwater effects over a
//! [`SlotStore`] environment. The caller decides when to run them; the
//! resolver never waits on storage.

use super::{Checkpoint, PersistenceError, SlotFormat};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use stillwater::effect::{BoxedEffect, Effect};
use stillwater::prelude::*;

/// Byte storage addressed by slot name.
pub trait SlotStore: Clone + Send + Sync + 'static {
    fn write(&self, slot: &str, bytes: &[u8]) -> Result<(), PersistenceError>;

    /// `None` when the slot does not exist.
    fn read(&self, slot: &str) -> Result<Option<Vec<u8>>, PersistenceError>;

    /// Returns whether the slot existed.
    fn delete(&self, slot: &str) -> Result<bool, PersistenceError>;
}

/// Completion notice of a successful save.
#[derive(Clone, Debug, PartialEq)]
pub struct SaveReceipt {
    pub slot: String,
    pub entries: usize,
    pub bytes: usize,
    pub saved_at: DateTime<Utc>,
}

/// Slots held in memory and shared between clones.
#[derive(Clone, Debug, Default)]
pub struct MemorySlotStore {
    slots: Arc<Mutex<BTreeMap<String, Vec<u8>>>>,
}

impl MemorySlotStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_slots<T>(
        &self,
        f: impl FnOnce(&mut BTreeMap<String, Vec<u8>>) -> T,
    ) -> Result<T, PersistenceError> {
        let mut slots = self
            .slots
            .lock()
            .map_err(|_| PersistenceError::Storage("slot lock poisoned".to_string()))?;
        Ok(f(&mut slots))
    }

    pub fn slot_names(&self) -> Result<Vec<String>, PersistenceError> {
        self.with_slots(|slots| slots.keys().cloned().collect())
    }
}

impl SlotStore for MemorySlotStore {
    fn write(&self, slot: &str, bytes: &[u8]) -> Result<(), PersistenceError> {
        self.with_slots(|slots| {
            slots.insert(slot.to_string(), bytes.to_vec());
        })
    }

    fn read(&self, slot: &str) -> Result<Option<Vec<u8>>, PersistenceError> {
        self.with_slots(|slots| slots.get(slot).cloned())
    }

    fn delete(&self, slot: &str) -> Result<bool, PersistenceError> {
        self.with_slots(|slots| slots.remove(slot).is_some())
    }
}

/// One file per slot inside a directory.
#[derive(Clone, Debug)]
pub struct FileSlotStore {
    dir: PathBuf,
}

impl FileSlotStore {
    /// Use `dir`, creating it if needed.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, PersistenceError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| PersistenceError::Storage(e.to_string()))?;
        Ok(Self { dir })
    }

    fn path(&self, slot: &str) -> PathBuf {
        self.dir.join(format!("{}.slot", slot))
    }
}

impl SlotStore for FileSlotStore {
    fn write(&self, slot: &str, bytes: &[u8]) -> Result<(), PersistenceError> {
        let path = self.path(slot);
        // Write to a temp file, then rename over the slot.
        let temp = path.with_extension("slot.tmp");
        fs::write(&temp, bytes).map_err(|e| PersistenceError::Storage(e.to_string()))?;
        fs::rename(&temp, &path).map_err(|e| PersistenceError::Storage(e.to_string()))
    }

    fn read(&self, slot: &str) -> Result<Option<Vec<u8>>, PersistenceError> {
        match fs::read(self.path(slot)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(PersistenceError::Storage(e.to_string())),
        }
    }

    fn delete(&self, slot: &str) -> Result<bool, PersistenceError> {
        match fs::remove_file(self.path(slot)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(PersistenceError::Storage(e.to_string())),
        }
    }
}

fn logged<T>(slot: &str, result: Result<T, PersistenceError>) -> Result<T, PersistenceError> {
    if let Err(err) = &result {
        tracing::error!(slot = %slot, "{}", err);
    }
    result
}

/// Encode `checkpoint` and write it to its slot.
pub fn save_slot<S: SlotStore>(
    checkpoint: Checkpoint,
    format: SlotFormat,
) -> BoxedEffect<SaveReceipt, PersistenceError, S> {
    from_fn(move |store: &S| {
        let result = checkpoint.encode(format).and_then(|bytes| {
            store.write(&checkpoint.slot, &bytes)?;
            Ok(SaveReceipt {
                slot: checkpoint.slot.clone(),
                entries: checkpoint.entries.len(),
                bytes: bytes.len(),
                saved_at: Utc::now(),
            })
        });
        if let Ok(receipt) = &result {
            tracing::info!(slot = %receipt.slot, bytes = receipt.bytes, "saved slot");
        }
        logged(&checkpoint.slot, result)
    })
    .boxed()
}

/// Read and decode the checkpoint in `slot`, optionally deleting the slot.
pub fn load_slot<S: SlotStore>(
    slot: impl Into<String>,
    delete_after_load: bool,
) -> BoxedEffect<Checkpoint, PersistenceError, S> {
    let slot = slot.into();
    from_fn(move |store: &S| {
        let result = store
            .read(&slot)
            .and_then(|bytes| bytes.ok_or_else(|| PersistenceError::SlotNotFound(slot.clone())))
            .and_then(|bytes| Checkpoint::decode(&bytes))
            .and_then(|checkpoint| {
                if delete_after_load {
                    store.delete(&slot)?;
                }
                Ok(checkpoint)
            });
        logged(&slot, result)
    })
    .boxed()
}

/// Delete `slot`. Deleting a missing slot is not an error.
pub fn delete_slot<S: SlotStore>(slot: impl Into<String>) -> BoxedEffect<bool, PersistenceError, S> {
    let slot = slot.into();
    from_fn(move |store: &S| logged(&slot, store.delete(&slot))).boxed()
}
