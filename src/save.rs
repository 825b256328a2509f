//! Persistence collaborator for the builtin save and load scenes.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{EraError, Result};

/// Summary shown in the slot list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveHeader {
    pub slot: u32,
    pub comment: String,
    pub saved_at: DateTime<Utc>,
}

/// One saved game.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveData {
    pub header: SaveHeader,
    /// Script-owned state, opaque to the host.
    pub data: serde_json::Value,
}

impl SaveData {
    pub fn new(slot: u32, comment: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            header: SaveHeader {
                slot,
                comment: comment.into(),
                saved_at: Utc::now(),
            },
            data,
        }
    }
}

/// Slot-addressed storage of saved games.
pub trait SaveRepository {
    fn save(&mut self, data: &SaveData) -> Result<()>;

    /// Load a slot. Fails when the slot is empty.
    fn load(&mut self, slot: u32) -> Result<SaveData>;

    /// Header of a slot, `None` when the slot is empty.
    fn header(&self, slot: u32) -> Result<Option<SaveHeader>>;

    fn exists(&self, slot: u32) -> bool {
        matches!(self.header(slot), Ok(Some(_)))
    }
}

/// Access to the script-side game state that a save captures.
pub trait StateStore {
    fn snapshot(&self) -> Result<serde_json::Value>;
    fn restore(&self, data: &serde_json::Value) -> Result<()>;
}

/// JSON files in a directory, one per slot.
pub struct FileSaveRepository {
    dir: PathBuf,
}

impl FileSaveRepository {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn slot_path(&self, slot: u32) -> PathBuf {
        self.dir.join(format!("save{slot:02}.json"))
    }

    fn read(&self, slot: u32) -> Result<Option<SaveData>> {
        let path = self.slot_path(slot);
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path)?;
        Ok(Some(serde_json::from_str(&content)?))
    }
}

impl SaveRepository for FileSaveRepository {
    fn save(&mut self, data: &SaveData) -> Result<()> {
        if !self.dir.exists() {
            fs::create_dir_all(&self.dir)?;
        }
        let path = self.slot_path(data.header.slot);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(data)?)?;
        fs::rename(&tmp, &path)?;
        debug!("saved slot {} to {}", data.header.slot, path.display());
        Ok(())
    }

    fn load(&mut self, slot: u32) -> Result<SaveData> {
        self.read(slot)?
            .ok_or_else(|| EraError::Save(format!("slot {slot} is empty")))
    }

    fn header(&self, slot: u32) -> Result<Option<SaveHeader>> {
        Ok(self.read(slot)?.map(|data| data.header))
    }
}

/// Saves kept in memory, for tests and throwaway sessions.
#[derive(Debug, Default)]
pub struct MemorySaveRepository {
    slots: BTreeMap<u32, SaveData>,
}

impl MemorySaveRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SaveRepository for MemorySaveRepository {
    fn save(&mut self, data: &SaveData) -> Result<()> {
        self.slots.insert(data.header.slot, data.clone());
        Ok(())
    }

    fn load(&mut self, slot: u32) -> Result<SaveData> {
        self.slots
            .get(&slot)
            .cloned()
            .ok_or_else(|| EraError::Save(format!("slot {slot} is empty")))
    }

    fn header(&self, slot: u32) -> Result<Option<SaveHeader>> {
        Ok(self.slots.get(&slot).map(|data| data.header.clone()))
    }
}
