//! Versioned, checksummed save files.
//!
//! A save is self-describing: format version, timestamp, the state body,
//! and a SHA-256 checksum over the body's canonical JSON. Loading verifies
//! the checksum before anything else, then walks a migration chain keyed by
//! the source version. Writes go through a temp-file-then-rename so a crash
//! never leaves a torn save behind.

use crate::memory::NarrativeMemory;
use crate::player::Player;
use crate::quests::QuestLog;
use crate::world::WorldState;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::path::Path;
use thiserror::Error;
use tokio::fs;

/// Current save format version.
pub const SAVE_VERSION: u32 = 2;

/// Errors from persistence operations. Everything here is fatal for the
/// load in question; the caller refuses the file with a diagnostic.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unsupported save version {0}")]
    UnsupportedVersion(u32),

    #[error("Checksum mismatch: save file is corrupt")]
    ChecksumMismatch,

    #[error("Malformed save file: {0}")]
    Malformed(String),
}

/// Everything a save carries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveBody {
    #[serde(default)]
    pub turn: u64,
    pub world: WorldState,
    pub player: Player,
    pub memory: NarrativeMemory,
    #[serde(default)]
    pub quests: QuestLog,
}

/// A versioned save record.
#[derive(Debug, Serialize, Deserialize)]
pub struct SavedGame {
    pub version: u32,
    pub saved_at: String,
    /// Minimal-emergency marker: the loader restores reduced fidelity.
    #[serde(default)]
    pub emergency: bool,
    pub body: SaveBody,
    pub checksum: String,
}

impl SavedGame {
    /// Wrap a state body into a checksummed save record.
    pub fn new(body: SaveBody) -> Result<Self, PersistError> {
        let checksum = checksum_of(&body)?;
        Ok(Self {
            version: SAVE_VERSION,
            saved_at: epoch_now(),
            emergency: false,
            body,
            checksum,
        })
    }

    /// An emergency save: same record, reduced-fidelity marker set.
    pub fn emergency(body: SaveBody) -> Result<Self, PersistError> {
        let mut saved = Self::new(body)?;
        saved.emergency = true;
        Ok(saved)
    }

    /// Write the save, temp-file-then-rename.
    pub async fn save_to(&self, path: impl AsRef<Path>) -> Result<(), PersistError> {
        let path = path.as_ref();
        let value = serde_json::to_value(self)?;
        let content = serde_json::to_string_pretty(&value)?;

        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = std::path::PathBuf::from(tmp);

        fs::write(&tmp, content).await?;
        fs::rename(&tmp, path).await?;
        Ok(())
    }

    /// Load and verify a save, migrating older versions forward.
    pub async fn load_from(path: impl AsRef<Path>) -> Result<Self, PersistError> {
        let content = fs::read_to_string(path).await?;
        let mut value: Value = serde_json::from_str(&content)?;

        let version = value
            .get("version")
            .and_then(Value::as_u64)
            .ok_or_else(|| PersistError::Malformed("missing version".into()))? as u32;
        if version > SAVE_VERSION || version == 0 {
            return Err(PersistError::UnsupportedVersion(version));
        }

        // The checksum covers the body exactly as it was written, so it is
        // verified against the stored form before any migration touches it.
        let stored = value
            .get("checksum")
            .and_then(Value::as_str)
            .ok_or_else(|| PersistError::Malformed("missing checksum".into()))?
            .to_string();
        let body_value = value
            .get("body")
            .cloned()
            .ok_or_else(|| PersistError::Malformed("missing body".into()))?;
        if checksum_of_value(&body_value) != stored {
            return Err(PersistError::ChecksumMismatch);
        }

        for from in version..SAVE_VERSION {
            migrate(&mut value, from)?;
        }

        Ok(serde_json::from_value(value)?)
    }
}

/// One migration step, keyed by source version.
fn migrate(value: &mut Value, from: u32) -> Result<(), PersistError> {
    match from {
        // v1 predates the quest log and the turn counter.
        1 => {
            let body = value
                .get_mut("body")
                .and_then(Value::as_object_mut)
                .ok_or_else(|| PersistError::Malformed("missing body".into()))?;
            body.entry("quests").or_insert_with(|| json!({ "quests": [] }));
            body.entry("turn").or_insert(json!(0));
            value["version"] = json!(SAVE_VERSION);
            // The body changed; the record's checksum must follow it.
            let body_value = value["body"].clone();
            value["checksum"] = json!(checksum_of_value(&body_value));
            Ok(())
        }
        other => Err(PersistError::UnsupportedVersion(other)),
    }
}

/// Canonical checksum of a body: SHA-256 over its JSON value rendering.
/// `serde_json::Value` objects iterate in sorted key order, which makes the
/// rendering stable across processes.
fn checksum_of(body: &SaveBody) -> Result<String, PersistError> {
    let value = serde_json::to_value(body)?;
    Ok(checksum_of_value(&value))
}

fn checksum_of_value(value: &Value) -> String {
    let rendered = value.to_string();
    let digest = Sha256::digest(rendered.as_bytes());
    let mut out = String::with_capacity(64);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

/// Seconds since the epoch, as a string. Good enough for save metadata.
fn epoch_now() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    format!("{}", now.as_secs())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryConfig;
    use crate::player::{Player, PlayerClass};
    use crate::world::Coordinate;
    use tempfile::TempDir;

    fn body() -> SaveBody {
        let mut world = WorldState::new("persist-test");
        world.set_position(Coordinate::ORIGIN, 1);
        SaveBody {
            turn: 7,
            world,
            player: Player::new("Hero", PlayerClass::Warrior),
            memory: NarrativeMemory::new(MemoryConfig::default()),
            quests: QuestLog::new(),
        }
    }

    #[tokio::test]
    async fn test_save_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("slot1.json");

        let saved = SavedGame::new(body()).unwrap();
        saved.save_to(&path).await.unwrap();

        let loaded = SavedGame::load_from(&path).await.unwrap();
        assert_eq!(loaded.version, SAVE_VERSION);
        assert_eq!(loaded.body.turn, 7);
        assert_eq!(loaded.body.player.name, "Hero");
        assert_eq!(
            loaded.body.world.current_position(),
            Coordinate::ORIGIN
        );
        assert!(!loaded.emergency);
        // No stray temp file left behind.
        assert!(!dir.path().join("slot1.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_tampered_save_is_refused() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("slot1.json");
        SavedGame::new(body()).unwrap().save_to(&path).await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let tampered = content.replace("\"Hero\"", "\"Villain\"");
        assert_ne!(content, tampered);
        std::fs::write(&path, tampered).unwrap();

        assert!(matches!(
            SavedGame::load_from(&path).await,
            Err(PersistError::ChecksumMismatch)
        ));
    }

    #[tokio::test]
    async fn test_future_version_is_refused() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("slot1.json");
        let mut value = serde_json::to_value(SavedGame::new(body()).unwrap()).unwrap();
        value["version"] = json!(99);
        std::fs::write(&path, value.to_string()).unwrap();

        assert!(matches!(
            SavedGame::load_from(&path).await,
            Err(PersistError::UnsupportedVersion(99))
        ));
    }

    #[tokio::test]
    async fn test_v1_migration_chain() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("old.json");

        // A v1 save has no quest log and no turn counter.
        let mut value = serde_json::to_value(SavedGame::new(body()).unwrap()).unwrap();
        value["version"] = json!(1);
        let obj = value["body"].as_object_mut().unwrap();
        obj.remove("quests");
        obj.remove("turn");
        let body_value = value["body"].clone();
        value["checksum"] = json!(checksum_of_value(&body_value));
        std::fs::write(&path, value.to_string()).unwrap();

        let loaded = SavedGame::load_from(&path).await.unwrap();
        assert_eq!(loaded.version, SAVE_VERSION);
        assert_eq!(loaded.body.turn, 0);
        assert!(loaded.body.quests.quests().is_empty());
    }

    #[tokio::test]
    async fn test_emergency_marker_survives_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("panic.json");
        SavedGame::emergency(body())
            .unwrap()
            .save_to(&path)
            .await
            .unwrap();
        let loaded = SavedGame::load_from(&path).await.unwrap();
        assert!(loaded.emergency);
    }

    #[test]
    fn test_checksum_is_stable_across_serialization_cycles() {
        let body = body();
        let a = checksum_of(&body).unwrap();
        let round_tripped: SaveBody =
            serde_json::from_value(serde_json::to_value(&body).unwrap()).unwrap();
        let b = checksum_of(&round_tripped).unwrap();
        assert_eq!(a, b);
    }
}
