//! Session persistence.
//!
//! A session is saved as a versioned JSON snapshot of the character and the
//! minion roster. Missing fields load as defaults, older snapshots are
//! migrated forward and everything is sanitized on the way in, so a
//! hand-edited or truncated file still produces a usable state.

use crate::character::{default_invocations, Character};
use crate::minions::Minion;
use crate::validation::{sanitize_character, sanitize_minion, validate_session_number};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tracing::{debug, warn};

/// Errors from persistence operations.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Snapshot version {found} is newer than supported version {supported}")]
    UnsupportedVersion { found: u32, supported: u32 },
}

/// Current snapshot version.
pub const CURRENT_MIGRATION_VERSION: u32 = 3;

fn legacy_version() -> u32 {
    1
}

/// Everything needed to resume a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    /// Snapshots written before versioning existed have no version field.
    #[serde(default = "legacy_version")]
    pub migration_version: u32,

    #[serde(default = "legacy_version")]
    pub session_number: u32,

    /// Milliseconds since the Unix epoch.
    #[serde(default)]
    pub saved_at: u64,

    #[serde(default)]
    pub character: Character,

    #[serde(default)]
    pub minions: Vec<Minion>,
}

impl SessionSnapshot {
    pub fn new(session_number: u32, character: Character, minions: Vec<Minion>) -> Self {
        Self {
            migration_version: CURRENT_MIGRATION_VERSION,
            session_number,
            saved_at: crate::combat::now_millis(),
            character,
            minions,
        }
    }

    pub fn to_json(&self) -> Result<String, PersistError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse, migrate and sanitize a snapshot.
    pub fn from_json(json: &str) -> Result<Self, PersistError> {
        let raw: Self = serde_json::from_str(json)?;
        migrate(raw)
    }

    /// Save to a JSON file.
    pub async fn save_json(&self, path: impl AsRef<Path>) -> Result<(), PersistError> {
        let content = self.to_json()?;
        fs::write(path, content).await?;
        Ok(())
    }

    /// Load from a JSON file.
    pub async fn load_json(path: impl AsRef<Path>) -> Result<Self, PersistError> {
        let content = fs::read_to_string(path).await?;
        Self::from_json(&content)
    }
}

/// Bring `snapshot` up to [`CURRENT_MIGRATION_VERSION`] and sanitize it.
pub fn migrate(mut snapshot: SessionSnapshot) -> Result<SessionSnapshot, PersistError> {
    if snapshot.migration_version > CURRENT_MIGRATION_VERSION {
        return Err(PersistError::UnsupportedVersion {
            found: snapshot.migration_version,
            supported: CURRENT_MIGRATION_VERSION,
        });
    }

    if snapshot.migration_version < 2 {
        debug!("migrating snapshot v1 -> v2");
        if snapshot.character.invocations.is_empty() {
            snapshot.character.invocations = default_invocations();
        }
        snapshot.migration_version = 2;
    }

    if snapshot.migration_version < 3 {
        debug!("migrating snapshot v2 -> v3");
        let mut seen = HashSet::new();
        snapshot.character.attunement = snapshot
            .character
            .attunement
            .into_iter()
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty() && seen.insert(name.clone()))
            .collect();
        snapshot.migration_version = 3;
    }

    snapshot.session_number =
        validate_session_number(i64::from(snapshot.session_number)).into_value();
    snapshot.character = sanitize_character(snapshot.character);

    let mut ids = HashSet::new();
    snapshot.minions = snapshot
        .minions
        .into_iter()
        .filter(|m| {
            let fresh = ids.insert(m.id);
            if !fresh {
                warn!(id = %m.id, "dropping minion with duplicate id");
            }
            fresh
        })
        .map(sanitize_minion)
        .collect();

    Ok(snapshot)
}

/// Receives a snapshot after every committed transition.
///
/// Implementations own batching and debouncing. A failure is logged by the
/// session and otherwise ignored.
pub trait PersistenceSink: Send {
    fn persist(&mut self, snapshot: &SessionSnapshot) -> Result<(), PersistError>;
}

/// Writes every snapshot to one JSON file, synchronously.
#[derive(Debug, Clone)]
pub struct JsonFileSink {
    path: PathBuf,
}

impl JsonFileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PersistenceSink for JsonFileSink {
    fn persist(&mut self, snapshot: &SessionSnapshot) -> Result<(), PersistError> {
        std::fs::write(&self.path, snapshot.to_json()?)?;
        Ok(())
    }
}

/// File name for a session save.
pub fn session_save_path(dir: impl AsRef<Path>, character_name: &str, session_number: u32) -> PathBuf {
    let sanitized = character_name
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect::<String>();
    dir.as_ref()
        .join(format!("{sanitized}_session_{session_number}.json"))
}
