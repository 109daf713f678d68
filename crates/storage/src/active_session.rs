use std::path::{Path, PathBuf};
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use serde::{Deserialize, Serialize};
use snafu::ResultExt;

use super::error::{ParseStateSnafu, ReadFileSnafu, StorageResult};
use super::file::write_json_atomic;
use super::ids::SessionId;

/// Key under which the active session identifier is persisted.
pub const ACTIVE_SESSION_KEY: &str = "sessionId";
pub const LOCAL_STATE_FILE_NAME: &str = "local-state.json";

/// Process-wide slot for the one session the widget is currently attached to.
pub trait ActiveSessionStore: Send + Sync {
    fn load(&self) -> StorageResult<Option<SessionId>>;
    fn store(&self, session_id: &SessionId) -> StorageResult<()>;
    fn clear(&self) -> StorageResult<()>;
}

#[derive(Default)]
pub struct MemoryActiveSessionStore {
    slot: ArcSwapOption<SessionId>,
}

impl MemoryActiveSessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ActiveSessionStore for MemoryActiveSessionStore {
    fn load(&self) -> StorageResult<Option<SessionId>> {
        Ok(self.slot.load_full().map(|id| id.as_ref().clone()))
    }

    fn store(&self, session_id: &SessionId) -> StorageResult<()> {
        self.slot.store(Some(Arc::new(session_id.clone())));
        Ok(())
    }

    fn clear(&self) -> StorageResult<()> {
        self.slot.store(None);
        Ok(())
    }
}

/// On-disk shape of the local state file. Unknown keys written by other
/// tools are carried through untouched.
#[derive(Debug, Default, Serialize, Deserialize)]
struct LocalStateFile {
    #[serde(rename = "sessionId", default, skip_serializing_if = "Option::is_none")]
    session_id: Option<SessionId>,
    #[serde(flatten)]
    other: serde_json::Map<String, serde_json::Value>,
}

/// JSON-file backed store. Reads are served from an in-memory copy; every
/// write replaces the file through a temporary sibling.
pub struct JsonFileActiveSessionStore {
    path: PathBuf,
    cached: ArcSwapOption<SessionId>,
}

impl JsonFileActiveSessionStore {
    pub fn open(path: impl Into<PathBuf>) -> StorageResult<Self> {
        let path = path.into();
        let state = Self::read_state(&path)?;
        Ok(Self {
            cached: ArcSwapOption::from(state.session_id.map(Arc::new)),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_state(path: &Path) -> StorageResult<LocalStateFile> {
        if !path.exists() {
            tracing::debug!("local state file not found at {:?}, starting empty", path);
            return Ok(LocalStateFile::default());
        }

        let content = std::fs::read_to_string(path).context(ReadFileSnafu {
            stage: "read-local-state",
            path: path.to_path_buf(),
        })?;
        if content.trim().is_empty() {
            return Ok(LocalStateFile::default());
        }

        serde_json::from_str(&content).context(ParseStateSnafu {
            stage: "parse-local-state",
            path: path.to_path_buf(),
        })
    }

    fn write_session_id(&self, session_id: Option<&SessionId>) -> StorageResult<()> {
        // Re-read so keys owned by other writers survive our update.
        let mut state = match Self::read_state(&self.path) {
            Ok(state) => state,
            Err(error) => {
                tracing::warn!("discarding unreadable local state at {:?}: {error}", self.path);
                LocalStateFile::default()
            }
        };
        state.session_id = session_id.cloned();

        write_json_atomic(&self.path, &state)?;
        self.cached.store(session_id.cloned().map(Arc::new));
        Ok(())
    }
}

impl ActiveSessionStore for JsonFileActiveSessionStore {
    fn load(&self) -> StorageResult<Option<SessionId>> {
        Ok(self.cached.load_full().map(|id| id.as_ref().clone()))
    }

    fn store(&self, session_id: &SessionId) -> StorageResult<()> {
        self.write_session_id(Some(session_id))?;
        tracing::debug!(session_id = %session_id, "persisted active session");
        Ok(())
    }

    fn clear(&self) -> StorageResult<()> {
        if self.cached.load().is_none() && !self.path.exists() {
            return Ok(());
        }
        self.write_session_id(None)
    }
}
