//! Local persisted state for the chat widget.
pub mod active_session;
pub mod error;
pub mod file;
pub mod ids;

pub use active_session::{
    ACTIVE_SESSION_KEY, ActiveSessionStore, JsonFileActiveSessionStore, LOCAL_STATE_FILE_NAME,
    MemoryActiveSessionStore,
};
pub use error::{StorageError, StorageResult};
pub use file::write_json_atomic;
pub use ids::{SessionId, UserId};
