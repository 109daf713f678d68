use std::sync::Arc;

use bubble_storage::{ActiveSessionStore, SessionId};
use snafu::ResultExt;

use crate::error::{ChatResult, PersistSessionSnafu};

/// Explicit handle on the persisted "active session" slot.
///
/// Handed to the runtime instead of reading ambient storage, so the lifecycle
/// (set on creation, cleared on reset or teardown) is visible at the call sites.
#[derive(Clone)]
pub struct SessionContext {
    store: Arc<dyn ActiveSessionStore>,
}

impl SessionContext {
    pub fn new(store: Arc<dyn ActiveSessionStore>) -> Self {
        Self { store }
    }

    pub fn activate(&self, session_id: &SessionId) -> ChatResult<()> {
        self.store.store(session_id).context(PersistSessionSnafu {
            stage: "activate-session-context",
        })
    }

    pub fn clear(&self) -> ChatResult<()> {
        self.store.clear().context(PersistSessionSnafu {
            stage: "clear-session-context",
        })
    }

    pub fn active(&self) -> ChatResult<Option<SessionId>> {
        self.store.load().context(PersistSessionSnafu {
            stage: "load-session-context",
        })
    }
}
