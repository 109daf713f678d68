//! Headless chat widget core: session state, live sync, dispatch and presentation.
pub mod context;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod memory;
pub mod message;
pub mod presentation;
pub mod prompts;
pub mod remote;
pub mod runtime;
pub mod settings;
pub mod store;
pub mod sync;

pub use context::SessionContext;
pub use dispatch::{DispatchDelay, DispatchTimings, MessageDispatcher, RemoteCall, ScheduledCall};
pub use error::{ChatError, ChatResult};
pub use events::{LoopEvent, SessionGeneration, UserAction};
pub use memory::{MemoryChangeFeed, MemoryChatBackend, MemoryPromptService};
pub use message::{ChatSession, Message, MessageType, Payload, Role, Timestamp};
pub use presentation::{ChatViewModel, Panel, ScrollMetrics};
pub use remote::{
    ChangeEvent, ChangeFeed, ChangeKind, ChangeStream, ChatBackend, PromptService, UserProfile,
};
pub use runtime::{ChatHandle, ChatRuntime, ChatServices};
pub use settings::{ChatSettings, SettingsError, SettingsStore};
pub use store::{ErrorKind, Flag, SessionStore};
pub use sync::{RemoteSyncListener, SyncOutcome};
