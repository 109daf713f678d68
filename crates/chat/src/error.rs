use bubble_storage::{SessionId, StorageError};
use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ChatError {
    #[snafu(display("Please enter a message"))]
    EmptyInput { stage: &'static str },
    #[snafu(display("conversation is still starting, no session to append to on `{stage}`"))]
    NoActiveSession { stage: &'static str },
    #[snafu(display("chat backend rejected `{operation}`: {message}"))]
    BackendRejected {
        stage: &'static str,
        operation: &'static str,
        message: String,
    },
    #[snafu(display("change feed for session '{session_id}' failed: {message}"))]
    Subscription {
        stage: &'static str,
        session_id: SessionId,
        message: String,
    },
    #[snafu(display("prompt service failed: {message}"))]
    PromptService {
        stage: &'static str,
        message: String,
    },
    #[snafu(display("failed to persist active session on `{stage}`: {source}"))]
    PersistSession {
        stage: &'static str,
        source: StorageError,
    },
}

impl ChatError {
    /// Validation failures are user-correctable and shown only briefly.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::EmptyInput { .. } | Self::NoActiveSession { .. })
    }
}

pub type ChatResult<T> = Result<T, ChatError>;
