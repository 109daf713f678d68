use std::fmt;
use std::future::Future;
use std::pin::Pin;

use bubble_storage::{SessionId, UserId};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::mpsc;

use crate::error::ChatResult;
use crate::message::Message;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Conversation kind sent on session creation.
pub const CHAT_SESSION_TYPE: &str = "chat";

/// Profile of the signed-in user; extra attributes feed prompt generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: UserId,
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

impl Default for UserProfile {
    fn default() -> Self {
        Self {
            id: UserId::from_static("local-user"),
            full_name: String::new(),
            email: String::new(),
            attributes: Map::new(),
        }
    }
}

/// User fields the backend attaches to a new session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionUser {
    pub id: UserId,
    pub full_name: String,
    pub email: String,
}

impl From<&UserProfile> for SessionUser {
    fn from(profile: &UserProfile) -> Self {
        Self {
            id: profile.id.clone(),
            full_name: profile.full_name.clone(),
            email: profile.email.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateSessionRequest {
    pub user: SessionUser,
    #[serde(rename = "type")]
    pub kind: String,
    pub message: Message,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Created,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteSession {
    pub id: SessionId,
    #[serde(default)]
    pub messages: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateSessionResponse {
    pub status: SessionStatus,
    pub data: RemoteSession,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppendMessageRequest {
    pub message: Message,
    pub session_id: SessionId,
}

/// REST-like chat backend.
pub trait ChatBackend: Send + Sync {
    fn create_session(
        &self,
        request: CreateSessionRequest,
    ) -> BoxFuture<'_, ChatResult<CreateSessionResponse>>;
    fn append_message(&self, request: AppendMessageRequest) -> BoxFuture<'_, ChatResult<()>>;
}

/// Generates conversation starters for a user.
///
/// The returned text holds one suggestion per line, possibly numbered and decorated;
/// see [`crate::prompts::parse_suggestions`].
pub trait PromptService: Send + Sync {
    fn generate_prompts<'a>(&'a self, profile: &'a UserProfile) -> BoxFuture<'a, ChatResult<String>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Added,
    Modified,
    Removed,
}

/// One change notification carrying the full document snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub document: Value,
}

/// Subscription-level failure reported by the feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedError {
    pub message: String,
}

impl fmt::Display for FeedError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.message)
    }
}

pub type FeedItem = Result<ChangeEvent, FeedError>;

/// Releases a feed subscription exactly once, on [`SubscriptionHandle::unsubscribe`] or drop.
pub struct SubscriptionHandle {
    unsubscribe: Option<Box<dyn FnOnce() + Send>>,
}

impl SubscriptionHandle {
    pub fn new(unsubscribe: impl FnOnce() + Send + 'static) -> Self {
        Self {
            unsubscribe: Some(Box::new(unsubscribe)),
        }
    }

    pub fn unsubscribe(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(unsubscribe) = self.unsubscribe.take() {
            unsubscribe();
        }
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for SubscriptionHandle {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("SubscriptionHandle")
            .field("released", &self.unsubscribe.is_none())
            .finish()
    }
}

/// Push stream of change notifications for one session document.
pub struct ChangeStream {
    events: mpsc::UnboundedReceiver<FeedItem>,
    handle: SubscriptionHandle,
}

impl ChangeStream {
    pub fn new(events: mpsc::UnboundedReceiver<FeedItem>, handle: SubscriptionHandle) -> Self {
        Self { events, handle }
    }

    pub async fn recv(&mut self) -> Option<FeedItem> {
        self.events.recv().await
    }

    /// Splits the receiving half from the unsubscribe handle so they can live apart.
    pub fn into_parts(self) -> (mpsc::UnboundedReceiver<FeedItem>, SubscriptionHandle) {
        (self.events, self.handle)
    }
}

/// Real-time document store.
pub trait ChangeFeed: Send + Sync {
    fn subscribe(&self, session_id: &SessionId) -> ChatResult<ChangeStream>;
}
