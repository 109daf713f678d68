use std::fmt;
use std::sync::Arc;

use bubble_storage::SessionId;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::ChatResult;
use crate::events::{LoopEvent, SessionGeneration, SubscriptionTag};
use crate::message::{Message, MessageType, Payload, Role, Timestamp};
use crate::remote::{ChangeEvent, ChangeFeed, ChangeKind, SubscriptionHandle};
use crate::store::{Flag, SessionStore};

/// Reason a change notification could not be folded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MalformedChange {
    MissingMessages,
    EmptyMessages,
    MissingTimestamp,
    UndecodableMessage(String),
}

impl fmt::Display for MalformedChange {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingMessages => formatter.write_str("document has no message list"),
            Self::EmptyMessages => formatter.write_str("document message list is empty"),
            Self::MissingTimestamp => formatter.write_str("last message has no usable timestamp"),
            Self::UndecodableMessage(details) => {
                write!(formatter, "last message cannot be decoded: {details}")
            }
        }
    }
}

/// What folding one change did to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    Appended,
    IgnoredKind(ChangeKind),
    IgnoredRole(Role),
    /// Same reply re-emitted by a metadata-only document update.
    Duplicate,
    Malformed(MalformedChange),
}

/// Decodes the last message of a session document, normalizing its timestamp.
pub fn decode_last_message(document: &Value) -> Result<Message, MalformedChange> {
    let messages = document
        .get("messages")
        .and_then(Value::as_array)
        .ok_or(MalformedChange::MissingMessages)?;
    let last = messages.last().ok_or(MalformedChange::EmptyMessages)?;

    let timestamp = last
        .get("timestamp")
        .and_then(Timestamp::from_remote)
        .ok_or(MalformedChange::MissingTimestamp)?;

    let role = last
        .get("role")
        .cloned()
        .ok_or_else(|| MalformedChange::UndecodableMessage("missing role".to_string()))
        .and_then(|raw| {
            serde_json::from_value::<Role>(raw)
                .map_err(|error| MalformedChange::UndecodableMessage(error.to_string()))
        })?;
    let message_type = match last.get("type") {
        Some(raw) => serde_json::from_value::<MessageType>(raw.clone()).ok(),
        None => None,
    };
    let payload = match last.get("payload") {
        Some(raw) => serde_json::from_value::<Payload>(raw.clone())
            .map_err(|error| MalformedChange::UndecodableMessage(error.to_string()))?,
        None => Payload::default(),
    };

    Ok(Message {
        role,
        message_type,
        payload,
        timestamp: Some(timestamp),
    })
}

/// Folds one change notification into the store.
///
/// Only `modified` documents whose newest message came from the assistant append
/// anything; that append also clears the typing indicator.
pub fn fold_change(store: &mut SessionStore, event: &ChangeEvent) -> SyncOutcome {
    if event.kind != ChangeKind::Modified {
        return SyncOutcome::IgnoredKind(event.kind);
    }

    let message = match decode_last_message(&event.document) {
        Ok(message) => message,
        Err(reason) => return SyncOutcome::Malformed(reason),
    };

    if message.role != Role::Ai {
        return SyncOutcome::IgnoredRole(message.role);
    }

    let already_folded = store
        .messages()
        .iter()
        .rev()
        .find(|existing| existing.role == Role::Ai)
        .is_some_and(|existing| existing.timestamp == message.timestamp);
    if already_folded {
        return SyncOutcome::Duplicate;
    }

    store.append(message);
    store.set_flag(Flag::Typing, false);
    SyncOutcome::Appended
}

struct ActiveSubscription {
    session_id: SessionId,
    tag: SubscriptionTag,
    handle: Option<SubscriptionHandle>,
    forwarder: JoinHandle<()>,
}

impl Drop for ActiveSubscription {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.unsubscribe();
        }
        self.forwarder.abort();
    }
}

/// Owns the single change-feed subscription of the active session.
pub struct RemoteSyncListener {
    feed: Arc<dyn ChangeFeed>,
    active: Option<ActiveSubscription>,
    next_serial: u64,
}

impl RemoteSyncListener {
    pub fn new(feed: Arc<dyn ChangeFeed>) -> Self {
        Self {
            feed,
            active: None,
            next_serial: 1,
        }
    }

    /// Subscribes to `session_id`, forwarding items into `sink`.
    ///
    /// Returns `false` when that id is already subscribed in the same generation.
    /// Any other live subscription is released first.
    pub fn start(
        &mut self,
        session_id: &SessionId,
        generation: SessionGeneration,
        sink: &mpsc::UnboundedSender<LoopEvent>,
    ) -> ChatResult<bool> {
        if let Some(active) = &self.active
            && active.session_id == *session_id
            && active.tag.generation == generation
        {
            tracing::debug!(session_id = %session_id, "change feed already subscribed");
            return Ok(false);
        }

        self.stop();

        let (mut events, handle) = self.feed.subscribe(session_id)?.into_parts();
        let tag = SubscriptionTag {
            generation,
            serial: self.next_serial,
        };
        self.next_serial = self.next_serial.wrapping_add(1);

        let sink = sink.clone();
        let forwarder = tokio::spawn(async move {
            while let Some(item) = events.recv().await {
                if sink.send(LoopEvent::Feed { tag, item }).is_err() {
                    return;
                }
            }
            let _ = sink.send(LoopEvent::FeedClosed { tag });
        });

        tracing::info!(session_id = %session_id, serial = tag.serial, "subscribed to change feed");
        self.active = Some(ActiveSubscription {
            session_id: session_id.clone(),
            tag,
            handle: Some(handle),
            forwarder,
        });
        Ok(true)
    }

    /// Releases the live subscription, if any.
    pub fn stop(&mut self) {
        if let Some(active) = self.active.take() {
            tracing::info!(session_id = %active.session_id, "released change feed subscription");
        }
    }

    pub fn is_current(&self, tag: SubscriptionTag) -> bool {
        self.active.as_ref().is_some_and(|active| active.tag == tag)
    }

    pub fn session_id(&self) -> Option<&SessionId> {
        self.active.as_ref().map(|active| &active.session_id)
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }
}

impl Drop for RemoteSyncListener {
    fn drop(&mut self) {
        self.stop();
    }
}
