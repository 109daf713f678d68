use std::time::{SystemTime, UNIX_EPOCH};

use bubble_storage::SessionId;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

const NANOS_PER_SECOND: u32 = 1_000_000_000;

/// Chat speaker role as exchanged with the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Human,
    Ai,
    System,
}

/// Message kind; anything the widget does not know is kept as `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    Text,
    QuickReply,
    #[serde(other)]
    Other,
}

/// Message body: optional text plus whatever structured fields the backend attached.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Payload {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            fields: Map::new(),
        }
    }
}

/// Seconds plus sub-second precision, independent of the remote encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp {
    pub seconds: i64,
    pub nanoseconds: u32,
}

impl Timestamp {
    pub fn new(seconds: i64, nanoseconds: u32) -> Option<Self> {
        (nanoseconds < NANOS_PER_SECOND).then_some(Self {
            seconds,
            nanoseconds,
        })
    }

    pub fn now() -> Self {
        let elapsed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Self {
            seconds: elapsed.as_secs() as i64,
            nanoseconds: elapsed.subsec_nanos(),
        }
    }

    /// Normalizes a remote timestamp.
    ///
    /// Document stores serialize timestamps either as `{seconds, nanoseconds}` or with
    /// underscore-prefixed keys; a missing sub-second part reads as zero.
    pub fn from_remote(value: &Value) -> Option<Self> {
        let object = value.as_object()?;
        let seconds = object
            .get("seconds")
            .or_else(|| object.get("_seconds"))
            .and_then(Value::as_i64)?;
        let nanoseconds = match object
            .get("nanoseconds")
            .or_else(|| object.get("_nanoseconds"))
        {
            Some(raw) => u32::try_from(raw.as_u64()?).ok()?,
            None => 0,
        };
        Self::new(seconds, nanoseconds)
    }
}

/// One conversation entry. Owned by exactly one session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub message_type: Option<MessageType>,
    #[serde(default)]
    pub payload: Payload,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<Timestamp>,
}

impl Message {
    /// Creates a locally authored user message stamped with the current time.
    pub fn human(message_type: MessageType, text: impl Into<String>) -> Self {
        Self {
            role: Role::Human,
            message_type: Some(message_type),
            payload: Payload::text(text),
            timestamp: Some(Timestamp::now()),
        }
    }

    pub fn text(&self) -> Option<&str> {
        self.payload.text.as_deref()
    }

    /// SYSTEM messages are kept in the store but never rendered.
    pub fn is_visible(&self) -> bool {
        self.role != Role::System
    }
}

/// The active conversation as held by the client.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatSession {
    /// Backend-assigned id; `None` until the create call succeeds.
    pub id: Option<SessionId>,
    pub messages: Vec<Message>,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn timestamp_accepts_both_remote_encodings() {
        assert_eq!(
            Timestamp::from_remote(&json!({"seconds": 10, "nanoseconds": 5})),
            Timestamp::new(10, 5)
        );
        assert_eq!(
            Timestamp::from_remote(&json!({"_seconds": 10, "_nanoseconds": 5})),
            Timestamp::new(10, 5)
        );
        assert_eq!(
            Timestamp::from_remote(&json!({"seconds": 10})),
            Timestamp::new(10, 0)
        );
    }

    #[test]
    fn timestamp_rejects_garbage() {
        assert_eq!(Timestamp::from_remote(&json!(null)), None);
        assert_eq!(Timestamp::from_remote(&json!({"nanoseconds": 5})), None);
        assert_eq!(
            Timestamp::from_remote(&json!({"seconds": 1, "nanoseconds": 2_000_000_000u64})),
            None
        );
        assert_eq!(
            Timestamp::from_remote(&json!({"seconds": 1, "nanoseconds": -3})),
            None
        );
    }

    #[test]
    fn message_wire_shape_uses_backend_names() {
        let message = Message {
            role: Role::Human,
            message_type: Some(MessageType::QuickReply),
            payload: Payload::text("yes"),
            timestamp: None,
        };
        assert_eq!(
            serde_json::to_value(&message).unwrap(),
            json!({"role": "HUMAN", "type": "QUICK_REPLY", "payload": {"text": "yes"}})
        );

        let decoded: Message = serde_json::from_value(json!({
            "role": "AI",
            "type": "CAROUSEL",
            "payload": {"text": "hi", "options": ["a", "b"]}
        }))
        .unwrap();
        assert_eq!(decoded.role, Role::Ai);
        assert_eq!(decoded.message_type, Some(MessageType::Other));
        assert_eq!(decoded.text(), Some("hi"));
        assert_eq!(decoded.payload.fields["options"], json!(["a", "b"]));
    }
}
