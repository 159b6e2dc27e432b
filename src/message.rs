//! Message protocol definitions
//!
//! One JSON object per WebSocket text frame:
//! `{"id", "username", "content", "timestamp", "type"}` where `type` is one of
//! `message`, `join`, `leave` or `system`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::generate_message_id;

/// Author name carried by every room-generated notice
pub const SYSTEM_AUTHOR: &str = "System";

/// Kind of chat event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// Text sent by a user
    Message,
    /// A user joined the room
    Join,
    /// A user left the room
    Leave,
    /// Any other server notice
    System,
}

/// A single chat event
///
/// Immutable once built; fields are only readable through accessors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message {
    id: String,
    username: String,
    content: String,
    timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    kind: MessageKind,
}

/// Structured payload as a client may send it
///
/// Everything but `content` may be omitted.
#[derive(Debug, Deserialize)]
struct InboundMessage {
    id: Option<String>,
    username: Option<String>,
    content: String,
    timestamp: Option<DateTime<Utc>>,
    #[serde(rename = "type")]
    kind: Option<MessageKind>,
}

impl Message {
    /// Create a user message with a fresh id and the current time
    pub fn chat(username: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: generate_message_id(),
            username: username.into(),
            content: content.into(),
            timestamp: Utc::now(),
            kind: MessageKind::Message,
        }
    }

    /// Create the notice broadcast when `username` joins
    pub fn join(username: &str) -> Self {
        Self::notice(MessageKind::Join, format!("{username} joined"), Utc::now())
    }

    /// Create the notice broadcast when `username` leaves
    pub fn leave(username: &str) -> Self {
        Self::notice(MessageKind::Leave, format!("{username} left"), Utc::now())
    }

    /// Create a generic system notice
    pub fn system(content: impl Into<String>) -> Self {
        Self::notice(MessageKind::System, content.into(), Utc::now())
    }

    // Non-user kinds never carry an id and are always authored by "System".
    fn notice(kind: MessageKind, content: String, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: String::new(),
            username: SYSTEM_AUTHOR.to_string(),
            content,
            timestamp,
            kind,
        }
    }

    /// Parse a structured frame sent by a client
    ///
    /// Fields present in the payload are kept as sent. A missing or empty
    /// `id` or `username` is filled with a fresh id and `sender`, a missing
    /// `timestamp` with the current time and a missing `type` with `message`.
    /// Returns an error when the frame is not a JSON object with a string
    /// `content`; callers fall back to [`Message::chat`] with the raw text.
    pub fn from_wire(raw: &str, sender: &str) -> Result<Self, serde_json::Error> {
        let inbound: InboundMessage = serde_json::from_str(raw)?;
        let timestamp = inbound.timestamp.unwrap_or_else(Utc::now);

        let message = match inbound.kind.unwrap_or(MessageKind::Message) {
            MessageKind::Message => Self {
                id: inbound
                    .id
                    .filter(|id| !id.is_empty())
                    .unwrap_or_else(generate_message_id),
                username: inbound
                    .username
                    .filter(|name| !name.is_empty())
                    .unwrap_or_else(|| sender.to_string()),
                content: inbound.content,
                timestamp,
                kind: MessageKind::Message,
            },
            kind => Self::notice(kind, inbound.content, timestamp),
        };

        Ok(message)
    }

    /// Serialize into the text frame sent to clients
    pub fn to_frame(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn kind(&self) -> MessageKind {
        self.kind
    }
}
