//! Protocol message types for chat connections.

use chrono::{DateTime, Utc};
use consult_core::{MessageId, MessageKind, Profile, SessionId, StoredMessage, UserId};
use serde::{Deserialize, Serialize};

/// Frame sent by a participant.
///
/// Every field is optional on the wire. `is_typing = true` marks an
/// ephemeral indicator that is fanned out but never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundFrame {
    #[serde(default)]
    pub is_typing: bool,

    /// 1 = text, 2 = attachment, 3 = typing. 0 (absent) is read as text.
    #[serde(default)]
    pub message_type: u8,

    #[serde(default)]
    pub message: String,

    #[serde(default)]
    pub attachment: String,
}

impl InboundFrame {
    /// Creates a text message frame.
    pub fn text(message: impl Into<String>) -> Self {
        Self {
            message_type: MessageKind::Text.code(),
            message: message.into(),
            ..Self::default()
        }
    }

    /// Creates an attachment frame with an optional caption.
    pub fn attachment(reference: impl Into<String>, caption: impl Into<String>) -> Self {
        Self {
            message_type: MessageKind::Attachment.code(),
            message: caption.into(),
            attachment: reference.into(),
            ..Self::default()
        }
    }

    /// Creates a typing indicator frame.
    pub fn typing() -> Self {
        Self {
            is_typing: true,
            ..Self::default()
        }
    }
}

/// A persisted message as delivered to the other participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub id: MessageId,
    pub session_id: SessionId,
    pub sender_id: UserId,
    pub sender_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_photo: Option<String>,
    pub is_typing: bool,
    pub message_type: MessageKind,
    pub message: String,
    #[serde(default)]
    pub attachment: String,
    pub created_at: DateTime<Utc>,
}

impl OutboundMessage {
    /// Stamps a stored message with the sender's cached profile.
    pub fn from_stored(stored: &StoredMessage, sender: &Profile) -> Self {
        Self {
            id: stored.id,
            session_id: stored.session_id,
            sender_id: stored.sender_id,
            sender_name: sender.name.clone(),
            sender_photo: sender.photo_url.clone(),
            is_typing: false,
            message_type: stored.kind,
            message: stored.body.clone(),
            attachment: stored.attachment.clone().unwrap_or_default(),
            created_at: stored.created_at,
        }
    }
}

/// Frames sent from the daemon to a participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    /// A persisted chat message from the other participant
    Message(OutboundMessage),

    /// The other participant is composing a message
    Typing {
        session_id: SessionId,
        sender_id: UserId,
        is_typing: bool,
    },

    /// The consultation ended; the connection is about to close
    SessionEnded { session_id: SessionId },

    /// A frame from this connection could not be processed
    Error { message: String },
}

impl ServerFrame {
    /// Creates a message frame.
    pub fn message(message: OutboundMessage) -> Self {
        Self::Message(message)
    }

    /// Creates a typing notification.
    pub fn typing(session_id: SessionId, sender_id: UserId) -> Self {
        Self::Typing {
            session_id,
            sender_id,
            is_typing: true,
        }
    }

    /// Creates a session-ended notice.
    pub fn session_ended(session_id: SessionId) -> Self {
        Self::SessionEnded { session_id }
    }

    /// Creates an error notice.
    pub fn error(message: &str) -> Self {
        Self::Error {
            message: message.to_string(),
        }
    }

    /// Short label for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Message(_) => "message",
            Self::Typing { .. } => "typing",
            Self::SessionEnded { .. } => "session_ended",
            Self::Error { .. } => "error",
        }
    }
}
