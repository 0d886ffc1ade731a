//! Chat message model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{DomainError, MessageId, SessionId, UserId};

/// Kind of a chat message.
///
/// Encoded on the wire as an integer (`message_type`). Typing indicators are
/// ephemeral and are never written to a [`MessageStore`](crate::MessageStore).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum MessageKind {
    Text,
    Attachment,
    Typing,
}

impl MessageKind {
    /// Wire code for this kind.
    pub const fn code(self) -> u8 {
        match self {
            Self::Text => 1,
            Self::Attachment => 2,
            Self::Typing => 3,
        }
    }

    /// Whether messages of this kind are written to the message store.
    pub const fn is_persisted(self) -> bool {
        !matches!(self, Self::Typing)
    }
}

impl TryFrom<u8> for MessageKind {
    type Error = DomainError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            1 => Ok(Self::Text),
            2 => Ok(Self::Attachment),
            3 => Ok(Self::Typing),
            other => Err(DomainError::InvalidFieldValue {
                field: "message_type".to_string(),
                value: other.to_string(),
                expected: "1 (text), 2 (attachment) or 3 (typing)".to_string(),
            }),
        }
    }
}

impl From<MessageKind> for u8 {
    fn from(kind: MessageKind) -> Self {
        kind.code()
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Attachment => write!(f, "attachment"),
            Self::Typing => write!(f, "typing"),
        }
    }
}

/// A message submitted by a participant, not yet persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    pub session_id: SessionId,
    pub sender_id: UserId,
    pub kind: MessageKind,
    pub body: String,
    /// Reference to an uploaded attachment (URL or storage key)
    pub attachment: Option<String>,
}

/// A message as returned by the message store, stamped with server id and time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredMessage {
    pub id: MessageId,
    pub session_id: SessionId,
    pub sender_id: UserId,
    #[serde(rename = "message_type")]
    pub kind: MessageKind,
    #[serde(rename = "message")]
    pub body: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub attachment: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_codes_round_trip() {
        for kind in [MessageKind::Text, MessageKind::Attachment, MessageKind::Typing] {
            assert_eq!(MessageKind::try_from(kind.code()).unwrap(), kind);
        }
    }

    #[test]
    fn test_unknown_kind_rejected() {
        let err = MessageKind::try_from(9).unwrap_err();
        assert!(err.to_string().contains("message_type"));
        assert!(serde_json::from_str::<MessageKind>("0").is_err());
    }

    #[test]
    fn test_typing_is_not_persisted() {
        assert!(MessageKind::Text.is_persisted());
        assert!(MessageKind::Attachment.is_persisted());
        assert!(!MessageKind::Typing.is_persisted());
    }

    #[test]
    fn test_stored_message_wire_names() {
        let msg = StoredMessage {
            id: MessageId::new(1),
            session_id: SessionId::new(42),
            sender_id: UserId::new(1),
            kind: MessageKind::Text,
            body: "hello".to_string(),
            attachment: None,
            created_at: Utc::now(),
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["message_type"], 1);
        assert_eq!(json["message"], "hello");
        assert!(json.get("attachment").is_none());
    }
}
