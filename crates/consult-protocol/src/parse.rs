//! Decoding and validation of inbound frames.

use consult_core::MessageKind;
use thiserror::Error;

use crate::InboundFrame;

/// Errors raised while interpreting an inbound frame.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("frame of {size} bytes exceeds limit of {max}")]
    TooLarge { size: usize, max: usize },

    #[error("malformed frame: {0}")]
    Malformed(String),

    #[error("unknown message type: {0}")]
    UnknownMessageType(u8),

    #[error("text message is empty")]
    EmptyMessage,

    #[error("attachment message has no attachment reference")]
    MissingAttachment,
}

/// What a participant asked for, after validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatInput {
    /// Ephemeral typing indicator
    Typing,

    /// A message to persist and deliver
    Message {
        kind: MessageKind,
        body: String,
        attachment: Option<String>,
    },
}

/// Parses a raw text frame, enforcing the size limit before touching JSON.
pub fn decode_inbound(text: &str, max_bytes: usize) -> Result<InboundFrame, ProtocolError> {
    if text.len() > max_bytes {
        return Err(ProtocolError::TooLarge {
            size: text.len(),
            max: max_bytes,
        });
    }

    serde_json::from_str(text).map_err(|e| ProtocolError::Malformed(e.to_string()))
}

impl InboundFrame {
    /// Validates the frame and classifies it.
    ///
    /// `is_typing` wins over `message_type`: a typing frame is never
    /// treated as content, whatever else it carries.
    pub fn into_input(self) -> Result<ChatInput, ProtocolError> {
        if self.is_typing {
            return Ok(ChatInput::Typing);
        }

        let kind = match self.message_type {
            0 => MessageKind::Text,
            code => MessageKind::try_from(code)
                .map_err(|_| ProtocolError::UnknownMessageType(code))?,
        };

        match kind {
            MessageKind::Typing => Ok(ChatInput::Typing),
            MessageKind::Text => {
                if self.message.trim().is_empty() {
                    return Err(ProtocolError::EmptyMessage);
                }
                Ok(ChatInput::Message {
                    kind,
                    body: self.message,
                    attachment: None,
                })
            }
            MessageKind::Attachment => {
                let reference = self.attachment.trim();
                if reference.is_empty() {
                    return Err(ProtocolError::MissingAttachment);
                }
                Ok(ChatInput::Message {
                    kind,
                    attachment: Some(reference.to_string()),
                    body: self.message,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAX: usize = 1024;

    #[test]
    fn test_decode_text() {
        let frame = decode_inbound(r#"{"message_type":1,"message":"hello"}"#, MAX).unwrap();
        assert_eq!(
            frame.into_input().unwrap(),
            ChatInput::Message {
                kind: MessageKind::Text,
                body: "hello".to_string(),
                attachment: None,
            }
        );
    }

    #[test]
    fn test_typing_wins_over_type() {
        let frame = decode_inbound(r#"{"is_typing":true,"message_type":1,"message":""}"#, MAX).unwrap();
        assert_eq!(frame.into_input().unwrap(), ChatInput::Typing);

        let frame = decode_inbound(r#"{"message_type":3}"#, MAX).unwrap();
        assert_eq!(frame.into_input().unwrap(), ChatInput::Typing);
    }

    #[test]
    fn test_missing_type_reads_as_text() {
        let frame = decode_inbound(r#"{"message":"hi"}"#, MAX).unwrap();
        assert!(matches!(
            frame.into_input(),
            Ok(ChatInput::Message { kind: MessageKind::Text, .. })
        ));
    }

    #[test]
    fn test_attachment_requires_reference() {
        let err = InboundFrame::attachment("  ", "caption").into_input().unwrap_err();
        assert_eq!(err, ProtocolError::MissingAttachment);

        let input = InboundFrame::attachment("s3://scan.png", "").into_input().unwrap();
        assert_eq!(
            input,
            ChatInput::Message {
                kind: MessageKind::Attachment,
                body: String::new(),
                attachment: Some("s3://scan.png".to_string()),
            }
        );
    }

    #[test]
    fn test_validation_errors() {
        assert_eq!(
            InboundFrame::text("   ").into_input().unwrap_err(),
            ProtocolError::EmptyMessage
        );

        let frame = InboundFrame {
            message_type: 7,
            message: "x".to_string(),
            ..InboundFrame::default()
        };
        assert_eq!(frame.into_input().unwrap_err(), ProtocolError::UnknownMessageType(7));
    }

    #[test]
    fn test_decode_rejects_oversized_and_malformed() {
        let big = "x".repeat(MAX + 1);
        assert!(matches!(
            decode_inbound(&big, MAX),
            Err(ProtocolError::TooLarge { size, max: MAX }) if size == MAX + 1
        ));
        assert!(matches!(decode_inbound("not json", MAX), Err(ProtocolError::Malformed(_))));
    }
}
