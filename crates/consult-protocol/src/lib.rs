//! Consult Protocol - Wire protocol for chat connections
//!
//! This crate provides the JSON frames exchanged between a participant's
//! socket and the daemon: the inbound frame a participant sends, its
//! validated interpretation, and the tagged frames the daemon pushes back.

pub mod message;
pub mod parse;

pub use message::{InboundFrame, OutboundMessage, ServerFrame};
pub use parse::{decode_inbound, ChatInput, ProtocolError};
