//! Consult Core - Shared types for consultation chat
//!
//! This crate provides the domain types shared between the wire protocol
//! (`consult-protocol`) and the daemon (`consultd`), together with the
//! collaborator traits the chat core consumes but does not implement:
//! session status, message persistence and profile lookup.
//!
//! All code follows the panic-free policy: no `.unwrap()`, `.expect()`,
//! `panic!()`, `unreachable!()`, `todo!()`, or direct indexing `[i]`.

pub mod error;
pub mod ids;
pub mod message;
pub mod participant;
pub mod store;

// Re-exports for convenience
pub use error::DomainError;
pub use ids::{MessageId, SessionId, UserId};
pub use message::{MessageKind, NewMessage, StoredMessage};
pub use participant::{Participants, Profile, Role};
pub use store::{MessageStore, ProfileResolver, SessionStatus, SessionStore, StoreError};
