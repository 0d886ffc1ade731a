//! Collaborator interfaces consumed by the chat core.
//!
//! The chat core never owns persistent state. Session status, message
//! history and user profiles live behind these traits; the daemon ships
//! in-memory implementations and deployments plug in their own.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tokio::sync::broadcast;

use crate::{NewMessage, Participants, Profile, SessionId, StoredMessage, UserId};

/// Lifecycle status of a consultation session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Scheduled,
    Ongoing,
    Ended,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scheduled => write!(f, "scheduled"),
            Self::Ongoing => write!(f, "ongoing"),
            Self::Ended => write!(f, "ended"),
        }
    }
}

/// Errors returned by collaborator stores.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("session not found: {0}")]
    SessionNotFound(SessionId),

    #[error("session {session_id} is {status}, not ongoing")]
    SessionNotOngoing {
        session_id: SessionId,
        status: SessionStatus,
    },

    #[error("profile not found for user {0}")]
    ProfileNotFound(UserId),

    /// The store refused the write (e.g. a typing indicator)
    #[error("rejected: {0}")]
    Rejected(String),

    /// Backend unavailable or failed
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Session persistence and status transitions.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Returns the doctor and patient of a session whose status is ongoing.
    ///
    /// # Errors
    ///
    /// - `StoreError::SessionNotFound` if the session does not exist
    /// - `StoreError::SessionNotOngoing` if it is scheduled or ended
    async fn ongoing_participants(&self, session_id: SessionId) -> Result<Participants, StoreError>;

    /// Moves a session to `Ended` and publishes it to end subscribers.
    async fn end_session(&self, session_id: SessionId) -> Result<(), StoreError>;

    /// Subscribes to "session ended" transitions.
    fn subscribe_ended(&self) -> broadcast::Receiver<SessionId>;
}

/// Message persistence and history retrieval.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Persists a message, assigning its id and `created_at`.
    ///
    /// Ids and timestamps are strictly increasing per session.
    async fn save(&self, message: NewMessage) -> Result<StoredMessage, StoreError>;

    /// Returns the persisted messages of a session in submission order.
    async fn history(&self, session_id: SessionId) -> Result<Vec<StoredMessage>, StoreError>;
}

/// Identity/profile resolution for a user id.
#[async_trait]
pub trait ProfileResolver: Send + Sync {
    async fn profile(&self, user_id: UserId) -> Result<Profile, StoreError>;
}
