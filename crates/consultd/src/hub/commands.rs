//! Hub actor commands, errors, and events.
//!
//! This module defines the message types for communicating with the `HubActor`:
//! - `HubCommand`: Commands sent to the actor
//! - `HubError`: Errors that can occur during hub operations
//! - `RoomEvent`: Events published by the hub for observers
//!
//! All types are designed for async message passing and follow the panic-free policy.

use consult_core::{Participants, Role, SessionId, UserId};
use consult_protocol::ServerFrame;
use thiserror::Error;
use tokio::sync::oneshot;

use super::room::{ClientHandle, RoomSnapshot};
use crate::client::ConnectionId;

// ============================================================================
// Hub Commands
// ============================================================================

/// Everything the hub needs to admit a connection into a room.
///
/// `participants` come from the session store, queried once by the caller
/// before registration. They are only used when the room does not exist yet.
#[derive(Debug)]
pub struct Registration {
    pub session_id: SessionId,
    pub role: Role,
    pub participants: Participants,
    pub handle: ClientHandle,
}

/// Commands sent to the hub actor.
///
/// Commands that produce a result carry a oneshot channel for the response.
#[derive(Debug)]
pub enum HubCommand {
    /// Admit a client into the room of its session, creating the room on
    /// first connect and replacing any previous client of the same user.
    ///
    /// # Errors
    /// - `HubError::SessionNotOngoing` if the session has ended
    /// - `HubError::Forbidden` if the user is not a participant in that role
    Register {
        registration: Box<Registration>,
        respond_to: oneshot::Sender<Result<RoomSnapshot, HubError>>,
    },

    /// Remove a client if it is still the registered connection for its user.
    Unregister {
        session_id: SessionId,
        user_id: UserId,
        connection_id: ConnectionId,
        respond_to: oneshot::Sender<bool>,
    },

    /// Fan a frame out to every member of a room except `exclude`.
    ///
    /// Responds with the number of clients the frame was queued for.
    Broadcast {
        session_id: SessionId,
        frame: ServerFrame,
        exclude: Option<UserId>,
        respond_to: oneshot::Sender<usize>,
    },

    /// Queue a frame for one connection only (error notices).
    SendTo {
        session_id: SessionId,
        connection_id: ConnectionId,
        frame: ServerFrame,
        respond_to: oneshot::Sender<bool>,
    },

    /// Close every client of a session and delete its room.
    EndSession {
        session_id: SessionId,
        respond_to: oneshot::Sender<bool>,
    },

    /// Current members of a room, or `None` if there is no room.
    RoomMembers {
        session_id: SessionId,
        respond_to: oneshot::Sender<Option<Vec<UserId>>>,
    },

    /// Number of live rooms.
    RoomCount { respond_to: oneshot::Sender<usize> },
}

// ============================================================================
// Hub Errors
// ============================================================================

/// Errors that can occur during hub operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HubError {
    /// The consultation is not (or no longer) ongoing.
    #[error("chat already ended for session {0}")]
    SessionNotOngoing(SessionId),

    /// The user is not a participant of the session in the claimed role.
    #[error("user {user_id} is not allowed in session {session_id}")]
    Forbidden {
        session_id: SessionId,
        user_id: UserId,
    },

    /// The actor has shut down.
    #[error("hub channel closed")]
    ChannelClosed,
}

// ============================================================================
// Room Events
// ============================================================================

/// Events published by the hub to observers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomEvent {
    /// First connection for a session created its room.
    RoomCreated { session_id: SessionId },

    /// A client joined (or replaced its own previous connection).
    MemberJoined {
        session_id: SessionId,
        user_id: UserId,
        connection_id: ConnectionId,
    },

    /// A client left the room.
    MemberLeft {
        session_id: SessionId,
        user_id: UserId,
        connection_id: ConnectionId,
        reason: LeaveReason,
    },

    /// The session ended and its room was deleted.
    RoomClosed { session_id: SessionId },
}

/// Reason why a client left its room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaveReason {
    /// Socket closed, errored or timed out.
    Disconnected,

    /// The same user connected again.
    Replaced,

    /// Outbound queue was full at broadcast time.
    SlowConsumer,

    /// The consultation session ended.
    SessionEnded,
}

impl std::fmt::Display for LeaveReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Replaced => write!(f, "replaced by a newer connection"),
            Self::SlowConsumer => write!(f, "outbound queue full"),
            Self::SessionEnded => write!(f, "session ended"),
        }
    }
}
