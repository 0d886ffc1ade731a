//! Client interface for interacting with the HubActor.
//!
//! The `HubHandle` provides a cheap-to-clone interface for sending commands
//! to the hub actor and subscribing to room events.
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Channel errors are mapped to `HubError::ChannelClosed`

use consult_core::{SessionId, UserId};
use consult_protocol::ServerFrame;
use tokio::sync::{broadcast, mpsc, oneshot};

use super::commands::{HubCommand, HubError, Registration, RoomEvent};
use super::room::RoomSnapshot;
use crate::client::ConnectionId;

/// Handle for interacting with the hub actor.
///
/// All structural changes and broadcasts go through the actor, so callers
/// never observe a half-applied registry mutation.
#[derive(Clone)]
pub struct HubHandle {
    /// Command sender to the actor
    sender: mpsc::Sender<HubCommand>,

    /// Event broadcaster for subscribing to room changes
    event_sender: broadcast::Sender<RoomEvent>,
}

impl HubHandle {
    pub fn new(sender: mpsc::Sender<HubCommand>, event_sender: broadcast::Sender<RoomEvent>) -> Self {
        Self {
            sender,
            event_sender,
        }
    }

    /// Registers a client in the room of its session.
    ///
    /// # Errors
    ///
    /// - `HubError::SessionNotOngoing` if the session has ended
    /// - `HubError::Forbidden` if the user is not a participant in that role
    /// - `HubError::ChannelClosed` if the actor has shut down
    pub async fn register_client(&self, registration: Registration) -> Result<RoomSnapshot, HubError> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(HubCommand::Register {
                registration: Box::new(registration),
                respond_to: tx,
            })
            .await
            .map_err(|_| HubError::ChannelClosed)?;

        rx.await.map_err(|_| HubError::ChannelClosed)?
    }

    /// Removes a client if `connection_id` is still the user's registered
    /// connection. Returns whether anything was removed.
    pub async fn unregister_client(
        &self,
        session_id: SessionId,
        user_id: UserId,
        connection_id: ConnectionId,
    ) -> bool {
        let (tx, rx) = oneshot::channel();

        if self
            .sender
            .send(HubCommand::Unregister {
                session_id,
                user_id,
                connection_id,
                respond_to: tx,
            })
            .await
            .is_err()
        {
            return false;
        }

        rx.await.unwrap_or(false)
    }

    /// Broadcasts a frame to every member of the session's room except
    /// `exclude`. A missing room is not an error.
    ///
    /// Returns the number of clients the frame was queued for.
    ///
    /// # Errors
    ///
    /// - `HubError::ChannelClosed` if the actor has shut down
    pub async fn broadcast(
        &self,
        session_id: SessionId,
        frame: ServerFrame,
        exclude: Option<UserId>,
    ) -> Result<usize, HubError> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(HubCommand::Broadcast {
                session_id,
                frame,
                exclude,
                respond_to: tx,
            })
            .await
            .map_err(|_| HubError::ChannelClosed)?;

        rx.await.map_err(|_| HubError::ChannelClosed)
    }

    /// Queues a frame for one connection. Returns whether it was queued.
    pub async fn send_to(&self, session_id: SessionId, connection_id: ConnectionId, frame: ServerFrame) -> bool {
        let (tx, rx) = oneshot::channel();

        if self
            .sender
            .send(HubCommand::SendTo {
                session_id,
                connection_id,
                frame,
                respond_to: tx,
            })
            .await
            .is_err()
        {
            return false;
        }

        rx.await.unwrap_or(false)
    }

    /// Ends a session: notifies and closes every client and deletes the room.
    ///
    /// Returns whether a room existed.
    ///
    /// # Errors
    ///
    /// - `HubError::ChannelClosed` if the actor has shut down
    pub async fn end_session(&self, session_id: SessionId) -> Result<bool, HubError> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(HubCommand::EndSession {
                session_id,
                respond_to: tx,
            })
            .await
            .map_err(|_| HubError::ChannelClosed)?;

        rx.await.map_err(|_| HubError::ChannelClosed)
    }

    /// Current members of a session's room, or `None` if there is no room
    /// (or the actor is gone).
    pub async fn room_members(&self, session_id: SessionId) -> Option<Vec<UserId>> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(HubCommand::RoomMembers {
                session_id,
                respond_to: tx,
            })
            .await
            .ok()?;

        rx.await.ok()?
    }

    /// Number of live rooms; 0 if the actor is gone.
    pub async fn room_count(&self) -> usize {
        let (tx, rx) = oneshot::channel();

        if self
            .sender
            .send(HubCommand::RoomCount { respond_to: tx })
            .await
            .is_err()
        {
            return 0;
        }

        rx.await.unwrap_or(0)
    }

    /// Subscribes to room events.
    pub fn subscribe(&self) -> broadcast::Receiver<RoomEvent> {
        self.event_sender.subscribe()
    }

    /// Whether the actor is still accepting commands.
    pub fn is_connected(&self) -> bool {
        !self.sender.is_closed()
    }
}
