//! Live membership of one consultation session.
//!
//! A `Room` holds at most one `ClientHandle` per user. It never touches a
//! socket: delivering a frame means a non-blocking push onto the client's
//! bounded outbound queue, and closing a client means cancelling its token
//! and dropping the queue sender. The client's own tasks do the rest.

use std::collections::HashMap;
use std::sync::Arc;

use consult_core::{Participants, SessionId, UserId};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::commands::LeaveReason;
use crate::client::ConnectionId;

/// Pre-serialized frame shared by every recipient of a broadcast.
pub type OutboundFrame = Arc<str>;

/// The room's registry entry for one connected client.
///
/// Owns the sending half of the client's outbound queue. Dropping the
/// handle closes the queue; the client's write task drains what is left
/// and then closes the socket.
#[derive(Debug)]
pub struct ClientHandle {
    user_id: UserId,
    connection_id: ConnectionId,
    outbound: mpsc::Sender<OutboundFrame>,
    cancel: CancellationToken,
}

impl ClientHandle {
    pub fn new(
        user_id: UserId,
        connection_id: ConnectionId,
        outbound: mpsc::Sender<OutboundFrame>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            user_id,
            connection_id,
            outbound,
            cancel,
        }
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    /// Non-blocking enqueue.
    pub fn try_deliver(&self, frame: &OutboundFrame) -> Result<(), TrySendError<OutboundFrame>> {
        self.outbound.try_send(Arc::clone(frame))
    }

    /// Forcibly closes the client: both tasks stop without draining the queue.
    pub fn close(self) {
        self.cancel.cancel();
    }

    /// Closes the queue after a final notice; the write task flushes it first.
    pub fn close_with_notice(self, notice: &OutboundFrame) {
        if self.try_deliver(notice).is_err() {
            // Queue full or gone: nothing will be flushed, stop immediately
            self.cancel.cancel();
        }
    }
}

/// A client removed from the room as a side effect of a broadcast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Eviction {
    pub user_id: UserId,
    pub connection_id: ConnectionId,
    pub reason: LeaveReason,
}

/// Result of fanning a frame out to a room.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BroadcastOutcome {
    /// Clients the frame was queued for
    pub delivered: usize,
    /// Clients removed because their queue was full or closed
    pub evicted: Vec<Eviction>,
}

/// Point-in-time view of a room, returned on registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomSnapshot {
    pub session_id: SessionId,
    pub participants: Participants,
    pub members: Vec<UserId>,
}

/// Runtime instance of one consultation session.
#[derive(Debug)]
pub struct Room {
    session_id: SessionId,
    participants: Participants,
    clients: HashMap<UserId, ClientHandle>,
}

impl Room {
    pub fn new(session_id: SessionId, participants: Participants) -> Self {
        Self {
            session_id,
            participants,
            clients: HashMap::with_capacity(2),
        }
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    pub fn participants(&self) -> &Participants {
        &self.participants
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Member user ids in ascending order.
    pub fn members(&self) -> Vec<UserId> {
        let mut members: Vec<UserId> = self.clients.keys().copied().collect();
        members.sort_unstable();
        members
    }

    pub fn snapshot(&self) -> RoomSnapshot {
        RoomSnapshot {
            session_id: self.session_id,
            participants: self.participants,
            members: self.members(),
        }
    }

    /// Installs a client, returning the handle it replaced (if any).
    ///
    /// The caller is responsible for closing the replaced handle.
    pub fn add(&mut self, handle: ClientHandle) -> Option<ClientHandle> {
        self.clients.insert(handle.user_id(), handle)
    }

    /// Removes the user's entry if it belongs to `connection_id`.
    ///
    /// Idempotent. A stale connection never removes its replacement.
    pub fn remove(&mut self, user_id: UserId, connection_id: ConnectionId) -> Option<ClientHandle> {
        match self.clients.get(&user_id) {
            Some(handle) if handle.connection_id() == connection_id => {
                self.clients.remove(&user_id)
            }
            _ => None,
        }
    }

    /// Queues `frame` for every member except `exclude` without ever waiting.
    ///
    /// A member whose queue is full is a slow consumer: it is closed and
    /// removed so it cannot stall delivery to the other participant.
    pub fn broadcast(&mut self, frame: &OutboundFrame, exclude: Option<UserId>) -> BroadcastOutcome {
        let mut outcome = BroadcastOutcome::default();
        let mut failed = Vec::new();

        for (user_id, client) in &self.clients {
            if Some(*user_id) == exclude {
                continue;
            }

            match client.try_deliver(frame) {
                Ok(()) => outcome.delivered += 1,
                Err(TrySendError::Full(_)) => {
                    warn!(
                        session_id = %self.session_id,
                        user_id = %user_id,
                        connection_id = %client.connection_id(),
                        "Outbound queue full, evicting slow consumer"
                    );
                    failed.push((*user_id, LeaveReason::SlowConsumer));
                }
                Err(TrySendError::Closed(_)) => {
                    debug!(
                        session_id = %self.session_id,
                        user_id = %user_id,
                        "Outbound queue closed, removing client"
                    );
                    failed.push((*user_id, LeaveReason::Disconnected));
                }
            }
        }

        for (user_id, reason) in failed {
            if let Some(handle) = self.clients.remove(&user_id) {
                outcome.evicted.push(Eviction {
                    user_id,
                    connection_id: handle.connection_id(),
                    reason,
                });
                handle.close();
            }
        }

        outcome
    }

    /// Queues a frame for a single connection. Returns false if it is not
    /// a member or its queue cannot take the frame.
    pub fn send_to(&self, connection_id: ConnectionId, frame: &OutboundFrame) -> bool {
        self.clients
            .values()
            .find(|c| c.connection_id() == connection_id)
            .map(|c| c.try_deliver(frame).is_ok())
            .unwrap_or(false)
    }

    /// Closes every client, queueing `notice` first when there is room for it.
    ///
    /// Returns the handles' `(user_id, connection_id)` for event reporting.
    pub fn close(self, notice: Option<&OutboundFrame>) -> Vec<(UserId, ConnectionId)> {
        let mut closed = Vec::with_capacity(self.clients.len());
        for (user_id, handle) in self.clients {
            closed.push((user_id, handle.connection_id()));
            match notice {
                Some(notice) => handle.close_with_notice(notice),
                None => handle.close(),
            }
        }
        closed
    }
}
