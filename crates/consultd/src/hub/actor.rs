//! Hub actor - owns every room and processes commands sequentially.
//!
//! The HubActor is the single owner of the session → room map. It receives
//! commands via an mpsc channel and publishes room events via broadcast.
//! Because commands are handled one at a time, "room did not exist, create
//! it" and "room existed, join it" can never interleave when both
//! participants connect at the same moment.
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations use `?`, pattern matching, or `unwrap_or`
//! - Channel send failures are logged but don't panic

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use consult_core::{SessionId, UserId};
use consult_protocol::ServerFrame;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

use super::commands::{HubCommand, HubError, LeaveReason, Registration, RoomEvent};
use super::room::{OutboundFrame, Room, RoomSnapshot};
use crate::client::ConnectionId;

/// Maximum number of ended sessions remembered to refuse late registrations.
pub const MAX_ENDED_SESSIONS: usize = 4096;

/// Bounded, insertion-ordered set of ended session ids.
#[derive(Debug, Default)]
struct EndedSessions {
    order: VecDeque<SessionId>,
    ids: HashSet<SessionId>,
}

impl EndedSessions {
    fn contains(&self, session_id: &SessionId) -> bool {
        self.ids.contains(session_id)
    }

    fn insert(&mut self, session_id: SessionId) {
        if !self.ids.insert(session_id) {
            return;
        }
        self.order.push_back(session_id);
        if self.order.len() > MAX_ENDED_SESSIONS {
            if let Some(oldest) = self.order.pop_front() {
                self.ids.remove(&oldest);
            }
        }
    }
}

/// The hub actor - owns all room state.
///
/// # Thread Safety
///
/// The actor runs in a single task and processes commands sequentially.
/// All registry mutations happen within this single task.
pub struct HubActor {
    /// Command receiver
    receiver: mpsc::Receiver<HubCommand>,

    /// Live rooms keyed by session
    rooms: HashMap<SessionId, Room>,

    /// Sessions that ended while this process was running
    ended: EndedSessions,

    /// Event publisher for observers
    event_publisher: broadcast::Sender<RoomEvent>,
}

impl HubActor {
    /// Creates a new hub actor.
    pub fn new(
        receiver: mpsc::Receiver<HubCommand>,
        event_publisher: broadcast::Sender<RoomEvent>,
    ) -> Self {
        Self {
            receiver,
            rooms: HashMap::new(),
            ended: EndedSessions::default(),
            event_publisher,
        }
    }

    /// Runs the actor event loop.
    ///
    /// Processes commands until the channel closes (all handles dropped).
    pub async fn run(mut self) {
        info!("Hub actor starting");

        while let Some(cmd) = self.receiver.recv().await {
            self.handle_command(cmd);
        }

        info!(rooms = self.rooms.len(), "Hub actor stopped");
    }

    /// Dispatches a command to the appropriate handler.
    fn handle_command(&mut self, cmd: HubCommand) {
        match cmd {
            HubCommand::Register {
                registration,
                respond_to,
            } => {
                let result = self.handle_register(*registration);
                // Ignore send error - caller may have dropped the receiver
                let _ = respond_to.send(result);
            }
            HubCommand::Unregister {
                session_id,
                user_id,
                connection_id,
                respond_to,
            } => {
                let removed = self.handle_unregister(session_id, user_id, connection_id);
                let _ = respond_to.send(removed);
            }
            HubCommand::Broadcast {
                session_id,
                frame,
                exclude,
                respond_to,
            } => {
                let delivered = self.handle_broadcast(session_id, &frame, exclude);
                let _ = respond_to.send(delivered);
            }
            HubCommand::SendTo {
                session_id,
                connection_id,
                frame,
                respond_to,
            } => {
                let sent = self.handle_send_to(session_id, connection_id, &frame);
                let _ = respond_to.send(sent);
            }
            HubCommand::EndSession {
                session_id,
                respond_to,
            } => {
                let existed = self.handle_end_session(session_id);
                let _ = respond_to.send(existed);
            }
            HubCommand::RoomMembers {
                session_id,
                respond_to,
            } => {
                let members = self.rooms.get(&session_id).map(Room::members);
                let _ = respond_to.send(members);
            }
            HubCommand::RoomCount { respond_to } => {
                let _ = respond_to.send(self.rooms.len());
            }
        }
    }

    // ========================================================================
    // Command Handlers
    // ========================================================================

    fn handle_register(&mut self, registration: Registration) -> Result<RoomSnapshot, HubError> {
        let Registration {
            session_id,
            role,
            participants,
            handle,
        } = registration;
        let user_id = handle.user_id();
        let connection_id = handle.connection_id();

        if self.ended.contains(&session_id) {
            debug!(
                session_id = %session_id,
                user_id = %user_id,
                "Registration refused, session already ended"
            );
            return Err(HubError::SessionNotOngoing(session_id));
        }

        // An existing room's participants are authoritative
        let allowed = self
            .rooms
            .get(&session_id)
            .map(|room| *room.participants())
            .unwrap_or(participants);

        if !allowed.admits(user_id, role) {
            warn!(
                session_id = %session_id,
                user_id = %user_id,
                role = %role,
                "Registration refused, not a participant"
            );
            return Err(HubError::Forbidden {
                session_id,
                user_id,
            });
        }

        let room = match self.rooms.entry(session_id) {
            std::collections::hash_map::Entry::Occupied(entry) => entry.into_mut(),
            std::collections::hash_map::Entry::Vacant(entry) => {
                info!(session_id = %session_id, "Room created");
                let _ = self
                    .event_publisher
                    .send(RoomEvent::RoomCreated { session_id });
                entry.insert(Room::new(session_id, participants))
            }
        };

        if let Some(previous) = room.add(handle) {
            info!(
                session_id = %session_id,
                user_id = %user_id,
                old_connection = %previous.connection_id(),
                new_connection = %connection_id,
                "Replacing previous connection"
            );
            let _ = self.event_publisher.send(RoomEvent::MemberLeft {
                session_id,
                user_id,
                connection_id: previous.connection_id(),
                reason: LeaveReason::Replaced,
            });
            previous.close();
        }

        let snapshot = room.snapshot();

        info!(
            session_id = %session_id,
            user_id = %user_id,
            connection_id = %connection_id,
            members = snapshot.members.len(),
            "Client registered"
        );

        let _ = self.event_publisher.send(RoomEvent::MemberJoined {
            session_id,
            user_id,
            connection_id,
        });

        Ok(snapshot)
    }

    fn handle_unregister(
        &mut self,
        session_id: SessionId,
        user_id: UserId,
        connection_id: ConnectionId,
    ) -> bool {
        let Some(room) = self.rooms.get_mut(&session_id) else {
            return false;
        };

        // Dropping the handle closes the client's queue
        let Some(_handle) = room.remove(user_id, connection_id) else {
            return false;
        };

        // Empty rooms stay: either participant may reconnect
        info!(
            session_id = %session_id,
            user_id = %user_id,
            connection_id = %connection_id,
            remaining = room.len(),
            "Client unregistered"
        );

        let _ = self.event_publisher.send(RoomEvent::MemberLeft {
            session_id,
            user_id,
            connection_id,
            reason: LeaveReason::Disconnected,
        });

        true
    }

    fn handle_broadcast(
        &mut self,
        session_id: SessionId,
        frame: &ServerFrame,
        exclude: Option<UserId>,
    ) -> usize {
        let Some(room) = self.rooms.get_mut(&session_id) else {
            // The session may have just ended
            debug!(session_id = %session_id, kind = frame.kind(), "Broadcast to missing room dropped");
            return 0;
        };

        // Build the message once
        let Some(text) = serialize(frame) else {
            return 0;
        };

        let outcome = room.broadcast(&text, exclude);

        for eviction in outcome.evicted {
            let _ = self.event_publisher.send(RoomEvent::MemberLeft {
                session_id,
                user_id: eviction.user_id,
                connection_id: eviction.connection_id,
                reason: eviction.reason,
            });
        }

        debug!(
            session_id = %session_id,
            kind = frame.kind(),
            delivered = outcome.delivered,
            "Broadcast"
        );

        outcome.delivered
    }

    fn handle_send_to(
        &mut self,
        session_id: SessionId,
        connection_id: ConnectionId,
        frame: &ServerFrame,
    ) -> bool {
        let Some(room) = self.rooms.get(&session_id) else {
            return false;
        };
        let Some(text) = serialize(frame) else {
            return false;
        };
        room.send_to(connection_id, &text)
    }

    fn handle_end_session(&mut self, session_id: SessionId) -> bool {
        self.ended.insert(session_id);

        let Some(room) = self.rooms.remove(&session_id) else {
            debug!(session_id = %session_id, "End of session without a room");
            return false;
        };

        let notice = serialize(&ServerFrame::session_ended(session_id));
        let closed = room.close(notice.as_ref());

        for (user_id, connection_id) in &closed {
            let _ = self.event_publisher.send(RoomEvent::MemberLeft {
                session_id,
                user_id: *user_id,
                connection_id: *connection_id,
                reason: LeaveReason::SessionEnded,
            });
        }
        let _ = self.event_publisher.send(RoomEvent::RoomClosed { session_id });

        info!(
            session_id = %session_id,
            closed_clients = closed.len(),
            "Session ended, room deleted"
        );

        true
    }
}

fn serialize(frame: &ServerFrame) -> Option<OutboundFrame> {
    match serde_json::to_string(frame) {
        Ok(json) => Some(Arc::from(json)),
        Err(e) => {
            error!(error = %e, kind = frame.kind(), "Failed to serialize frame");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::room::ClientHandle;
    use consult_core::{Participants, Role};
    use tokio::sync::oneshot;
    use tokio_util::sync::CancellationToken;

    const SESSION: SessionId = SessionId::new(42);
    const DOCTOR: UserId = UserId::new(1);
    const PATIENT: UserId = UserId::new(2);

    fn actor() -> (HubActor, broadcast::Receiver<RoomEvent>) {
        let (_tx, rx) = mpsc::channel(8);
        let (events, events_rx) = broadcast::channel(64);
        (HubActor::new(rx, events), events_rx)
    }

    fn registration(
        user_id: UserId,
        role: Role,
        connection: u64,
    ) -> (Registration, mpsc::Receiver<OutboundFrame>, CancellationToken) {
        let (tx, rx) = mpsc::channel(8);
        let token = CancellationToken::new();
        let registration = Registration {
            session_id: SESSION,
            role,
            participants: Participants::new(DOCTOR, PATIENT),
            handle: ClientHandle::new(user_id, ConnectionId::new(connection), tx, token.clone()),
        };
        (registration, rx, token)
    }

    #[test]
    fn test_register_creates_room() {
        let (mut actor, mut events) = actor();
        let (reg, _rx, _t) = registration(DOCTOR, Role::Doctor, 1);

        let snapshot = actor.handle_register(reg).unwrap();
        assert_eq!(snapshot.members, vec![DOCTOR]);
        assert_eq!(actor.rooms.len(), 1);
        assert_eq!(
            events.try_recv().unwrap(),
            RoomEvent::RoomCreated { session_id: SESSION }
        );
    }

    #[test]
    fn test_register_rejects_non_participant_without_creating_room() {
        let (mut actor, _events) = actor();
        let (reg, _rx, _t) = registration(UserId::new(3), Role::Patient, 1);

        let err = actor.handle_register(reg).unwrap_err();
        assert!(matches!(err, HubError::Forbidden { .. }));
        assert!(actor.rooms.is_empty());
    }

    #[test]
    fn test_register_rejects_wrong_role() {
        let (mut actor, _events) = actor();
        let (reg, _rx, _t) = registration(DOCTOR, Role::Patient, 1);
        assert!(matches!(
            actor.handle_register(reg),
            Err(HubError::Forbidden { .. })
        ));
    }

    #[test]
    fn test_reconnect_replaces_and_closes_previous() {
        let (mut actor, _events) = actor();
        let (first, _rx1, first_token) = registration(DOCTOR, Role::Doctor, 1);
        let (second, _rx2, second_token) = registration(DOCTOR, Role::Doctor, 2);

        actor.handle_register(first).unwrap();
        let snapshot = actor.handle_register(second).unwrap();

        assert_eq!(snapshot.members, vec![DOCTOR]);
        assert!(first_token.is_cancelled());
        assert!(!second_token.is_cancelled());

        // Late unregister from the replaced connection is a no-op
        assert!(!actor.handle_unregister(SESSION, DOCTOR, ConnectionId::new(1)));
        assert_eq!(actor.rooms.get(&SESSION).map(Room::len), Some(1));
    }

    #[test]
    fn test_unregister_keeps_empty_room() {
        let (mut actor, _events) = actor();
        let (reg, _rx, _t) = registration(DOCTOR, Role::Doctor, 1);
        actor.handle_register(reg).unwrap();

        assert!(actor.handle_unregister(SESSION, DOCTOR, ConnectionId::new(1)));
        assert_eq!(actor.rooms.get(&SESSION).map(Room::len), Some(0));
    }

    #[test]
    fn test_broadcast_to_missing_room_is_noop() {
        let (mut actor, _events) = actor();
        let frame = ServerFrame::typing(SESSION, DOCTOR);
        assert_eq!(actor.handle_broadcast(SESSION, &frame, Some(DOCTOR)), 0);
    }

    #[test]
    fn test_end_session_tombstones_and_notifies() {
        let (mut actor, _events) = actor();
        let (reg, mut rx, _t) = registration(PATIENT, Role::Patient, 1);
        actor.handle_register(reg).unwrap();

        assert!(actor.handle_end_session(SESSION));
        assert!(actor.rooms.is_empty());

        let notice = rx.try_recv().unwrap();
        assert!(notice.contains("session_ended"));

        let (late, _rx2, _t2) = registration(DOCTOR, Role::Doctor, 2);
        assert_eq!(
            actor.handle_register(late).unwrap_err(),
            HubError::SessionNotOngoing(SESSION)
        );
        assert!(actor.rooms.is_empty());
    }

    #[test]
    fn test_ended_sessions_are_bounded() {
        let mut ended = EndedSessions::default();
        for i in 0..(MAX_ENDED_SESSIONS as u64 + 10) {
            ended.insert(SessionId::new(i));
        }
        assert_eq!(ended.ids.len(), MAX_ENDED_SESSIONS);
        assert!(!ended.contains(&SessionId::new(0)));
        assert!(ended.contains(&SessionId::new(MAX_ENDED_SESSIONS as u64 + 9)));
    }

    #[tokio::test]
    async fn test_command_dispatch_responds() {
        let (tx, rx) = mpsc::channel(8);
        let (events, _) = broadcast::channel(8);
        tokio::spawn(HubActor::new(rx, events).run());

        let (respond_to, response) = oneshot::channel();
        tx.send(HubCommand::RoomCount { respond_to }).await.unwrap();
        assert_eq!(response.await.unwrap(), 0);
    }
}
