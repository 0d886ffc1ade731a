//! In-memory collaborator stores.
//!
//! Used by the daemon when no external backend is configured, and by the
//! integration tests. Locks are never held across an `.await`.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use consult_core::{
    MessageId, MessageStore, NewMessage, Participants, Profile, ProfileResolver, SessionId,
    SessionStatus, SessionStore, StoreError, StoredMessage, UserId,
};
use tokio::sync::broadcast;
use tracing::{debug, info};

/// Capacity of the "session ended" channel.
const ENDED_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy)]
struct SessionRecord {
    participants: Participants,
    status: SessionStatus,
}

/// Session statuses kept in a map, with end transitions published on a
/// broadcast channel.
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<SessionId, SessionRecord>>,
    ended_tx: broadcast::Sender<SessionId>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        let (ended_tx, _) = broadcast::channel(ENDED_CHANNEL_CAPACITY);
        Self {
            sessions: RwLock::new(HashMap::new()),
            ended_tx,
        }
    }

    /// Creates or overwrites a session.
    pub fn insert(&self, session_id: SessionId, doctor_id: UserId, patient_id: UserId, status: SessionStatus) {
        let record = SessionRecord {
            participants: Participants::new(doctor_id, patient_id),
            status,
        };
        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(session_id, record);
    }

    /// Current status of a session, if it exists.
    pub fn status(&self, session_id: SessionId) -> Option<SessionStatus> {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&session_id)
            .map(|record| record.status)
    }

    /// Moves a scheduled session to ongoing.
    pub fn start(&self, session_id: SessionId) -> Result<(), StoreError> {
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        let record = sessions
            .get_mut(&session_id)
            .ok_or(StoreError::SessionNotFound(session_id))?;

        match record.status {
            SessionStatus::Scheduled | SessionStatus::Ongoing => {
                record.status = SessionStatus::Ongoing;
                Ok(())
            }
            SessionStatus::Ended => Err(StoreError::SessionNotOngoing {
                session_id,
                status: SessionStatus::Ended,
            }),
        }
    }
}

impl Default for MemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn ongoing_participants(&self, session_id: SessionId) -> Result<Participants, StoreError> {
        let sessions = self.sessions.read().unwrap_or_else(PoisonError::into_inner);
        let record = sessions
            .get(&session_id)
            .ok_or(StoreError::SessionNotFound(session_id))?;

        match record.status {
            SessionStatus::Ongoing => Ok(record.participants),
            status => Err(StoreError::SessionNotOngoing { session_id, status }),
        }
    }

    /// Ending an already ended session succeeds without publishing again.
    async fn end_session(&self, session_id: SessionId) -> Result<(), StoreError> {
        {
            let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
            let record = sessions
                .get_mut(&session_id)
                .ok_or(StoreError::SessionNotFound(session_id))?;

            if record.status == SessionStatus::Ended {
                debug!(session_id = %session_id, "Session already ended");
                return Ok(());
            }
            record.status = SessionStatus::Ended;
        }

        info!(session_id = %session_id, "Session ended");
        // No subscribers is fine
        let _ = self.ended_tx.send(session_id);
        Ok(())
    }

    fn subscribe_ended(&self) -> broadcast::Receiver<SessionId> {
        self.ended_tx.subscribe()
    }
}

#[derive(Default)]
struct MessageLog {
    last_id: u64,
    last_created_at: Option<DateTime<Utc>>,
    by_session: HashMap<SessionId, Vec<StoredMessage>>,
}

/// Append-only message log.
///
/// Ids come from one counter and timestamps never repeat, so both are
/// strictly increasing within every session.
#[derive(Default)]
pub struct MemoryMessageStore {
    log: Mutex<MessageLog>,
}

impl MemoryMessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of messages stored across all sessions.
    pub fn len(&self) -> usize {
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .by_session
            .values()
            .map(Vec::len)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl MessageStore for MemoryMessageStore {
    async fn save(&self, message: NewMessage) -> Result<StoredMessage, StoreError> {
        if !message.kind.is_persisted() {
            return Err(StoreError::Rejected(format!(
                "{} messages are not persisted",
                message.kind
            )));
        }

        let mut log = self.log.lock().unwrap_or_else(PoisonError::into_inner);

        let now = Utc::now();
        let created_at = match log.last_created_at {
            Some(last) if now <= last => last + Duration::microseconds(1),
            _ => now,
        };
        log.last_id += 1;
        log.last_created_at = Some(created_at);

        let stored = StoredMessage {
            id: MessageId::new(log.last_id),
            session_id: message.session_id,
            sender_id: message.sender_id,
            kind: message.kind,
            body: message.body,
            attachment: message.attachment,
            created_at,
        };

        log.by_session
            .entry(stored.session_id)
            .or_default()
            .push(stored.clone());

        Ok(stored)
    }

    async fn history(&self, session_id: SessionId) -> Result<Vec<StoredMessage>, StoreError> {
        let log = self.log.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(log.by_session.get(&session_id).cloned().unwrap_or_default())
    }
}

/// Profiles keyed by user id.
#[derive(Default)]
pub struct MemoryProfileResolver {
    profiles: RwLock<HashMap<UserId, Profile>>,
}

impl MemoryProfileResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, user_id: UserId, profile: Profile) {
        self.profiles
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(user_id, profile);
    }
}

#[async_trait]
impl ProfileResolver for MemoryProfileResolver {
    async fn profile(&self, user_id: UserId) -> Result<Profile, StoreError> {
        self.profiles
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&user_id)
            .cloned()
            .ok_or(StoreError::ProfileNotFound(user_id))
    }
}
