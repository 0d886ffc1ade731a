//! Shared harness for the consultd integration tests.
//!
//! Tests CAN use `.unwrap()` and `.expect()`.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use consult_core::{
    MessageStore, NewMessage, Profile, Role, SessionId, SessionStatus, SessionStore, StoreError,
    StoredMessage, UserId,
};
use consult_protocol::{InboundFrame, ServerFrame};
use consultd::client::{attach, ClientError, ClientTasks, ConnectRequest, ConnectionId};
use consultd::config::ChatConfig;
use consultd::hub::{spawn_hub, watch_session_ends, HubHandle, DEFAULT_COMMAND_BUFFER};
use consultd::store::{MemoryMessageStore, MemoryProfileResolver, MemorySessionStore, Stores};
use consultd::transport::memory::{pair, MemoryPeer};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Instant};

// ============================================================================
// Constants
// ============================================================================

pub const SESSION: SessionId = SessionId::new(42);
pub const DOCTOR: UserId = UserId::new(1);
pub const PATIENT: UserId = UserId::new(2);

pub const WAIT_TIMEOUT: Duration = Duration::from_secs(2);
pub const POLL_INTERVAL: Duration = Duration::from_millis(10);
pub const QUIET_PERIOD: Duration = Duration::from_millis(100);

// ============================================================================
// Message store that counts and can fail saves
// ============================================================================

#[derive(Default)]
pub struct RecordingStore {
    inner: MemoryMessageStore,
    saves: AtomicUsize,
    failing: AtomicBool,
}

impl RecordingStore {
    pub fn save_calls(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl MessageStore for RecordingStore {
    async fn save(&self, message: NewMessage) -> Result<StoredMessage, StoreError> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("database offline".to_string()));
        }
        self.inner.save(message).await
    }

    async fn history(&self, session_id: SessionId) -> Result<Vec<StoredMessage>, StoreError> {
        self.inner.history(session_id).await
    }
}

// ============================================================================
// Harness
// ============================================================================

pub struct Harness {
    pub hub: HubHandle,
    pub stores: Stores,
    pub sessions: Arc<MemorySessionStore>,
    pub messages: Arc<RecordingStore>,
    pub chat: ChatConfig,
    _watcher: JoinHandle<()>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_chat(ChatConfig::default())
    }

    pub fn with_chat(chat: ChatConfig) -> Self {
        let sessions = Arc::new(MemorySessionStore::new());
        sessions.insert(SESSION, DOCTOR, PATIENT, SessionStatus::Ongoing);

        let profiles = Arc::new(MemoryProfileResolver::new());
        profiles.insert(DOCTOR, Profile::new("Dr. Grey", Some("https://img/1.png".to_string())));
        profiles.insert(PATIENT, Profile::new("Pat", None));

        let messages = Arc::new(RecordingStore::default());
        let stores = Stores::new(sessions.clone(), messages.clone(), profiles);

        let hub = spawn_hub(DEFAULT_COMMAND_BUFFER);
        let watcher = watch_session_ends(hub.clone(), sessions.subscribe_ended());

        Self {
            hub,
            stores,
            sessions,
            messages,
            chat,
            _watcher: watcher,
        }
    }

    pub async fn try_connect(&self, user_id: UserId, role: Role) -> Result<Participant, ClientError> {
        let client = attach(
            &self.hub,
            &self.stores,
            &self.chat,
            ConnectRequest {
                session_id: SESSION,
                user_id,
                role,
            },
        )
        .await?;

        let connection_id = client.connection_id();
        let (reader, writer, peer) = pair();
        let tasks = client.spawn(reader, writer);

        Ok(Participant {
            peer,
            tasks,
            connection_id,
        })
    }

    pub async fn connect(&self, user_id: UserId, role: Role) -> Participant {
        self.try_connect(user_id, role).await.expect("connect participant")
    }

    pub async fn members(&self) -> Vec<UserId> {
        self.hub.room_members(SESSION).await.unwrap_or_default()
    }

    /// Polls until the room's members equal `expected`.
    pub async fn wait_for_members(&self, expected: &[UserId]) {
        let deadline = Instant::now() + WAIT_TIMEOUT;
        loop {
            let members = self.members().await;
            if members == expected {
                return;
            }
            assert!(
                Instant::now() < deadline,
                "room members {members:?} never became {expected:?}"
            );
            sleep(POLL_INTERVAL).await;
        }
    }

    /// Polls until the store has seen `expected` save calls.
    pub async fn wait_for_saves(&self, expected: usize) {
        let deadline = Instant::now() + WAIT_TIMEOUT;
        while self.messages.save_calls() < expected {
            assert!(Instant::now() < deadline, "store never saw {expected} saves");
            sleep(POLL_INTERVAL).await;
        }
    }
}

// ============================================================================
// Participant
// ============================================================================

pub struct Participant {
    pub peer: MemoryPeer,
    pub tasks: ClientTasks,
    pub connection_id: ConnectionId,
}

impl Participant {
    pub fn send(&self, frame: &InboundFrame) {
        assert!(self.peer.send_json(frame), "peer already hung up");
    }

    pub fn say(&self, text: &str) {
        self.send(&InboundFrame::text(text));
    }

    /// Next frame written to this participant, failing the test on timeout.
    pub async fn expect_frame(&mut self) -> ServerFrame {
        let text = timeout(WAIT_TIMEOUT, self.peer.recv_text())
            .await
            .expect("timed out waiting for frame")
            .expect("connection closed while waiting for frame");
        serde_json::from_str(&text).expect("valid server frame")
    }

    /// Asserts nothing is written to this participant for a short while.
    pub async fn expect_silence(&mut self) {
        sleep(QUIET_PERIOD).await;
        assert_eq!(self.peer.try_recv_text(), None);
    }

    /// Waits until the daemon closes this participant's socket.
    pub async fn expect_closed(&mut self) {
        let result = timeout(WAIT_TIMEOUT, async {
            while self.peer.recv_text().await.is_some() {}
        })
        .await;
        assert!(result.is_ok(), "connection was not closed");
    }

    /// Waits for both client tasks to finish.
    pub async fn finished(self) {
        timeout(WAIT_TIMEOUT, self.tasks.join())
            .await
            .expect("client tasks did not finish");
    }
}
