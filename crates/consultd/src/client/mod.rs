//! Participant connections.
//!
//! A client is one socket bound to one user in one consultation session.
//! [`attach`] resolves everything a connection needs (participants, the
//! sender's profile) and registers it with the hub. The returned
//! [`AttachedClient`] is then spawned onto a socket as two tasks:
//!
//! - the read task decodes inbound frames, persists messages and asks the
//!   hub to broadcast them
//! - the write task drains the client's bounded outbound queue onto the
//!   socket and sends heartbeat pings
//!
//! ```text
//! Connecting ──attach()──▶ Registered ──spawn()──▶ Active ──▶ Closed
//! ```
//!
//! A client is never reused once closed; a reconnect is a new client with a
//! new [`ConnectionId`].
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Every socket, store and hub failure ends in an unregister, never a panic

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use consult_core::{MessageStore, Participants, Profile, Role, SessionId, StoreError, UserId};
use consult_protocol::ProtocolError;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ChatConfig;
use crate::hub::{ClientHandle, HubError, HubHandle, OutboundFrame, Registration, RoomSnapshot};
use crate::store::Stores;
use crate::transport::{FrameReader, FrameWriter, TransportError};

mod connection;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identifier of one socket connection.
///
/// Distinguishes a user's current connection from the one it replaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Allocates the next id. Ids are never reused within a process.
    pub fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// An authenticated request to join a session's chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectRequest {
    pub session_id: SessionId,
    pub user_id: UserId,
    pub role: Role,
}

/// Errors raised while attaching or running a client.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Hub(#[from] HubError),

    /// Session lookup failed before registration
    #[error("session lookup failed: {0}")]
    Store(StoreError),

    /// A message could not be saved and was not delivered
    #[error("message not saved: {0}")]
    Persistence(StoreError),

    #[error("invalid frame: {0}")]
    Decode(#[from] ProtocolError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl ClientError {
    /// Text sent back to the participant in an `error` frame.
    pub fn notice(&self) -> String {
        match self {
            Self::Persistence(_) => "message could not be saved, please resend".to_string(),
            Self::Decode(e) => e.to_string(),
            other => other.to_string(),
        }
    }
}

/// Per-connection timing and limits, taken from [`ChatConfig`].
#[derive(Debug, Clone, Copy)]
pub(crate) struct ClientSettings {
    pub idle_timeout: Duration,
    pub write_timeout: Duration,
    pub heartbeat_interval: Duration,
    pub max_frame_bytes: usize,
}

impl From<&ChatConfig> for ClientSettings {
    fn from(chat: &ChatConfig) -> Self {
        Self {
            idle_timeout: chat.idle_timeout(),
            write_timeout: chat.write_timeout(),
            heartbeat_interval: chat.heartbeat_interval(),
            max_frame_bytes: chat.max_frame_bytes,
        }
    }
}

/// Identity shared by both tasks of a client.
#[derive(Clone)]
pub(crate) struct ClientContext {
    pub session_id: SessionId,
    pub user_id: UserId,
    pub connection_id: ConnectionId,
    pub hub: HubHandle,
    pub cancel: CancellationToken,
}

impl ClientContext {
    /// Removes this connection from its room. Safe to call from both tasks.
    pub async fn unregister(&self) {
        let removed = self
            .hub
            .unregister_client(self.session_id, self.user_id, self.connection_id)
            .await;
        if removed {
            info!(
                session_id = %self.session_id,
                user_id = %self.user_id,
                connection_id = %self.connection_id,
                "Client left room"
            );
        }
    }
}

/// Checks that `request` may join its session, without registering it.
///
/// Applies the same rules the hub applies at registration: the session must
/// be ongoing and the user must hold the claimed role. Nothing in the room
/// changes, so a live connection of the same user is left alone.
///
/// # Errors
///
/// - `ClientError::Hub(SessionNotOngoing)` if the session is not ongoing
/// - `ClientError::Hub(Forbidden)` if the user is not a participant in `role`
/// - `ClientError::Store` if the session is unknown or the store failed
pub async fn authorize(stores: &Stores, request: ConnectRequest) -> Result<Participants, ClientError> {
    let ConnectRequest {
        session_id,
        user_id,
        role,
    } = request;

    let participants = match stores.sessions.ongoing_participants(session_id).await {
        Ok(participants) => participants,
        Err(StoreError::SessionNotOngoing { status, .. }) => {
            debug!(session_id = %session_id, status = %status, "Session not ongoing");
            return Err(HubError::SessionNotOngoing(session_id).into());
        }
        Err(e) => return Err(ClientError::Store(e)),
    };

    if !participants.admits(user_id, role) {
        return Err(HubError::Forbidden {
            session_id,
            user_id,
        }
        .into());
    }

    Ok(participants)
}

/// Resolves and registers a connection with the hub.
///
/// The session store is queried once; a session that is not ongoing is
/// reported as `HubError::SessionNotOngoing` so callers see one error for
/// "chat already ended" whichever side noticed it. A failing profile lookup
/// does not block the connection: broadcasts are stamped as anonymous.
///
/// Registration replaces any live connection of the same user, so only call
/// this once a socket is actually on its way.
///
/// # Errors
///
/// - `ClientError::Hub(SessionNotOngoing)` if the session is not ongoing
/// - `ClientError::Hub(Forbidden)` if the user is not a participant in `role`
/// - `ClientError::Store` if the session is unknown or the store failed
pub async fn attach(
    hub: &HubHandle,
    stores: &Stores,
    chat: &ChatConfig,
    request: ConnectRequest,
) -> Result<AttachedClient, ClientError> {
    let participants = authorize(stores, request).await?;
    let ConnectRequest {
        session_id,
        user_id,
        role,
    } = request;

    let profile = match stores.profiles.profile(user_id).await {
        Ok(profile) => profile,
        Err(e) => {
            warn!(user_id = %user_id, error = %e, "Profile lookup failed, using anonymous");
            Profile::anonymous()
        }
    };

    let connection_id = ConnectionId::next();
    let (outbound_tx, outbound_rx) = mpsc::channel(chat.outbound_capacity.max(1));
    let cancel = CancellationToken::new();

    let room = hub
        .register_client(Registration {
            session_id,
            role,
            participants,
            handle: ClientHandle::new(user_id, connection_id, outbound_tx, cancel.clone()),
        })
        .await?;

    debug!(
        session_id = %session_id,
        user_id = %user_id,
        role = %role,
        connection_id = %connection_id,
        members = room.members.len(),
        "Client attached"
    );

    Ok(AttachedClient {
        guard: UnspawnedGuard::new(ClientContext {
            session_id,
            user_id,
            connection_id,
            hub: hub.clone(),
            cancel,
        }),
        role,
        profile,
        room,
        outbound: outbound_rx,
        messages: Arc::clone(&stores.messages),
        settings: ClientSettings::from(chat),
    })
}

/// Unregisters a client that is dropped before its tasks start, e.g. when
/// the upgrade future is dropped or the upgrade fails.
struct UnspawnedGuard {
    context: ClientContext,
    armed: bool,
}

impl UnspawnedGuard {
    fn new(context: ClientContext) -> Self {
        Self {
            context,
            armed: true,
        }
    }

    fn context(&self) -> &ClientContext {
        &self.context
    }

    /// Hands the context over to whoever now owns cleanup.
    fn disarm(&mut self) -> ClientContext {
        self.armed = false;
        self.context.clone()
    }
}

impl Drop for UnspawnedGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }

        self.context.cancel.cancel();
        debug!(
            connection_id = %self.context.connection_id,
            "Attached client dropped before spawn"
        );

        // Without a runtime the hub is gone too; the cancelled token is enough
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            let context = self.context.clone();
            runtime.spawn(async move { context.unregister().await });
        }
    }
}

/// A registered client that does not own a socket yet.
///
/// Dropping it without [`spawn`](Self::spawn) or [`abandon`](Self::abandon)
/// still removes it from its room.
pub struct AttachedClient {
    guard: UnspawnedGuard,
    role: Role,
    profile: Profile,
    room: RoomSnapshot,
    outbound: mpsc::Receiver<OutboundFrame>,
    messages: Arc<dyn MessageStore>,
    settings: ClientSettings,
}

impl AttachedClient {
    pub fn session_id(&self) -> SessionId {
        self.guard.context().session_id
    }

    pub fn user_id(&self) -> UserId {
        self.guard.context().user_id
    }

    pub fn connection_id(&self) -> ConnectionId {
        self.guard.context().connection_id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    /// Room membership at registration time.
    pub fn room(&self) -> &RoomSnapshot {
        &self.room
    }

    /// Starts the read and write tasks on a socket.
    pub fn spawn<R, W>(mut self, reader: R, writer: W) -> ClientTasks
    where
        R: FrameReader,
        W: FrameWriter,
    {
        let context = self.guard.disarm();
        let read = tokio::spawn(connection::read_loop(
            reader,
            context.clone(),
            self.messages,
            self.profile,
            self.settings,
        ));
        let write = tokio::spawn(connection::write_loop(
            writer,
            context,
            self.outbound,
            self.settings,
        ));

        ClientTasks { read, write }
    }

    /// Gives up on a client whose socket never materialised.
    pub async fn abandon(mut self) {
        let context = self.guard.disarm();
        debug!(
            connection_id = %context.connection_id,
            "Abandoning client before socket upgrade"
        );
        context.cancel.cancel();
        context.unregister().await;
    }
}

/// Join handles of a running client.
pub struct ClientTasks {
    pub read: JoinHandle<()>,
    pub write: JoinHandle<()>,
}

impl ClientTasks {
    /// Waits until both tasks have finished.
    pub async fn join(self) {
        let (read, write) = tokio::join!(self.read, self.write);
        for result in [read, write] {
            if let Err(e) = result {
                warn!(error = %e, "Client task failed");
            }
        }
    }
}
