//! Session room hub using the Actor pattern.
//!
//! The hub is the single authority over which consultation rooms exist and
//! who is in them. It receives commands via a tokio mpsc channel and applies
//! them one at a time, so registry reads-then-writes never interleave.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌─────────────────┐     ┌─────────────────┐
//! │  Client tasks   │────▶│    HubActor     │────▶│ Outbound queues │
//! └─────────────────┘     └─────────────────┘     └─────────────────┘
//!         │                       │                       │
//!         │   HubCommand          │   try_send            │
//!         │   (mpsc channel)      │   (never blocks)      │
//!         ▼                       ▼                       ▼
//!  Register/Unregister     HashMap<SessionId,       Write task per
//!  Broadcast/EndSession    Room>                    connection
//! ```
//!
//! Session-end transitions reach the hub through [`watch_session_ends`],
//! which forwards the session store's "ended" events as `EndSession`.

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use consult_core::SessionId;

mod actor;
mod commands;
mod handle;
mod room;

pub use actor::{HubActor, MAX_ENDED_SESSIONS};
pub use commands::{HubCommand, HubError, LeaveReason, Registration, RoomEvent};
pub use handle::HubHandle;
pub use room::{BroadcastOutcome, ClientHandle, Eviction, OutboundFrame, Room, RoomSnapshot};

/// Default command buffer size
pub const DEFAULT_COMMAND_BUFFER: usize = 256;

/// Room event buffer size
const EVENT_BUFFER: usize = 256;

/// Spawn the hub actor and return a handle for interaction.
pub fn spawn_hub(command_buffer: usize) -> HubHandle {
    let (cmd_tx, cmd_rx) = mpsc::channel(command_buffer.max(1));
    let (event_tx, _) = broadcast::channel(EVENT_BUFFER);

    let actor = HubActor::new(cmd_rx, event_tx.clone());
    tokio::spawn(actor.run());

    HubHandle::new(cmd_tx, event_tx)
}

/// Spawn a task that ends rooms as the session store reports ended sessions.
///
/// The task stops when the store's channel closes or the hub shuts down.
pub fn watch_session_ends(
    hub: HubHandle,
    mut ended: broadcast::Receiver<SessionId>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match ended.recv().await {
                Ok(session_id) => {
                    info!(session_id = %session_id, "Session ended upstream");
                    if hub.end_session(session_id).await.is_err() {
                        debug!("Session end watcher stopping: hub channel closed");
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(skipped = n, "Session end watcher lagged, skipped events");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Session end channel closed");
                    break;
                }
            }
        }
    })
}
