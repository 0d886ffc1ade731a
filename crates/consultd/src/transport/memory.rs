//! In-process socket pair.
//!
//! [`pair`] returns the two halves a client task owns plus a [`MemoryPeer`]
//! playing the remote participant: it injects inbound frames, observes what
//! the daemon writes, and can hang up or fail the connection.

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::mpsc;

use super::{FrameReader, FrameWriter, TransportError};

/// What the daemon wrote to the socket, as seen by the peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerEvent {
    Text(String),
    Ping,
    Closed,
}

/// Creates a connected reader/writer pair and its remote peer.
pub fn pair() -> (MemoryReader, MemoryWriter, MemoryPeer) {
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

    (
        MemoryReader { inbound: inbound_rx },
        MemoryWriter {
            outbound: outbound_tx,
            closed: false,
        },
        MemoryPeer {
            inbound: Some(inbound_tx),
            outbound: outbound_rx,
        },
    )
}

pub struct MemoryReader {
    inbound: mpsc::UnboundedReceiver<Result<String, TransportError>>,
}

pub struct MemoryWriter {
    outbound: mpsc::UnboundedSender<PeerEvent>,
    closed: bool,
}

#[async_trait]
impl FrameReader for MemoryReader {
    async fn recv(&mut self) -> Result<Option<String>, TransportError> {
        match self.inbound.recv().await {
            Some(Ok(text)) => Ok(Some(text)),
            Some(Err(e)) => Err(e),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl FrameWriter for MemoryWriter {
    async fn send(&mut self, text: String) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        self.outbound
            .send(PeerEvent::Text(text))
            .map_err(|_| TransportError::Closed)
    }

    async fn ping(&mut self) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        self.outbound
            .send(PeerEvent::Ping)
            .map_err(|_| TransportError::Closed)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        // The peer may already be gone
        let _ = self.outbound.send(PeerEvent::Closed);
        Ok(())
    }
}

/// The remote end of an in-memory connection.
pub struct MemoryPeer {
    inbound: Option<mpsc::UnboundedSender<Result<String, TransportError>>>,
    outbound: mpsc::UnboundedReceiver<PeerEvent>,
}

impl MemoryPeer {
    /// Sends a raw text frame to the daemon. Returns false after hang-up.
    pub fn send_text(&self, text: impl Into<String>) -> bool {
        self.inbound
            .as_ref()
            .map(|tx| tx.send(Ok(text.into())).is_ok())
            .unwrap_or(false)
    }

    /// Serializes and sends a frame to the daemon.
    pub fn send_json<T: Serialize>(&self, frame: &T) -> bool {
        match serde_json::to_string(frame) {
            Ok(text) => self.send_text(text),
            Err(_) => false,
        }
    }

    /// Makes the daemon's next read fail with a transport error.
    pub fn fail(&self, reason: &str) -> bool {
        self.inbound
            .as_ref()
            .map(|tx| tx.send(Err(TransportError::Io(reason.to_string()))).is_ok())
            .unwrap_or(false)
    }

    /// Closes the peer's sending side; the daemon reads end-of-stream.
    pub fn hang_up(&mut self) {
        self.inbound = None;
    }

    /// Next event written by the daemon, or `None` once the writer is dropped.
    pub async fn next_event(&mut self) -> Option<PeerEvent> {
        self.outbound.recv().await
    }

    /// Next text frame, skipping pings. `None` once the daemon closed the socket.
    pub async fn recv_text(&mut self) -> Option<String> {
        loop {
            match self.outbound.recv().await? {
                PeerEvent::Text(text) => return Some(text),
                PeerEvent::Ping => continue,
                PeerEvent::Closed => return None,
            }
        }
    }

    /// Text frame already written, if any, without waiting.
    pub fn try_recv_text(&mut self) -> Option<String> {
        loop {
            match self.outbound.try_recv().ok()? {
                PeerEvent::Text(text) => return Some(text),
                PeerEvent::Ping => continue,
                PeerEvent::Closed => return None,
            }
        }
    }
}
