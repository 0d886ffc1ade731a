//! Socket abstraction used by client tasks.
//!
//! A connection is split into a [`FrameReader`] owned by the read task and a
//! [`FrameWriter`] owned by the write task. Control frames (ping/pong) are
//! handled inside the adapters; the chat core only sees text frames.
//!
//! Two adapters ship with the daemon:
//! - [`ws`]: axum WebSocket halves
//! - [`memory`]: an in-process pair for embedding and tests

use async_trait::async_trait;
use thiserror::Error;

pub mod memory;
pub mod ws;

/// Errors raised by a socket half.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("connection closed")]
    Closed,

    #[error("transport error: {0}")]
    Io(String),

    #[error("unsupported frame: {0}")]
    Unsupported(String),
}

/// Receiving half of a participant socket.
#[async_trait]
pub trait FrameReader: Send + 'static {
    /// Waits for the next text frame. `Ok(None)` means the peer closed.
    async fn recv(&mut self) -> Result<Option<String>, TransportError>;
}

/// Sending half of a participant socket.
#[async_trait]
pub trait FrameWriter: Send + 'static {
    async fn send(&mut self, text: String) -> Result<(), TransportError>;

    /// Sends a keep-alive probe.
    async fn ping(&mut self) -> Result<(), TransportError>;

    /// Closes the socket. Further sends fail.
    async fn close(&mut self) -> Result<(), TransportError>;
}
