//! axum WebSocket adapter.

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tracing::debug;

use super::{FrameReader, FrameWriter, TransportError};

/// Splits an upgraded socket into its reader and writer halves.
pub fn split(socket: WebSocket) -> (WsReader, WsWriter) {
    let (sink, stream) = socket.split();
    (WsReader { stream }, WsWriter { sink })
}

pub struct WsReader {
    stream: SplitStream<WebSocket>,
}

pub struct WsWriter {
    sink: SplitSink<WebSocket, Message>,
}

#[async_trait]
impl FrameReader for WsReader {
    async fn recv(&mut self) -> Result<Option<String>, TransportError> {
        loop {
            let Some(result) = self.stream.next().await else {
                return Ok(None);
            };

            match result.map_err(|e| TransportError::Io(e.to_string()))? {
                Message::Text(text) => return Ok(Some(text)),
                Message::Binary(bytes) => {
                    return String::from_utf8(bytes)
                        .map(Some)
                        .map_err(|_| TransportError::Unsupported("non-UTF-8 binary frame".to_string()));
                }
                // axum answers pings itself
                Message::Ping(_) | Message::Pong(_) => continue,
                Message::Close(frame) => {
                    debug!(frame = ?frame, "Peer sent close frame");
                    return Ok(None);
                }
            }
        }
    }
}

#[async_trait]
impl FrameWriter for WsWriter {
    async fn send(&mut self, text: String) -> Result<(), TransportError> {
        self.sink
            .send(Message::Text(text))
            .await
            .map_err(|e| TransportError::Io(e.to_string()))
    }

    async fn ping(&mut self) -> Result<(), TransportError> {
        self.sink
            .send(Message::Ping(Vec::new()))
            .await
            .map_err(|e| TransportError::Io(e.to_string()))
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.sink
            .close()
            .await
            .map_err(|e| TransportError::Io(e.to_string()))
    }
}
