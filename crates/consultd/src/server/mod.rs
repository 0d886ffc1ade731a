//! HTTP/WebSocket server for the consultation chat daemon.
//!
//! The server:
//! - Upgrades `GET /sessions/:id/ws` into a participant client
//! - Exposes session end, history and health routes
//! - Supports graceful shutdown via CancellationToken
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │   ChatServer    │
//! │  axum::serve    │
//! └───────┬─────────┘
//!         │ upgrade
//!         ▼
//! ┌─────────────────┐     ┌─────────────────┐
//! │ Client (2 tasks)│────▶│    HubHandle    │
//! └─────────────────┘     └─────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Handler failures become `ApiError` responses

pub mod error;
pub mod routes;

pub use error::{ApiError, ApiResult};

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::ChatConfig;
use crate::hub::HubHandle;
use crate::store::Stores;

/// Shared state handed to every route.
pub struct AppState {
    pub hub: HubHandle,
    pub stores: Stores,
    pub chat: ChatConfig,
}

impl AppState {
    pub fn new(hub: HubHandle, stores: Stores, chat: ChatConfig) -> Self {
        Self { hub, stores, chat }
    }
}

/// Builds the router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let session_routes = Router::new()
        .route("/:session_id/ws", get(routes::chat_socket))
        .route("/:session_id/end", post(routes::end_session))
        .route("/:session_id/messages", get(routes::history));

    Router::new()
        .nest("/sessions", session_routes)
        .route("/health", get(routes::health))
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(state))
}

/// Errors that can occur in server operations.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {error}")]
    Bind { addr: SocketAddr, error: String },

    #[error("server error: {0}")]
    Serve(String),
}

/// The daemon's HTTP server.
pub struct ChatServer {
    addr: SocketAddr,
    router: Router,
    cancel_token: CancellationToken,
}

impl ChatServer {
    pub fn new(addr: SocketAddr, state: AppState, cancel_token: CancellationToken) -> Self {
        Self {
            addr,
            router: build_router(state),
            cancel_token,
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Binds the configured address and serves until cancelled.
    pub async fn run(self) -> Result<(), ServerError> {
        let listener = TcpListener::bind(self.addr)
            .await
            .map_err(|e| ServerError::Bind {
                addr: self.addr,
                error: e.to_string(),
            })?;
        self.serve(listener).await
    }

    /// Serves on an already bound listener until cancelled.
    pub async fn serve(self, listener: TcpListener) -> Result<(), ServerError> {
        let local = listener.local_addr().map_err(|e| ServerError::Serve(e.to_string()))?;
        info!(addr = %local, "Chat server listening");

        let shutdown = self.cancel_token.clone();
        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                shutdown.cancelled().await;
                info!("Server shutdown requested");
            })
            .await
            .map_err(|e| ServerError::Serve(e.to_string()))?;

        info!("Chat server stopped");
        Ok(())
    }
}
