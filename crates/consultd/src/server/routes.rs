//! Route handlers.
//!
//! - `GET /sessions/:session_id/ws` - join a session's chat
//! - `POST /sessions/:session_id/end` - end a session
//! - `GET /sessions/:session_id/messages` - persisted history
//! - `GET /health` - liveness and room count

use std::sync::Arc;

use axum::{
    extract::{ws::WebSocketUpgrade, Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use consult_core::{Role, SessionId, StoredMessage, UserId};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::error::{ApiError, ApiResult};
use super::AppState;
use crate::client::{attach, authorize, ConnectRequest};
use crate::transport::ws;

/// Header carrying the authenticated user id.
pub const USER_ID_HEADER: &str = "x-user-id";

/// Header carrying the authenticated role (`doctor` or `patient`).
pub const USER_ROLE_HEADER: &str = "x-user-role";

/// Reads the identity set by the upstream authentication gateway.
pub fn identity(headers: &HeaderMap) -> ApiResult<(UserId, Role)> {
    let user_id = header(headers, USER_ID_HEADER)?
        .parse::<UserId>()
        .map_err(|e| ApiError::Unauthorized(e.to_string()))?;
    let role = header(headers, USER_ROLE_HEADER)?
        .parse::<Role>()
        .map_err(|e| ApiError::Unauthorized(e.to_string()))?;

    Ok((user_id, role))
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> ApiResult<&'a str> {
    headers
        .get(name)
        .ok_or_else(|| ApiError::Unauthorized(format!("missing {name} header")))?
        .to_str()
        .map_err(|_| ApiError::Unauthorized(format!("invalid {name} header")))
}

/// GET /sessions/:session_id/ws
///
/// Checks the caller before upgrading, so an ended session answers 410 and
/// a stranger 403 without ever opening a socket. A request that is not an
/// upgrade gets 426 and never touches the room: only a new socket may
/// replace the caller's live connection.
pub async fn chat_socket(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<SessionId>,
    headers: HeaderMap,
    upgrade: Option<WebSocketUpgrade>,
) -> ApiResult<Response> {
    let (user_id, role) = identity(&headers)?;
    let request = ConnectRequest {
        session_id,
        user_id,
        role,
    };

    let Some(upgrade) = upgrade else {
        authorize(&state.stores, request).await?;
        debug!(session_id = %session_id, user_id = %user_id, "Chat request without upgrade");
        return Err(ApiError::UpgradeRequired);
    };

    let client = attach(&state.hub, &state.stores, &state.chat, request).await?;
    let connection_id = client.connection_id();

    // A client dropped with a failed or abandoned upgrade unregisters itself
    let response = upgrade
        // Hard transport cap; oversized frames below it get an error notice
        .max_message_size(state.chat.max_frame_bytes.saturating_mul(2))
        .on_failed_upgrade(move |e| {
            warn!(session_id = %session_id, user_id = %user_id, error = %e, "WebSocket upgrade failed");
        })
        .on_upgrade(move |socket| async move {
            let (reader, writer) = ws::split(socket);
            client.spawn(reader, writer).join().await;
            debug!(connection_id = %connection_id, "WebSocket connection finished");
        });

    Ok(response)
}

#[derive(Debug, Serialize)]
pub struct EndSessionResponse {
    pub session_id: SessionId,
    pub room_closed: bool,
}

/// POST /sessions/:session_id/end
pub async fn end_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<SessionId>,
) -> ApiResult<Json<EndSessionResponse>> {
    state.stores.sessions.end_session(session_id).await?;

    // The end watcher does the same; whichever arrives second is a no-op
    let room_closed = state.hub.end_session(session_id).await?;

    info!(session_id = %session_id, room_closed, "Session ended via API");
    Ok(Json(EndSessionResponse {
        session_id,
        room_closed,
    }))
}

/// GET /sessions/:session_id/messages
pub async fn history(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<SessionId>,
) -> ApiResult<Json<Vec<StoredMessage>>> {
    let messages = state.stores.messages.history(session_id).await?;
    Ok(Json(messages))
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub rooms: usize,
    pub version: &'static str,
}

/// GET /health
pub async fn health(State(state): State<Arc<AppState>>) -> Response {
    if !state.hub.is_connected() {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(HealthResponse {
                status: "unhealthy",
                rooms: 0,
                version: env!("CARGO_PKG_VERSION"),
            }),
        )
            .into_response();
    }

    Json(HealthResponse {
        status: "ok",
        rooms: state.hub.room_count().await,
        version: env!("CARGO_PKG_VERSION"),
    })
    .into_response()
}
