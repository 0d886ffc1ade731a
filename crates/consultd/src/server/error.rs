//! HTTP error responses.
//!
//! Registration failures are reported before the WebSocket upgrade, so a
//! participant learns why they cannot join from the status code alone.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use consult_core::StoreError;
use serde::Serialize;
use thiserror::Error;

use crate::client::ClientError;
use crate::hub::HubError;

/// API error types
#[derive(Error, Debug)]
pub enum ApiError {
    /// Missing or malformed identity headers
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The user is not a participant of the session in the claimed role
    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// The session is not (or no longer) ongoing
    #[error("chat already ended")]
    ChatEnded,

    /// The request was not a WebSocket upgrade
    #[error("websocket upgrade required")]
    UpgradeRequired,

    /// A collaborator or the hub is unavailable
    #[error("service unavailable: {0}")]
    Unavailable(String),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Error response body
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

/// Error details
#[derive(Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::ChatEnded => StatusCode::GONE,
            Self::UpgradeRequired => StatusCode::UPGRADE_REQUIRED,
            Self::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::NotFound(_) => "NOT_FOUND",
            Self::ChatEnded => "CHAT_ENDED",
            Self::UpgradeRequired => "UPGRADE_REQUIRED",
            Self::Unavailable(_) => "SERVICE_UNAVAILABLE",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::SessionNotFound(_) | StoreError::ProfileNotFound(_) => {
                Self::NotFound(err.to_string())
            }
            StoreError::SessionNotOngoing { .. } => Self::ChatEnded,
            StoreError::Rejected(_) => Self::Internal(err.to_string()),
            StoreError::Unavailable(_) => Self::Unavailable(err.to_string()),
        }
    }
}

impl From<HubError> for ApiError {
    fn from(err: HubError) -> Self {
        match err {
            HubError::SessionNotOngoing(_) => Self::ChatEnded,
            HubError::Forbidden { .. } => Self::Forbidden(err.to_string()),
            HubError::ChannelClosed => Self::Unavailable(err.to_string()),
        }
    }
}

impl From<ClientError> for ApiError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::Hub(e) => e.into(),
            ClientError::Store(e) | ClientError::Persistence(e) => e.into(),
            ClientError::Decode(e) => Self::Internal(e.to_string()),
            ClientError::Transport(e) => Self::Unavailable(e.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code();

        if status.is_server_error() {
            tracing::error!(error_code = code, error_message = %self, "API error occurred");
        } else {
            tracing::debug!(error_code = code, error_message = %self, "Request rejected");
        }

        let body = ErrorResponse {
            error: ErrorBody {
                code,
                message: self.to_string(),
            },
        };

        (status, Json(body)).into_response()
    }
}

/// Result type for API operations
pub type ApiResult<T> = Result<T, ApiError>;
