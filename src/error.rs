//! API error type
//!
//! Everything a handler can fail with funnels into [`ApiError`], which maps
//! onto HTTP status codes. Panel failures are deliberately opaque to callers:
//! the status/body detail is logged where the call was made, and the client
//! sees a generic 500 either way.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::auth::AuthError;
use crate::panel::PanelError;
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum ApiError {
    /// Client-visible input problem (duplicate identity, quota, bad email)
    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("{0} not found")]
    NotFound(&'static str),

    /// The panel call failed; cause is in the log, not the response
    #[error("remote panel request failed")]
    Panel(#[from] PanelError),

    /// The panel rejected a power signal
    #[error("remote action failed")]
    RemoteActionFailed,

    #[error("internal error")]
    Internal(String),
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            // Schema constraints are the authoritative uniqueness check; a
            // violation means a duplicate slipped past the pre-check race.
            StoreError::Duplicate => {
                ApiError::Validation("username, email or server name already in use".to_string())
            }
            StoreError::Db(e) => ApiError::Internal(e.to_string()),
            StoreError::Io(e) => ApiError::Internal(e.to_string()),
        }
    }
}

/// JSON error body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub detail: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail) = match &self {
            ApiError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ApiError::Auth(e) => (e.status_code(), e.to_string()),
            ApiError::NotFound(what) => (StatusCode::NOT_FOUND, format!("{what} not found")),
            ApiError::Panel(e) => {
                tracing::error!("Panel failure: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "remote panel request failed".to_string(),
                )
            }
            ApiError::RemoteActionFailed => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "remote action failed".to_string(),
            ),
            ApiError::Internal(msg) => {
                tracing::error!("Internal error: {msg}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal error".to_string(),
                )
            }
        };

        (status, Json(ErrorResponse { detail })).into_response()
    }
}
