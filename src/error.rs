//! Error taxonomy shared by the stores, the transfer engine, and the gateway.
//!
//! Every operation surfaces one of these kinds verbatim; nothing is
//! recovered locally. The gateway maps each kind to an HTTP status exactly
//! once, in the [`IntoResponse`] impl below. Handlers never re-classify.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed or missing caller-supplied fields. The caller can recover
    /// by correcting its input.
    #[error("{0}")]
    InvalidInput(String),

    /// Uniqueness violation on a caller-chosen identity.
    #[error("{0}")]
    AlreadyExists(String),

    /// Username/secret pair did not match.
    #[error("Invalid username or password")]
    InvalidCredentials,

    /// Bearer token missing or unresolvable.
    #[error("Invalid or missing token")]
    Unauthenticated,

    /// Referenced entity absent or not owned by the caller. One signal for
    /// both cases, so existence never leaks across users.
    #[error("{kind} ({id}) not found")]
    NotFound { kind: &'static str, id: String },

    /// Unanticipated internal fault (storage etc). The carried detail is
    /// logged on the server; the caller only ever sees a generic message.
    #[error("Internal error")]
    Internal(String),
}

impl Error {
    pub fn not_found(kind: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }
}

impl From<rusqlite::Error> for Error {
    fn from(e: rusqlite::Error) -> Self {
        Self::Internal(e.to_string())
    }
}

impl From<anyhow::Error> for Error {
    fn from(e: anyhow::Error) -> Self {
        Self::Internal(format!("{e:#}"))
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::InvalidInput(_) => StatusCode::BAD_REQUEST,
            Self::AlreadyExists(_) => StatusCode::CONFLICT,
            Self::InvalidCredentials | Self::Unauthenticated => StatusCode::UNAUTHORIZED,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::Internal(detail) => {
                tracing::error!("internal error: {detail}");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}
