use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;
use tourney_core::sync::{ErrorKind, SyncError};

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Invalid request: {0}")]
    BadRequest(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Rate limited: {0}")]
    RateLimited(String),
    #[error("External dependency error: {0}")]
    External(String),
    #[error("Service unavailable: {0}")]
    Unavailable(String),
    #[error("Internal server error: {0}")]
    Internal(String),
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

impl AppError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }
}

impl From<SyncError> for AppError {
    fn from(error: SyncError) -> Self {
        let message = error.to_string();
        match error.kind() {
            ErrorKind::InvalidInput | ErrorKind::InvalidInterval | ErrorKind::Mapping => {
                Self::BadRequest(message)
            }
            ErrorKind::NotFound => Self::NotFound(message),
            ErrorKind::Conflict | ErrorKind::OwnershipViolation | ErrorKind::AlreadyRunning => {
                Self::Conflict(message)
            }
            ErrorKind::RateLimited => Self::RateLimited(message),
            ErrorKind::RemoteFault
            | ErrorKind::Unreachable
            | ErrorKind::Timeout
            | ErrorKind::Rejected
            | ErrorKind::InvalidPayload
            | ErrorKind::ConfirmationFailed => Self::External(message),
            ErrorKind::Disabled => Self::Unavailable(message),
            ErrorKind::InvalidConfiguration | ErrorKind::Store => Self::Internal(message),
        }
    }
}

impl From<tourney_core::Error> for AppError {
    fn from(error: tourney_core::Error) -> Self {
        SyncError::from(error).into()
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            Self::External(_) => StatusCode::BAD_GATEWAY,
            Self::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!(%status, "Request failed: {self}");
        }
        let body = ErrorBody {
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
