use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;
use validator::ValidationErrors;

use crate::{
    dao::storage::StorageError,
    realtime::RealtimeError,
    state::{AbortError, ApplyError, PlanError, credentials::CredentialError},
};

/// Reasons a join attempt is refused. Codes are stable so the UI can localize them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum JoinRejection {
    /// Nickname empty or only whitespace.
    #[error("nickname is required")]
    EmptyNickname,
    /// No session carries this room code.
    #[error("invalid room code")]
    InvalidCode,
    /// The session left the lobby.
    #[error("game already started")]
    AlreadyStarted,
    /// Every seat is taken.
    #[error("room is full")]
    RoomFull,
}

impl JoinRejection {
    /// Machine-readable code of the rejection.
    pub fn code(self) -> &'static str {
        match self {
            JoinRejection::EmptyNickname => "empty_nickname",
            JoinRejection::InvalidCode => "invalid_code",
            JoinRejection::AlreadyStarted => "already_started",
            JoinRejection::RoomFull => "room_full",
        }
    }
}

/// Errors that can occur in service layer operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Storage backend is unavailable.
    #[error("storage unavailable")]
    Unavailable(#[source] StorageError),
    /// The device lost its datastore connection.
    #[error("storage unavailable (degraded mode)")]
    Degraded,
    /// The change feed could not be opened.
    #[error("change feed unavailable")]
    Realtime(#[source] RealtimeError),
    /// Local credential file could not be read or written.
    #[error("credential storage failed")]
    Credentials(#[source] CredentialError),
    /// Join admission refused the player.
    #[error("join rejected: {0}")]
    Join(JoinRejection),
    /// The device lacks the credential required for the operation.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    /// Invalid input provided by the client.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Operation cannot be performed in the current state.
    #[error("invalid state: {0}")]
    InvalidState(String),
    /// Requested resource was not found.
    #[error("not found: {0}")]
    NotFound(String),
    /// Operation exceeded its timeout limit.
    #[error("operation timed out")]
    Timeout,
}

impl From<StorageError> for ServiceError {
    fn from(err: StorageError) -> Self {
        ServiceError::Unavailable(err)
    }
}

impl From<RealtimeError> for ServiceError {
    fn from(err: RealtimeError) -> Self {
        ServiceError::Realtime(err)
    }
}

impl From<CredentialError> for ServiceError {
    fn from(err: CredentialError) -> Self {
        ServiceError::Credentials(err)
    }
}

impl From<JoinRejection> for ServiceError {
    fn from(err: JoinRejection) -> Self {
        ServiceError::Join(err)
    }
}

impl From<ValidationErrors> for AppError {
    fn from(err: ValidationErrors) -> Self {
        AppError::BadRequest(format!("validation failed: {}", err))
    }
}

/// Application-level errors that are converted to HTTP responses.
#[derive(Debug, Error)]
pub enum AppError {
    /// Bad request with invalid input.
    #[error("bad request: {0}")]
    BadRequest(String),
    /// Join refused, surfaced with its code.
    #[error("{0}")]
    JoinRejected(JoinRejection),
    /// Unauthorized access attempt.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    /// Requested resource not found.
    #[error("not found: {0}")]
    NotFound(String),
    /// Conflict with current state.
    #[error("conflict: {0}")]
    Conflict(String),
    /// Service unavailable or degraded.
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Unavailable(StorageError::Rejected { message }) => {
                AppError::Conflict(message)
            }
            ServiceError::Unavailable(source) => AppError::ServiceUnavailable(source.to_string()),
            ServiceError::Degraded => AppError::ServiceUnavailable("degraded mode".into()),
            ServiceError::Realtime(source) => AppError::ServiceUnavailable(source.to_string()),
            ServiceError::Credentials(source) => AppError::Internal(source.to_string()),
            ServiceError::Join(rejection) => AppError::JoinRejected(rejection),
            ServiceError::Unauthorized(message) => AppError::Unauthorized(message),
            ServiceError::InvalidInput(message) => AppError::BadRequest(message),
            ServiceError::InvalidState(message) => AppError::Conflict(message),
            ServiceError::NotFound(message) => AppError::NotFound(message),
            ServiceError::Timeout => AppError::ServiceUnavailable("operation timed out".into()),
        }
    }
}

/// JSON body of every error response.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    /// Human-readable description.
    pub message: String,
    /// Stable code for errors the UI localizes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, code) = match &self {
            AppError::BadRequest(_) => (StatusCode::BAD_REQUEST, None),
            AppError::JoinRejected(rejection) => {
                let status = match rejection {
                    JoinRejection::EmptyNickname => StatusCode::BAD_REQUEST,
                    JoinRejection::InvalidCode => StatusCode::NOT_FOUND,
                    JoinRejection::AlreadyStarted | JoinRejection::RoomFull => StatusCode::CONFLICT,
                };
                (status, Some(rejection.code().to_string()))
            }
            AppError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, None),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, None),
            AppError::Conflict(_) => (StatusCode::CONFLICT, None),
            AppError::ServiceUnavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, None),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, None),
        };

        let payload = Json(ErrorBody {
            message: self.to_string(),
            code,
        });

        (status, payload).into_response()
    }
}

impl From<PlanError> for ServiceError {
    fn from(err: PlanError) -> Self {
        match err {
            PlanError::AlreadyPending => {
                ServiceError::InvalidState("session transition already pending".into())
            }
            PlanError::InvalidTransition(invalid) => {
                ServiceError::InvalidState(invalid.to_string())
            }
        }
    }
}

impl From<ApplyError> for ServiceError {
    fn from(err: ApplyError) -> Self {
        match err {
            ApplyError::NoPending => ServiceError::InvalidState("no transition is pending".into()),
            ApplyError::IdMismatch { .. } => {
                ServiceError::InvalidState("pending transition does not match".into())
            }
            ApplyError::StatusMismatch { expected, actual } => ServiceError::InvalidState(format!(
                "session changed during transition (expected {expected:?}, got {actual:?})"
            )),
            ApplyError::VersionMismatch { expected, actual } => {
                ServiceError::InvalidState(format!(
                    "state version mismatch during transition (expected {expected}, got {actual})"
                ))
            }
        }
    }
}

impl From<AbortError> for ServiceError {
    fn from(err: AbortError) -> Self {
        match err {
            AbortError::NoPending => ServiceError::InvalidState("no pending transition".into()),
            AbortError::IdMismatch { .. } => {
                ServiceError::InvalidState("transition plan does not match".into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    #[tokio::test]
    async fn join_rejection_exposes_code() {
        let response = AppError::from(ServiceError::Join(JoinRejection::RoomFull)).into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["code"], "room_full");
        assert_eq!(value["message"], "room is full");
    }

    #[test]
    fn storage_rejection_maps_to_conflict() {
        let err = AppError::from(ServiceError::from(StorageError::rejected("duplicate code")));
        assert!(matches!(err, AppError::Conflict(message) if message == "duplicate code"));
    }
}
