use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::services::conversation::ContextError;
use crate::services::learning::LearningError;
use crate::services::optimizer::OptimizerError;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("Collaborator error: {0}")]
    CollaboratorError(String),

    #[error("Deadline exceeded: {0}")]
    Timeout(String),
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match self {
            ApiError::NotFound(msg) => {
                tracing::warn!("Not found: {}", msg);
                (StatusCode::NOT_FOUND, "NotFound", msg)
            }
            ApiError::BadRequest(msg) => {
                tracing::warn!("Bad request: {}", msg);
                (StatusCode::BAD_REQUEST, "BadRequest", msg)
            }
            ApiError::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "InternalError", msg)
            }
            ApiError::CollaboratorError(msg) => {
                tracing::error!("Collaborator error: {}", msg);
                (StatusCode::SERVICE_UNAVAILABLE, "CollaboratorError", msg)
            }
            ApiError::Timeout(msg) => {
                tracing::warn!("Deadline exceeded: {}", msg);
                (StatusCode::GATEWAY_TIMEOUT, "Timeout", msg)
            }
        };

        let body = Json(ErrorResponse {
            error: error_type.to_string(),
            message,
        });

        (status, body).into_response()
    }
}

impl From<ContextError> for ApiError {
    fn from(err: ContextError) -> Self {
        match err {
            ContextError::InvalidSessionId(_) => ApiError::BadRequest(err.to_string()),
            ContextError::SessionNotFound(_) => ApiError::NotFound(err.to_string()),
            ContextError::InvalidPreferences => ApiError::BadRequest(err.to_string()),
        }
    }
}

impl From<LearningError> for ApiError {
    fn from(err: LearningError) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

impl From<OptimizerError> for ApiError {
    fn from(err: OptimizerError) -> Self {
        match err {
            OptimizerError::DeadlineExceeded { .. } => ApiError::Timeout(err.to_string()),
            OptimizerError::Dispatch { .. } | OptimizerError::ResultCountMismatch { .. } => {
                ApiError::CollaboratorError(err.to_string())
            }
            OptimizerError::Cancelled => ApiError::InternalError(err.to_string()),
        }
    }
}
