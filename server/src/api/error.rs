//! API Error Types

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::council::CouncilError;

/// Errors surfaced by API handlers.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Deliberation failed with one of the core error kinds.
    #[error(transparent)]
    Council(#[from] CouncilError),

    /// Database error on the analytics read side.
    #[error("Database error")]
    Database(#[from] sqlx::Error),
}

/// Error response body for JSON responses.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Machine-readable error code.
    pub error: String,
    /// Human-readable error message.
    pub message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            Self::Council(CouncilError::Configuration(_)) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "CONFIGURATION_ERROR")
            }
            Self::Council(CouncilError::InsufficientQuorum { .. }) => {
                (StatusCode::SERVICE_UNAVAILABLE, "INSUFFICIENT_QUORUM")
            }
            Self::Council(CouncilError::NoResponses) => (StatusCode::BAD_GATEWAY, "NO_RESPONSES"),
            Self::Council(CouncilError::Synthesis(_)) => {
                (StatusCode::BAD_GATEWAY, "SYNTHESIS_ERROR")
            }
            Self::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        };

        let body = Json(ErrorResponse {
            error: code.to_string(),
            message: self.to_string(),
        });

        (status, body).into_response()
    }
}

/// Result type for API handlers.
pub type ApiResult<T> = Result<T, ApiError>;
