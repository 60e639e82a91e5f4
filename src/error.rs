use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// Caller mistakes. Reported synchronously and never retried.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Message content must not be empty")]
    EmptyContent,
    #[error("Message content must be at most {max} characters")]
    TooLong { max: usize },
    #[error("Invalid message id")]
    InvalidId,
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Invalid request: {0}")]
    Validation(#[from] ValidationError),
    #[error("Invalid request: {0}")]
    BadRequest(String),
    #[error("Not found")]
    NotFound,
    #[error("Store operation timed out")]
    Timeout,
    #[error("Generated message id already exists")]
    IdCollision,
    #[error("Internal server error")]
    Internal,
}

impl AppError {
    /// Transient infrastructure failures that a caller may retry with backoff.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Database(_) | Self::Timeout | Self::IdCollision)
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::Database(e) => {
                tracing::error!(error = %e, "Database error");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
            Self::Validation(e) => {
                tracing::debug!(reason = %e, "Validation failed");
                (StatusCode::BAD_REQUEST, e.to_string())
            }
            Self::BadRequest(msg) => {
                tracing::debug!(message = %msg, "Bad request");
                (StatusCode::BAD_REQUEST, msg)
            }
            Self::NotFound => {
                tracing::debug!("Message not found");
                (StatusCode::NOT_FOUND, "Message not found or expired".to_string())
            }
            Self::Timeout => {
                tracing::error!("Store operation timed out");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
            Self::IdCollision => {
                tracing::error!("Message id collision persisted across retries");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
            Self::Internal => {
                tracing::error!("Internal server error occurred");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
        };

        let body = Json(json!({
            "error": message
        }));

        (status, body).into_response()
    }
}
