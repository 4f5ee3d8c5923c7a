use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::constants::ERR_DATABASE_OPERATION;
use crate::models::ApiResponse;

/// The errors a request handler can surface to a client.
///
/// Every variant maps to a `{ success: false, message }` JSON body. Variants
/// carrying internal detail (`Database`, `Internal`) log it and send a
/// generic message instead.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Missing or malformed input: out-of-range amount, unknown kind or
    /// category, unparseable id or date.
    #[error("{0}")]
    InvalidInput(String),

    /// A would-be expense pushes the balance below zero. The whole mutation
    /// is rejected with no partial write.
    #[error("{0}")]
    InsufficientBalance(String),

    /// Wrong email/password combination or wrong current password.
    #[error("{0}")]
    InvalidCredentials(String),

    /// The referenced user, transaction, or budget does not exist.
    #[error("{0}")]
    NotFound(String),

    /// Duplicate key: an email already registered, or a budget already
    /// present for the same (user, month, year).
    #[error("{0}")]
    Conflict(String),

    /// The storage connection is down; the message carries the connection
    /// diagnostics.
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    /// A storage operation failed. The string is context for the server log.
    #[error("Database error: {0}")]
    Database(String),

    /// Anything else. Logged, never shown to the client.
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    /// Wraps a failed libsql call with context for the server log.
    pub fn db<E: std::fmt::Display>(context: &str) -> impl FnOnce(E) -> ApiError + '_ {
        move |e| ApiError::Database(format!("{context}: {e}"))
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::InvalidInput(_) | ApiError::InsufficientBalance(_) => StatusCode::BAD_REQUEST,
            ApiError::InvalidCredentials(_) => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::StorageUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Database(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = match &self {
            ApiError::Database(context) => {
                tracing::error!("database error: {context}");
                ERR_DATABASE_OPERATION.to_string()
            }
            ApiError::Internal(e) => {
                tracing::error!("internal error: {e:#}");
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };

        (status, Json(ApiResponse::<()>::failure(message))).into_response()
    }
}
