//! Error types for the Los Libros reader
//!
//! `ReaderError` is the reading engine's taxonomy. Only
//! [`ReaderError::DocumentUnreadable`] is meant to reach the user as a blocking
//! error; every other kind degrades functionality and is logged.
//!
//! `AppError` is the persistence server's error, rendered as a JSON body.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Reading engine result type
pub type ReaderResult<T> = std::result::Result<T, ReaderError>;

/// Reading engine error type
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ReaderError {
    /// The container could not be fetched or parsed. Terminal for the session.
    #[error("Document unreadable: {0}")]
    DocumentUnreadable(String),

    /// An address could not be mapped back onto the loaded document.
    #[error("Address resolution failed: {0}")]
    ResolutionFailed(String),

    /// The remote store could not be reached or rejected the call.
    #[error("Persistence unavailable: {0}")]
    PersistenceUnavailable(String),

    #[error("Annotation not found: {0}")]
    AnnotationNotFound(String),

    #[error("No text is selected")]
    EmptySelection,

    /// The renderer is mid-transition or not mounted.
    #[error("Renderer not ready")]
    NotReady,

    #[error("Local cache error: {0}")]
    LocalCache(String),
}

impl ReaderError {
    /// Whether this error must be surfaced to the reader as a terminal state
    pub fn is_blocking(&self) -> bool {
        matches!(self, ReaderError::DocumentUnreadable(_))
    }
}

impl From<crate::epub::EpubError> for ReaderError {
    fn from(e: crate::epub::EpubError) -> Self {
        ReaderError::DocumentUnreadable(e.to_string())
    }
}

impl From<crate::cfi::CfiParseError> for ReaderError {
    fn from(e: crate::cfi::CfiParseError) -> Self {
        ReaderError::ResolutionFailed(e.to_string())
    }
}

/// Server result type
pub type Result<T> = std::result::Result<T, AppError>;

/// Persistence server error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg.clone()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg.clone()),
            AppError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "unauthorized",
                "Missing or invalid bearer credential".to_string(),
            ),
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".to_string(),
                )
            }
            AppError::Database(e) => {
                tracing::error!("Database error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "database_error",
                    "Database error".to_string(),
                )
            }
            AppError::Json(e) => {
                tracing::error!("JSON error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "encoding_error",
                    "Failed to encode stored data".to_string(),
                )
            }
        };

        let body = Json(ErrorResponse {
            error: error_type.to_string(),
            message,
            details: if cfg!(debug_assertions) {
                Some(self.to_string())
            } else {
                None
            },
        });

        (status, body).into_response()
    }
}
