//! # Error Handling
//!
//! Custom error types and their conversion to HTTP responses. Every stage of
//! the request pipeline (intake, validation, recognition) returns explicit
//! `Result` values; this module maps the error kinds to status codes at the
//! handler boundary so no raw failure ever escapes as a stack trace.
//!
//! ## Error Taxonomy:
//! - **MissingUpload**: The `audioFile` field was absent → 400. Nothing was
//!   written to disk, so there is nothing to clean up.
//! - **InvalidFormat**: The container is readable but not mono/16-bit/PCM → 400.
//!   The temp file was already written; the scoped guard still removes it.
//! - **Processing**: I/O, WAV decode, or engine failure → 500.
//! - **Timeout**: Recognition exceeded the configured bound → 500.
//! - **Config**: Runtime configuration access problems → 500.
//!
//! ## Response body:
//! All error responses use the wire shape existing clients parse:
//! `{"error": "<message>"}`.

use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use std::fmt;

/// Custom error types for the application.
#[derive(Debug)]
pub enum AppError {
    /// The request did not contain the expected audio file field
    MissingUpload(String),

    /// The uploaded audio is not mono 16-bit uncompressed PCM
    InvalidFormat(String),

    /// File I/O, container decode, or recognition engine failure
    Processing(String),

    /// Recognition did not finish within the configured bound
    Timeout(String),

    /// Configuration access problems at request time
    Config(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::MissingUpload(msg) => write!(f, "Missing upload: {}", msg),
            AppError::InvalidFormat(msg) => write!(f, "Invalid format: {}", msg),
            AppError::Processing(msg) => write!(f, "Processing error: {}", msg),
            AppError::Timeout(msg) => write!(f, "Timeout: {}", msg),
            AppError::Config(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

/// Converts errors into the `{"error": "<message>"}` JSON responses.
///
/// ## HTTP Status Code Mapping:
/// - MissingUpload / InvalidFormat → 400 (Bad Request)
/// - Processing / Timeout / Config → 500 (Internal Server Error)
impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        let (status, message) = match self {
            AppError::MissingUpload(msg) => {
                (actix_web::http::StatusCode::BAD_REQUEST, msg.clone())
            }
            AppError::InvalidFormat(msg) => {
                (actix_web::http::StatusCode::BAD_REQUEST, msg.clone())
            }
            AppError::Processing(msg) => (
                actix_web::http::StatusCode::INTERNAL_SERVER_ERROR,
                msg.clone(),
            ),
            AppError::Timeout(msg) => (
                actix_web::http::StatusCode::INTERNAL_SERVER_ERROR,
                msg.clone(),
            ),
            AppError::Config(msg) => (
                actix_web::http::StatusCode::INTERNAL_SERVER_ERROR,
                msg.clone(),
            ),
        };

        HttpResponse::build(status).json(json!({ "error": message }))
    }
}

/// Anything that bubbled up through anyhow is a processing failure by the
/// time it reaches the handler boundary.
impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Processing(format!("An error occurred during processing: {}", err))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Processing(format!("An error occurred during processing: {}", err))
    }
}

/// Type alias for Results that use our custom error type.
pub type AppResult<T> = Result<T, AppError>;
