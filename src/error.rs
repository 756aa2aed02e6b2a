//! # Error Handling
//!
//! Two error surfaces live here:
//!
//! - **AppError**: errors on the HTTP surface (config endpoints, call
//!   inspection). Converted to JSON error responses via actix's
//!   `ResponseError` trait.
//! - **BridgeError**: errors inside the audio relay. These are never
//!   process-fatal and never reach an HTTP response; the relay distinguishes
//!   them structurally so callers can tell a transient send failure from a
//!   closed transport or a malformed frame instead of pattern-matching log
//!   text.
//!
//! ## Error Categories (HTTP):
//! - **Internal**: Server-side problems (500 errors)
//! - **BadRequest**: Client sent invalid data (400 errors)
//! - **NotFound**: Requested resource doesn't exist (404 errors)
//! - **ConfigError**: Configuration problems (500 errors)
//! - **ValidationError**: Data validation failed (400 errors)

use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use std::fmt;

/// Custom error types for the HTTP surface of the application.
#[derive(Debug)]
pub enum AppError {
    /// Internal server errors (lock poisoning, unexpected state, etc.)
    Internal(String),

    /// Client sent invalid or malformed data
    BadRequest(String),

    /// Requested resource was not found (e.g. unknown call id)
    NotFound(String),

    /// Configuration file or environment variable problems
    ConfigError(String),

    /// User input failed validation rules
    ValidationError(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
            AppError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            AppError::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppError::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
            AppError::ValidationError(msg) => write!(f, "Validation error: {}", msg),
        }
    }
}

/// Converts our custom errors into JSON HTTP responses.
///
/// ## HTTP Status Code Mapping:
/// - Internal/ConfigError → 500 (Internal Server Error)
/// - BadRequest/ValidationError → 400 (Bad Request)
/// - NotFound → 404 (Not Found)
impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        let (status, error_type, message) = match self {
            AppError::Internal(msg) => (
                actix_web::http::StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                msg.clone(),
            ),
            AppError::BadRequest(msg) => (
                actix_web::http::StatusCode::BAD_REQUEST,
                "bad_request",
                msg.clone(),
            ),
            AppError::NotFound(msg) => (
                actix_web::http::StatusCode::NOT_FOUND,
                "not_found",
                msg.clone(),
            ),
            AppError::ConfigError(msg) => (
                actix_web::http::StatusCode::INTERNAL_SERVER_ERROR,
                "config_error",
                msg.clone(),
            ),
            AppError::ValidationError(msg) => (
                actix_web::http::StatusCode::BAD_REQUEST,
                "validation_error",
                msg.clone(),
            ),
        };

        HttpResponse::build(status).json(json!({
            "error": {
                "type": error_type,
                "message": message,
                "timestamp": chrono::Utc::now().to_rfc3339()
            }
        }))
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::BadRequest(format!("JSON parsing error: {}", err))
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::ConfigError(err.to_string())
    }
}

/// Type alias for Results that use our custom error type.
pub type AppResult<T> = Result<T, AppError>;

/// Errors raised inside the audio relay.
///
/// ## Taxonomy:
/// - **Transport**: one outbound message failed to send. Transient — the
///   transmitter logs it and keeps draining; the message is not retried.
/// - **TransportClosed**: the WebSocket leg is gone. Graceful session end,
///   handled by stopping the bridge rather than escalating.
/// - **Malformed**: an inbound frame could not be decoded (bad JSON, bad
///   base64). The frame is dropped and dispatch continues.
///
/// Keeping these as distinct variants rather than one catch-all log line lets
/// the dispatcher and transmitter decide structurally which failures end the
/// session and which are survivable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeError {
    /// A single outbound send failed; the pipeline must continue.
    Transport(String),

    /// The transport connection is closed; the session is over.
    TransportClosed,

    /// An inbound frame was undecodable and has been dropped.
    Malformed(String),
}

impl BridgeError {
    /// Whether the relay should carry on after this error.
    ///
    /// Only a closed transport ends the session; everything else is contained
    /// to the frame that caused it.
    pub fn is_transient(&self) -> bool {
        !matches!(self, BridgeError::TransportClosed)
    }
}

impl fmt::Display for BridgeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BridgeError::Transport(msg) => write!(f, "transport send failed: {}", msg),
            BridgeError::TransportClosed => write!(f, "transport connection closed"),
            BridgeError::Malformed(msg) => write!(f, "malformed inbound frame: {}", msg),
        }
    }
}

impl std::error::Error for BridgeError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_error_display() {
        let err = AppError::NotFound("call 123".to_string());
        assert_eq!(err.to_string(), "Not found: call 123");
    }

    #[test]
    fn test_bridge_error_transience() {
        assert!(BridgeError::Transport("mailbox full".to_string()).is_transient());
        assert!(BridgeError::Malformed("bad base64".to_string()).is_transient());
        assert!(!BridgeError::TransportClosed.is_transient());
    }

    #[test]
    fn test_bridge_error_display() {
        let err = BridgeError::Malformed("invalid padding".to_string());
        assert_eq!(err.to_string(), "malformed inbound frame: invalid padding");
        assert_eq!(
            BridgeError::TransportClosed.to_string(),
            "transport connection closed"
        );
    }
}
