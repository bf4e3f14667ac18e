//! Error types for the presence engine
//!
//! Infra failures (store, database, broker) are recovered at component
//! boundaries and surfaced as degraded-but-valid results; only domain
//! failures reach callers as errors. Nothing here is fatal to the host
//! process.

use hyper::StatusCode;
use uuid::Uuid;

/// The presence store is unreachable or timed out.
///
/// A dedicated type rather than a variant so store callers can see from the
/// signature that this is the only way a primitive fails. Callers degrade to
/// a zero/default value instead of retrying inside the request path.
#[derive(Debug, Clone, thiserror::Error)]
#[error("presence store unavailable: {0}")]
pub struct StoreUnavailable(pub String);

/// Main error type for engine operations
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    StoreUnavailable(#[from] StoreUnavailable),

    #[error("community not found: {0}")]
    CommunityNotFound(Uuid),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Broadcast error: {0}")]
    Broadcast(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Convert error to HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::CommunityNotFound(_) => StatusCode::NOT_FOUND,
            Self::Database(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Broadcast(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Convert to status code and body tuple for HTTP responses
    pub fn into_status_code_and_body(self) -> (StatusCode, String) {
        let status = self.status_code();
        let body = self.to_string();
        (status, body)
    }
}

// From conversions for common error types

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        Self::Internal(format!("JSON error: {}", err))
    }
}

impl From<mongodb::error::Error> for EngineError {
    fn from(err: mongodb::error::Error) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<async_nats::Error> for EngineError {
    fn from(err: async_nats::Error) -> Self {
        Self::Broadcast(err.to_string())
    }
}

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;
