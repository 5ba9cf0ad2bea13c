/// Unified error types for the chain-linked DID service
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for DID issuance and resolution
#[derive(Error, Debug)]
pub enum DidError {
    /// Malformed DID string (caller error, not retryable)
    #[error("Invalid DID: {0}")]
    DidFormat(String),

    /// No active chain-tip for an update/deactivate target
    #[error("No active chain state for {0}")]
    ChainStateNotFound(String),

    /// Issuance output never became visible in the tracked-output store
    #[error("Output {outpoint} not visible after {attempts} attempts")]
    PropagationTimeout { outpoint: String, attempts: u32 },

    /// The DID does not exist anywhere we can look
    #[error("DID not found: {0}")]
    ResolutionNotFound(String),

    /// Issuance is on-chain but no document has followed yet
    #[error("DID not yet propagated: {did}")]
    ResolutionPending { did: String, found_issuance: bool },

    /// Remote resolver or chain indexer unreachable
    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// Transaction construction, signing or submission failed
    #[error("Chain error: {0}")]
    Chain(String),

    /// Key handling errors
    #[error("Crypto error: {0}")]
    Crypto(String),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// JSON errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal server errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// JSON error body
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

/// Convert DidError to HTTP response
impl IntoResponse for DidError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            DidError::DidFormat(_) => (StatusCode::BAD_REQUEST, "invalidDid", self.to_string()),
            DidError::Validation(_) => (StatusCode::BAD_REQUEST, "InvalidRequest", self.to_string()),
            DidError::ChainStateNotFound(_) | DidError::ResolutionNotFound(_) => {
                (StatusCode::NOT_FOUND, "notFound", self.to_string())
            }
            DidError::ResolutionPending { .. } => {
                (StatusCode::ACCEPTED, "notYetPropagated", self.to_string())
            }
            DidError::PropagationTimeout { .. } => (
                StatusCode::SERVICE_UNAVAILABLE,
                "PropagationTimeout",
                self.to_string(),
            ),
            DidError::UpstreamUnavailable(_) | DidError::Chain(_) => {
                (StatusCode::BAD_GATEWAY, "internalError", self.to_string())
            }
            DidError::Internal(_)
            | DidError::Io(_)
            | DidError::Crypto(_)
            | DidError::Serialization(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "InternalServerError",
                "Internal server error".to_string(), // Don't leak details
            ),
        };

        let body = Json(ErrorResponse {
            error: error_code.to_string(),
            message,
        });

        (status, body).into_response()
    }
}

/// Result type alias for DID operations
pub type DidResult<T> = Result<T, DidError>;
