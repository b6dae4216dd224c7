use crate::store::errors::StoreError;
use crate::types::RequestType;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error as ThisError;

#[derive(ThisError, Debug)]
pub enum Error {
    /// Client API key missing, unknown, or inactive
    #[error("Not authenticated")]
    Unauthenticated,

    /// Provider tag with no registered adapter. A configuration error, never
    /// resolved by falling back to a default adapter.
    #[error("Unknown provider: {tag}")]
    UnknownProvider { tag: String },

    /// Explicitly named network that does not exist
    #[error("Network not found: {name}")]
    UnknownNetwork { name: String },

    /// Network has no stored credential but its provider requires one
    #[error("No API credential configured for network {network}")]
    MissingCredential { network: String },

    /// Credential encryption or decryption failure. Must abort the call -
    /// a request is never dispatched unauthenticated.
    #[error("Credential error: {message}")]
    Credential { message: String },

    /// The user's configured request ceiling for this network is exhausted
    #[error("Rate limit exceeded for network {network}")]
    QuotaExceeded { network: String },

    /// Automatic selection found no active network with remaining quota
    #[error("No available network for request type {request_type}")]
    NoAvailableNetwork { request_type: RequestType },

    /// Upstream provider returned a non-success status
    #[error("Upstream returned {status}: {body}")]
    Upstream { status: u16, body: String },

    /// Missing or malformed required payload field (no audio data, no prompt, ...)
    #[error("{message}")]
    Validation { message: String },

    /// Storage operation error
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Unexpected error with full context chain
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::Unauthenticated => StatusCode::UNAUTHORIZED,
            Error::UnknownProvider { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Error::UnknownNetwork { .. } => StatusCode::NOT_FOUND,
            Error::MissingCredential { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Error::Credential { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Error::QuotaExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            Error::NoAvailableNetwork { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Error::Upstream { .. } => StatusCode::BAD_GATEWAY,
            Error::Validation { .. } => StatusCode::BAD_REQUEST,
            Error::Store(store_err) => match store_err {
                StoreError::NotFound => StatusCode::NOT_FOUND,
                StoreError::UniqueViolation { .. } => StatusCode::CONFLICT,
                StoreError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Error::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether this failure signals a rate-limit condition upstream.
    ///
    /// Drives the one-shot fallback: an upstream 429, or a rate-limit phrase
    /// in the upstream body, makes the orchestrator retry once against a free
    /// network of the same type. Every other failure is terminal.
    pub fn is_rate_limited(&self) -> bool {
        match self {
            Error::Upstream { status, body } => {
                *status == 429 || {
                    let body = body.to_lowercase();
                    body.contains("rate limit") || body.contains("rate_limit")
                }
            }
            _ => false,
        }
    }

    /// Returns a user-safe error message, without leaking internal implementation details
    pub fn user_message(&self) -> String {
        match self {
            Error::Unauthenticated => "Authentication required".to_string(),
            Error::UnknownProvider { tag } => format!("Provider {tag} is not supported"),
            Error::UnknownNetwork { name } => format!("Network not found: {name}"),
            Error::MissingCredential { network } => {
                format!("Network {network} is not configured for use")
            }
            Error::Credential { .. } => "Internal server error".to_string(),
            Error::QuotaExceeded { network } => {
                format!("Rate limit exceeded for network {network}")
            }
            Error::NoAvailableNetwork { request_type } => {
                format!("No available network for request type {request_type}")
            }
            Error::Upstream { status, .. } => format!("Upstream provider returned {status}"),
            Error::Validation { message } => message.clone(),
            Error::Store(StoreError::NotFound) => "Resource not found".to_string(),
            Error::Store(StoreError::UniqueViolation { .. }) => "Resource already exists".to_string(),
            Error::Store(StoreError::Other(_)) | Error::Other(_) => "Internal server error".to_string(),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        // Log full error details for debugging - different log levels based on severity
        match &self {
            Error::Store(StoreError::Other(_)) | Error::Other(_) | Error::Credential { .. } => {
                tracing::error!("Internal service error: {:#}", self);
            }
            Error::UnknownProvider { .. } | Error::MissingCredential { .. } => {
                tracing::error!("Configuration error: {}", self);
            }
            Error::Upstream { .. } => {
                tracing::warn!("Upstream error: {}", self);
            }
            Error::QuotaExceeded { .. } | Error::NoAvailableNetwork { .. } => {
                tracing::info!("Quota rejection: {}", self);
            }
            Error::Unauthenticated => {
                tracing::info!("Authorization error: {}", self);
            }
            _ => {
                tracing::debug!("Client error: {}", self);
            }
        }

        let body = json!({
            "status": "failed",
            "error_message": self.user_message(),
        });

        (self.status_code(), axum::response::Json(body)).into_response()
    }
}

/// Type alias for service operation results
pub type Result<T> = std::result::Result<T, Error>;
