//! Client error types

use std::time::Duration;
use thiserror::Error;

/// Client error types
#[derive(Debug, Error)]
pub enum ClientError {
    /// Network or request error
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Server returned an error status
    #[error("Server error {status}: {message}")]
    ServerError { status: u16, message: String },

    /// Credentials were rejected or have expired
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Resource not found
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Bad request
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Forbidden
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Too many requests
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// GraphQL response carried errors
    #[error("GraphQL error: {}", .messages.join("; "))]
    GraphQl { messages: Vec<String> },

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// The session could not be renewed after an authentication failure
    #[error("Session renewal failed: {0}")]
    RenewalFailed(#[from] RenewalError),
}

impl ClientError {
    /// Create error from HTTP status code
    pub fn from_status(status: reqwest::StatusCode, message: String) -> Self {
        match status.as_u16() {
            400 => Self::BadRequest(message),
            401 => Self::AuthenticationFailed(message),
            403 => Self::Forbidden(message),
            404 => Self::NotFound(message),
            429 => Self::RateLimited(message),
            _ => Self::ServerError {
                status: status.as_u16(),
                message,
            },
        }
    }

    /// Whether this error means the session expired and renewal may help
    pub fn is_auth_expired(&self) -> bool {
        matches!(self, Self::AuthenticationFailed(_))
    }

    /// HTTP status associated with the error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Request(err) => err.status().map(|s| s.as_u16()),
            Self::ServerError { status, .. } => Some(*status),
            Self::AuthenticationFailed(_) => Some(401),
            Self::Forbidden(_) => Some(403),
            Self::NotFound(_) => Some(404),
            Self::BadRequest(_) => Some(400),
            Self::RateLimited(_) => Some(429),
            Self::RenewalFailed(RenewalError::Rejected { status, .. }) => Some(*status),
            _ => None,
        }
    }
}

/// Why a renewal exchange did not produce a fresh session
///
/// Cloned into every request of the wave, so it carries owned strings rather
/// than the underlying transport error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenewalError {
    /// The refresh endpoint answered with an error
    #[error("Refresh endpoint rejected the session ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// The refresh endpoint could not be reached
    #[error("Refresh request failed: {0}")]
    Transport(String),

    /// The refresh endpoint did not answer in time
    #[error("Refresh timed out after {0:?}")]
    Timeout(Duration),

    /// The task driving the renewal was dropped before it settled
    #[error("Refresh was abandoned before it completed")]
    Abandoned,
}
