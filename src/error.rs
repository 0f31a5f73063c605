//! Error types for the locker client
//!
//! Every network call returns a tagged [`LockerError`] so callers can
//! branch on [`FailureKind`] instead of inspecting transport internals.

use thiserror::Error;

/// Result type for locker client operations
pub type Result<T> = std::result::Result<T, LockerError>;

/// Coarse failure classification used by the retry policy and the UI layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// HTTP 429, the only retryable kind
    RateLimited,
    /// HTTP 401, tears down the session
    Unauthorized,
    /// 4xx with a message for the user
    Validation,
    /// Transport failure or anything unexpected
    NetworkOrUnknown,
}

/// Locker client error
#[derive(Debug, Error)]
pub enum LockerError {
    /// Server asked us to slow down
    #[error("Rate limited by server")]
    RateLimited,

    /// Token missing, expired or rejected
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Request rejected with a user-facing message
    #[error("{message}")]
    Validation { status: u16, message: String },

    /// Transport failure, 5xx, or an unreadable response
    #[error("Network error: {0}")]
    Network(String),

    /// Rate limiting persisted through every retry
    #[error("Server is currently busy. Please try again in a few minutes.")]
    ServerBusy { attempts: u32 },

    /// Operation called in the wrong state
    #[error("Invalid state: {0}")]
    Precondition(String),

    /// Durable session storage failed
    #[error("Session storage error: {0}")]
    Storage(String),

    /// JSON encoding or decoding failed
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl LockerError {
    /// Classify this error for retry and notification decisions.
    pub fn kind(&self) -> FailureKind {
        match self {
            LockerError::RateLimited | LockerError::ServerBusy { .. } => FailureKind::RateLimited,
            LockerError::Unauthorized(_) => FailureKind::Unauthorized,
            LockerError::Validation { .. } | LockerError::Precondition(_) => {
                FailureKind::Validation
            }
            LockerError::Network(_)
            | LockerError::Storage(_)
            | LockerError::Serialization(_)
            | LockerError::Config(_) => FailureKind::NetworkOrUnknown,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        self.kind() == FailureKind::Unauthorized
    }
}

impl From<reqwest::Error> for LockerError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            LockerError::Serialization(err.to_string())
        } else {
            LockerError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for LockerError {
    fn from(err: serde_json::Error) -> Self {
        LockerError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for LockerError {
    fn from(err: std::io::Error) -> Self {
        LockerError::Storage(err.to_string())
    }
}
