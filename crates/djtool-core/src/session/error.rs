//! Error taxonomy seen by session consumers.

use serde::Serialize;
use thiserror::Error;

use crate::transport::TransportError;

/// Why a connection attempt ended, or why a call was refused.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum SessionError {
    /// The daemon could not be reached or the stream dropped. Retried.
    #[error("Daemon unavailable: {0}")]
    Unavailable(String),

    /// No response or heartbeat within the deadline. Retried.
    #[error("Timed out: {0}")]
    Timeout(String),

    /// The call was cancelled. Ends the attempt without a retry.
    #[error("Cancelled: {0}")]
    Cancelled(String),

    /// A frame could not be decoded. Retried.
    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    /// Unclassified transport failure. Retried.
    #[error("Internal error: {0}")]
    Internal(String),

    /// Every reconnection attempt failed.
    #[error("Gave up after {retries} reconnection attempts: {last_error}")]
    RetriesExhausted { retries: u32, last_error: String },

    /// `connect()` named a different endpoint while a session is active.
    #[error("Session already bound to {0}")]
    EndpointInUse(String),

    /// The session manager has shut down.
    #[error("Session manager is closed")]
    Closed,
}

impl SessionError {
    /// Whether the backoff policy should retry after this error.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Unavailable(_) | Self::Timeout(_) | Self::MalformedMessage(_) | Self::Internal(_)
        )
    }
}

impl From<TransportError> for SessionError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Unavailable(message) => Self::Unavailable(message),
            TransportError::Timeout(message) => Self::Timeout(message),
            TransportError::Cancelled(message) => Self::Cancelled(message),
            TransportError::Malformed(message) => Self::MalformedMessage(message),
            TransportError::Internal(message) => Self::Internal(message),
        }
    }
}
