//! Error types for session-broadcast.

use thiserror::Error;

/// Main error type for session-broadcast operations.
#[derive(Error, Debug)]
pub enum BroadcastError {
    /// The remote session could not be created (fatal to the current manager).
    #[error("session creation failed: {0}")]
    Creation(String),

    /// Authentication against the identity provider failed.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Credential storage failed.
    #[error("storage error: {0}")]
    Storage(String),

    /// Live status probe failed.
    #[error("probe failed: {0}")]
    Probe(String),

    /// Notification delivery failed.
    #[error("notification delivery failed: {0}")]
    Notification(String),

    /// Session directory request failed.
    #[error("session directory error: {0}")]
    Directory(String),

    /// Invalid manager state transition attempted.
    #[error("invalid state transition from {from:?} to {to:?}")]
    InvalidStateTransition {
        from: crate::session::ManagerState,
        to: crate::session::ManagerState,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Operation exceeded its deadline.
    #[error("operation timed out")]
    Timeout,
}

/// Convenience Result type for session-broadcast operations.
pub type Result<T> = std::result::Result<T, BroadcastError>;
