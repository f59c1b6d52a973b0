//! Error types for sweeply-session

use thiserror::Error;

/// Errors that can occur while coordinating a session
#[derive(Debug, Error)]
pub enum SessionError {
    /// The "who is the current user" lookup failed
    #[error("Failed to look up current user from '{provider}': {reason}")]
    Lookup {
        provider: String,
        reason: String,
    },

    /// Registering on the provider's change stream failed
    #[error("Failed to subscribe to auth changes on '{provider}': {reason}")]
    Subscribe {
        provider: String,
        reason: String,
    },

    /// The provider rejected a sign-out request
    #[error("Sign-out failed: {0}")]
    SignOut(String),

    /// The session was read after the coordinator was torn down
    #[error("Session accessed outside of an active coordinator")]
    Inactive,

    /// Invalid or unreadable configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Persisted session could not be read or written
    #[error("Session store error: {0}")]
    Store(String),

    /// Serialization/deserialization failure
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias for session operations
pub type Result<T> = std::result::Result<T, SessionError>;
