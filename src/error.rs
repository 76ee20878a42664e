//! Error types for the tether gateway

use thiserror::Error;

/// Result type alias for gateway operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the tether gateway
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed or missing input
    #[error("validation error: {0}")]
    Validation(String),

    /// Missing or invalid credential
    #[error("authentication error: {0}")]
    Authentication(String),

    /// Device is not registered
    #[error("device not found: {0}")]
    DeviceNotFound(String),

    /// Challenge is absent, already consumed, or expired.
    /// The three conditions are indistinguishable to callers.
    #[error("challenge not found")]
    ChallengeNotFound,

    /// Signature did not verify against the device's public key
    #[error("signature verification failed")]
    Verification,

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Database error
    #[error("database error: {0}")]
    Database(String),

    /// `SQLite` error
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Wire-level error code surfaced to clients
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Authentication(_) => "AUTHENTICATION_ERROR",
            Self::DeviceNotFound(_) => "DEVICE_NOT_FOUND",
            Self::ChallengeNotFound => "CHALLENGE_NOT_FOUND",
            Self::Verification => "VERIFICATION_FAILED",
            Self::Config(_) | Self::Database(_) | Self::Sqlite(_) | Self::Io(_)
            | Self::Serialization(_) => "INTERNAL_ERROR",
        }
    }
}
