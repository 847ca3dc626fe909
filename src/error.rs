//! Error types for the pulse-check library.
//!
//! This module provides custom error types using `thiserror` for better error handling
//! and more specific error messages throughout the pipeline.

use thiserror::Error;

use crate::models::Platform;

/// Errors that can occur in the pulse-check pipeline.
#[derive(Error, Debug)]
pub enum PulseError {
    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// The connection pool could not hand out a connection
    #[error("Content store unavailable: {0}")]
    StoreUnavailable(#[from] r2d2::Error),

    /// A record violated a storage invariant before reaching the database
    #[error("Invalid record {platform}/{message_id}: {reason}")]
    InvalidRecord {
        /// Platform of the rejected record
        platform: Platform,
        /// Identifier of the rejected record
        message_id: String,
        /// Why it was rejected
        reason: String,
    },

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Transport-level HTTP failure
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// A platform API answered with a non-success status
    #[error("{platform} API error ({status}): {message}")]
    PlatformApi {
        /// Platform that rejected the call
        platform: Platform,
        /// HTTP status code
        status: u16,
        /// Response body
        message: String,
    },

    /// No usable credentials configured for a platform
    #[error("No credentials configured for {0}")]
    MissingCredentials(Platform),

    /// The sentiment model failed on an input
    #[error("Classification error: {0}")]
    Classification(String),

    /// Empty content handed to the classifier
    #[error("Refusing to classify empty content")]
    EmptyContent,

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// General error with context
    #[error("{0}")]
    Other(String),
}

impl PulseError {
    /// True for failures of the store or a platform endpoint as a whole, as
    /// opposed to failures tied to a single message.
    #[must_use]
    pub fn is_connectivity(&self) -> bool {
        match self {
            Self::StoreUnavailable(_) | Self::Http(_) => true,
            Self::Database(rusqlite::Error::SqliteFailure(err, _)) => matches!(
                err.code,
                rusqlite::ErrorCode::CannotOpen
                    | rusqlite::ErrorCode::DatabaseBusy
                    | rusqlite::ErrorCode::DatabaseLocked
                    | rusqlite::ErrorCode::SystemIoFailure
                    | rusqlite::ErrorCode::NotADatabase
            ),
            Self::PlatformApi { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

/// Convenience type alias for Result with PulseError
pub type Result<T> = std::result::Result<T, PulseError>;

impl From<anyhow::Error> for PulseError {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}
