//! Error types for Devlink.
//!
//! Storage backends, configuration loading and listing helpers return this
//! error. The upload pipeline itself never surfaces it to callers; failures
//! there are recorded on the affected unit instead.

use std::io;

use thiserror::Error;

/// A specialized `Result` type for Devlink operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The main error type for Devlink.
#[derive(Error, Debug)]
pub enum Error {
    /// The request never produced a response (E001)
    #[error("transport error: {0}")]
    Transport(String),

    /// The storage endpoint answered with a non-success status (E002)
    #[error("storage endpoint rejected the request with status {status}: {message}")]
    Rejected {
        /// HTTP status code
        status: u16,
        /// Response body or reason phrase
        message: String,
    },

    /// Object already exists and overwrite was not requested (E003)
    #[error("object already exists: {0}")]
    Conflict(String),

    /// Object or folder not found (E004)
    #[error("not found: {0}")]
    NotFound(String),

    /// Invalid object path
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// Operation timeout
    #[error("operation timed out after {0} seconds")]
    Timeout(u64),

    /// Configuration file error
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// Invalid configuration value
    #[error("invalid configuration value for '{key}': {reason}")]
    InvalidConfig {
        /// Configuration key
        key: String,
        /// Reason for invalidity
        reason: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Internal error (should not happen)
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Returns the error code associated with this error, if any.
    ///
    /// Error codes follow the pattern EXXX where XXX is a 3-digit number.
    #[must_use]
    pub const fn code(&self) -> Option<&'static str> {
        match self {
            Self::Transport(_) => Some("E001"),
            Self::Rejected { .. } => Some("E002"),
            Self::Conflict(_) => Some("E003"),
            Self::NotFound(_) => Some("E004"),
            _ => None,
        }
    }

    /// Returns whether this error is recoverable (can be retried).
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::Rejected { .. } | Self::Timeout(_)
        )
    }

    /// Returns a helpful suggestion for resolving the error, if applicable.
    #[must_use]
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            Self::Rejected { status: 401 | 403, .. } => Some(
                "Check the storage API key:\n\
                   set DEVLINK_API_KEY or storage.api_key in the config file",
            ),
            Self::Transport(_) | Self::Timeout(_) => Some(
                "Check the storage endpoint and your network connection.\n\
                 Failed uploads can be retried.",
            ),
            Self::Conflict(_) => Some("Pick another name or enable overwrite."),
            Self::NotFound(_) => Some("Run `devlink ls` to see what the folder holds."),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
