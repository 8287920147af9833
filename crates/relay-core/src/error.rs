//! Error types for instance-relay.
//!
//! Errors are split by which side of the handoff they occur on. Failures on the
//! first-instance path break coordination for every later launch and are fatal;
//! failures while a subsequent instance hands off its arguments are reported but
//! never keep that process alive.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Main error type for the instance-relay library.
#[derive(Debug, Error)]
pub enum RelayError {
    // Lock errors
    #[error("Instance lock for {identifier} is already held by this arbitrator")]
    LockOwnedBySelf { identifier: String },

    #[error("Lock error at {path:?}: {message}")]
    Lock {
        path: PathBuf,
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    // Channel errors
    #[error("Failed to create channel {channel}: {message}")]
    ChannelCreateFailed {
        channel: String,
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("Publish to {channel} timed out after {timeout:?}")]
    PublishTimeout { channel: String, timeout: Duration },

    #[error("Channel {channel} unavailable: {message}")]
    ChannelUnavailable { channel: String, message: String },

    // Codec errors
    #[error("Failed to decode message: {message}")]
    Decode { message: String },

    // File system errors
    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    // Serialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    // Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    // Validation errors
    #[error("Validation error for {field}: {message}")]
    Validation { field: String, message: String },

    // Generic errors
    #[error("{0}")]
    Other(String),
}

/// Result type alias for instance-relay operations.
pub type Result<T> = std::result::Result<T, RelayError>;

impl From<std::io::Error> for RelayError {
    fn from(err: std::io::Error) -> Self {
        RelayError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for RelayError {
    fn from(err: serde_json::Error) -> Self {
        RelayError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl RelayError {
    /// Create an IO error with path context.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        RelayError::Io {
            message: err.to_string(),
            path: Some(path.into()),
            source: Some(err),
        }
    }

    /// Whether this error breaks coordination for later launches.
    ///
    /// Handoff errors (timeouts, unreachable channel) only affect the exiting
    /// subsequent instance. Decode errors only affect a single message.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            RelayError::PublishTimeout { .. }
                | RelayError::ChannelUnavailable { .. }
                | RelayError::Decode { .. }
        )
    }

    /// Convert to a process exit status.
    ///
    /// - 1: generic failure
    /// - 2: handoff timed out
    /// - 3: handoff failed (channel unreachable)
    pub fn exit_code(&self) -> i32 {
        match self {
            RelayError::PublishTimeout { .. } => 2,
            RelayError::ChannelUnavailable { .. } => 3,
            _ => 1,
        }
    }
}
