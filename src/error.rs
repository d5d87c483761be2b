//! Error types for the relay server
//!
//! Defines session-level errors and configuration errors.
//! Uses thiserror for ergonomic error definitions.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::types::{DisplayName, RoomId};

/// Session-level errors
///
/// Covers both fatal errors (session termination) and
/// recoverable errors (reported to the client as a text reply).
#[derive(Debug, Error)]
pub enum AppError {
    /// Stream read/write failure (fatal)
    #[error("Connection error: {0}")]
    Connection(#[from] std::io::Error),

    /// Peer closed the stream (fatal)
    #[error("Connection closed by peer")]
    ConnectionClosed,

    /// Frame is not a valid envelope (fatal)
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// JSON serialization/deserialization error (fatal)
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// The session's own writer task is gone (fatal)
    #[error("Outbound sink closed")]
    SinkClosed,

    /// Room selection does not match the registry state
    #[error("Room conflict: {0}")]
    RoomConflict(RoomId),

    /// Display name already taken in the room
    #[error("Name conflict: {0}")]
    NameConflict(DisplayName),

    /// Failed to deliver a broadcast to one recipient
    #[error("Delivery to {recipient} failed: {reason}")]
    RecipientDelivery {
        recipient: DisplayName,
        reason: String,
    },
}

/// Outbound sink send errors
///
/// Occurs when a frame cannot be queued for a connection's writer task.
#[derive(Debug, Error)]
pub enum SendError {
    /// The writer task has ended (connection gone)
    #[error("Channel closed")]
    ChannelClosed,

    /// The queue stayed full past the delivery deadline
    #[error("Queue full for {0:?}")]
    Timeout(Duration),
}

impl From<SendError> for AppError {
    fn from(_: SendError) -> Self {
        AppError::SinkClosed
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{}': {}", .0.display(), .1)]
    FileRead(PathBuf, #[source] std::io::Error),

    #[error("Failed to parse config file '{}': {}", .0.display(), .1)]
    TomlParse(PathBuf, #[source] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_error_maps_to_sink_closed() {
        let err: AppError = SendError::Timeout(Duration::from_millis(5)).into();
        assert!(matches!(err, AppError::SinkClosed));
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::FileRead(
            PathBuf::from("relay.toml"),
            std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
        );
        assert_eq!(
            err.to_string(),
            "Failed to read config file 'relay.toml': missing"
        );
    }
}
