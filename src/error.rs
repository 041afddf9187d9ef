//! Error types for batch-dispatch.

use std::time::Duration;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Wire protocol decoding errors.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("Empty request")]
    Empty,

    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    #[error("Missing {field} in {command} request")]
    MissingField {
        command: &'static str,
        field: &'static str,
    },

    #[error("Unexpected trailing field in {command} request")]
    TrailingField { command: &'static str },

    #[error("Malformed worker identity: {0:?}")]
    MalformedIdentity(String),

    #[error("Malformed task batch: {0}")]
    MalformedBatch(String),

    #[error("Unexpected reply {reply:?} to {request}")]
    UnexpectedReply { request: String, reply: String },
}

/// Request/reply channel errors.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Failed to connect to {url}: {reason}")]
    ConnectFailed { url: String, reason: String },

    #[error("Failed to send request: {reason}")]
    SendFailed { reason: String },

    #[error("Connection closed: {reason}")]
    Disconnected { reason: String },

    #[error("Request timed out after {timeout:?}")]
    Timeout { timeout: Duration },
}

/// Payload execution errors. Always contained to the failing payload, so
/// they never convert into [`Error`].
#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    #[error("Failed to spawn payload: {0}")]
    Spawn(String),

    #[error("Payload exited with status {code}: {output}")]
    NonZeroExit { code: i32, output: String },

    #[error("Payload timed out after {0:?}")]
    Timeout(Duration),

    #[error("Payload failed: {0}")]
    Failed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for the crate.
pub type Result<T> = std::result::Result<T, Error>;
