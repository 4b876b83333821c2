//! Error types for the control session

use thiserror::Error;

/// Errors that can occur while driving a projector
#[derive(Debug, Error)]
pub enum ControlError {
    /// Outbound queue is at capacity; the new command was not queued
    #[error("send queue full ({capacity} commands pending)")]
    QueueFull {
        /// Configured queue capacity
        capacity: usize,
    },

    /// The session actor is no longer running
    #[error("projector session is not running")]
    SessionClosed,

    /// Invalid configuration
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Authentication handshake failure
    #[error("authentication error: {0}")]
    Auth(#[from] AuthError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serial port error
    #[error("serial port error: {0}")]
    Serial(#[from] tokio_serial::Error),

    /// Protocol error
    #[error("protocol error: {0}")]
    Protocol(#[from] proj_protocol::ParseError),
}

/// Errors raised while validating configuration
///
/// Any of these means the session cannot be built; nothing runs degraded.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Control method has no framing
    #[error(transparent)]
    Transport(#[from] proj_protocol::ParseError),

    /// `tcpip` selected but no TCP properties
    #[error("control method 'tcpip' requires tcpSshProperties")]
    MissingTcpProperties,

    /// `com` selected but no serial parameters
    #[error("control method 'com' requires comParams")]
    MissingComParams,

    /// Queue must hold at least one command
    #[error("queue capacity must be at least 1")]
    ZeroQueueCapacity,

    /// Error timeout must come after the warning timeout
    #[error("error timeout ({error_ms}ms) must exceed warning timeout ({warning_ms}ms)")]
    MonitorTimeouts {
        /// Configured warning timeout
        warning_ms: u64,
        /// Configured error timeout
        error_ms: u64,
    },

    /// Config file could not be read
    #[error("cannot read config: {0}")]
    Io(#[from] std::io::Error),

    /// Config file is not valid JSON for this schema
    #[error("invalid config JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors from the NTCONTROL handshake
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// Challenge line had no seed token
    #[error("challenge without seed: {0:?}")]
    MissingSeed(String),

    /// Challenge received on a session that never authenticates
    #[error("unexpected challenge on serial transport")]
    NotApplicable,

    /// Challenge received but no credentials are configured
    #[error("projector requested authentication but no credentials are configured")]
    NoCredentials,
}
