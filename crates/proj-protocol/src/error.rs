//! Error types for projector protocol framing and parsing

use thiserror::Error;

/// Errors that can occur while parsing protocol values
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Control method has no framing
    #[error("unsupported transport: {0} (expected 'com' or 'tcpip')")]
    UnsupportedTransport(String),

    /// Serial device id is not 1-2 ASCII alphanumerics
    #[error("invalid device id: {0:?}")]
    InvalidDeviceId(String),

    /// Unknown input code
    #[error("unknown input: {0}")]
    UnknownInput(String),

    /// Command name is empty or contains framing characters
    #[error("invalid command name: {0:?}")]
    InvalidCommand(String),

    /// `ntcontrol 1` line without a seed token
    #[error("authentication challenge without seed: {0:?}")]
    MissingSeed(String),
}
