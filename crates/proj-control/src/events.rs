//! Unified event stream for a projector session
//!
//! All session activity (connection changes, state changes, traffic) is
//! emitted through a single event channel so observers see it in order.

use proj_protocol::{Command, InputId};

use crate::monitor::CommsStatus;
use crate::power::PowerState;

/// Events emitted by a projector session
#[derive(Debug, Clone, PartialEq)]
pub enum ProjectorEvent {
    // -------------------------------------------------------------------------
    // Link lifecycle
    // -------------------------------------------------------------------------
    /// The transport connected or disconnected
    ConnectionChanged {
        /// New connection state
        connected: bool,
    },

    /// The NTCONTROL handshake completed (or was waived) on this connection
    Authenticated {
        /// Whether commands are now digest-prefixed
        digest: bool,
    },

    /// Link health changed
    CommsStatusChanged {
        /// New status
        status: CommsStatus,
    },

    // -------------------------------------------------------------------------
    // Device state
    // -------------------------------------------------------------------------
    /// The power lifecycle moved
    PowerStateChanged {
        /// New lifecycle state
        state: PowerState,
    },

    /// The observed on/off flag changed
    PowerIsOnChanged {
        /// New flag value
        on: bool,
    },

    /// The current input changed
    InputChanged {
        /// New input
        input: InputId,
    },

    // -------------------------------------------------------------------------
    // Traffic
    // -------------------------------------------------------------------------
    /// Bytes written to the projector (after framing and digest prefix)
    DataOut {
        /// Raw bytes sent
        data: Vec<u8>,
    },

    /// A reply line received from the projector
    DataIn {
        /// Reply text with framing stripped
        line: String,
    },

    // -------------------------------------------------------------------------
    // Errors
    // -------------------------------------------------------------------------
    /// A command was not queued
    CommandRejected {
        /// The rejected command
        command: Command,
        /// Why
        reason: String,
    },

    /// A recoverable error occurred
    Error {
        /// Where the error came from (e.g. "Transport", "Auth")
        source: String,
        /// Error message
        message: String,
    },
}

impl ProjectorEvent {
    /// Returns true if this is a traffic event
    pub fn is_traffic(&self) -> bool {
        matches!(self, Self::DataOut { .. } | Self::DataIn { .. })
    }

    /// Returns true if this is an error event
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. } | Self::CommandRejected { .. })
    }
}
