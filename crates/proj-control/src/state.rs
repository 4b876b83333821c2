//! Session state snapshot

use proj_protocol::{InputId, TransportVariant};
use serde::{Deserialize, Serialize};

use crate::monitor::CommsStatus;
use crate::power::PowerState;

/// Read-only view of a projector session, safe to send across channels
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectorStatus {
    /// Transport in use
    pub transport: TransportVariant,
    /// Power lifecycle state
    pub power_state: PowerState,
    /// Observed on/off flag
    pub power_is_on: bool,
    /// Current input
    pub input: InputId,
    /// Transport connected
    pub connected: bool,
    /// Commands may be transmitted (connected and authenticated)
    pub ready: bool,
    /// Link health
    pub comms: CommsStatus,
    /// Commands waiting behind the in-flight one
    pub queued: usize,
    /// Code of the command awaiting a reply
    pub pending: Option<String>,
}

impl ProjectorStatus {
    /// Whether a warm-up period is running
    pub fn is_warming(&self) -> bool {
        self.power_state == PowerState::Warming
    }

    /// Whether a cool-down period is running
    pub fn is_cooling(&self) -> bool {
        self.power_state == PowerState::Cooling
    }

    /// Whether the device counts as online
    pub fn is_online(&self) -> bool {
        self.comms.is_online()
    }

    /// Format power for display
    pub fn power_display(&self) -> String {
        format!(
            "{} ({})",
            self.power_state.name(),
            if self.power_is_on { "on" } else { "off" }
        )
    }
}
