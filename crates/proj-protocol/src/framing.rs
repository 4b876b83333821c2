//! Command framing for both transports
//!
//! # Format
//! - IP: `00{name}:{parameter}\r` or `00{name}\r`. The leading `00` is a fixed
//!   protocol constant, not a device id.
//! - Serial: `STX AD{id};{name}:{parameter} ETX` or `STX AD{id};{name} ETX`
//!
//! Each terminator appears exactly once.

use crate::command::{Command, DeviceId};
use crate::TransportVariant;

/// Start of text (serial frame start)
pub const STX: u8 = 0x02;
/// End of text (serial frame end and serial line terminator)
pub const ETX: u8 = 0x03;

/// Fixed prefix of every IP command
const IP_PREFIX: &str = "00";

/// Render a command to exact wire bytes for the given transport
///
/// `device_id` is only used by the serial framing.
pub fn render(command: &Command, variant: TransportVariant, device_id: &DeviceId) -> Vec<u8> {
    match variant {
        TransportVariant::IpNetwork => {
            let mut out = Vec::with_capacity(command.name().len() + 16);
            out.extend_from_slice(IP_PREFIX.as_bytes());
            push_body(&mut out, command);
            out.push(b'\r');
            out
        }
        TransportVariant::Serial => {
            let mut out = Vec::with_capacity(command.name().len() + 20);
            out.push(STX);
            out.extend_from_slice(b"AD");
            out.extend_from_slice(device_id.as_str().as_bytes());
            out.push(b';');
            push_body(&mut out, command);
            out.push(ETX);
            out
        }
    }
}

fn push_body(out: &mut Vec<u8>, command: &Command) {
    out.extend_from_slice(command.name().as_bytes());
    if let Some(param) = command.parameter() {
        out.push(b':');
        out.extend_from_slice(param.as_bytes());
    }
}

/// Framer bound to one transport variant (and device id, for serial)
///
/// Resolved once when a session is built; the variant never changes afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandFramer {
    variant: TransportVariant,
    device_id: DeviceId,
}

impl CommandFramer {
    /// Create a framer for the given variant
    pub fn new(variant: TransportVariant, device_id: DeviceId) -> Self {
        Self { variant, device_id }
    }

    /// Framer for the IP transport
    pub fn ip() -> Self {
        Self::new(TransportVariant::IpNetwork, DeviceId::default())
    }

    /// Framer for the serial transport addressed to `device_id`
    pub fn serial(device_id: DeviceId) -> Self {
        Self::new(TransportVariant::Serial, device_id)
    }

    /// The transport this framer renders for
    pub fn variant(&self) -> TransportVariant {
        self.variant
    }

    /// Line terminator for splitting received data
    pub fn terminator(&self) -> u8 {
        self.variant.terminator()
    }

    /// Render a command to wire bytes
    pub fn frame(&self, command: &Command) -> Vec<u8> {
        render(command, self.variant, &self.device_id)
    }
}
