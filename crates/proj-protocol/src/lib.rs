//! Projector Control Protocol Library
//!
//! This crate provides framing and reply parsing for the text command
//! protocol spoken by Panasonic-style projectors over two transports:
//!
//! - **Serial**: `STX AD{id};{cmd}[:{param}] ETX` frames addressed to a device id
//! - **IP (NTCONTROL)**: `00{cmd}[:{param}]\r` lines, optionally prefixed with an
//!   MD5 digest once the projector has issued an authentication challenge
//!
//! # Architecture
//!
//! The crate is pure: it never touches I/O. It provides
//! - [`framing::CommandFramer`], which renders a [`Command`] to exact wire bytes
//! - [`codec::LineCodec`], a streaming splitter that turns received bytes into
//!   reply lines for either transport
//! - [`reply`] helpers that classify a reply line (auth marker, power report,
//!   input report)
//!
//! # Example
//!
//! ```rust
//! use proj_protocol::{Command, CommandFramer, TransportVariant};
//!
//! let framer = CommandFramer::ip();
//! assert_eq!(framer.frame(&Command::power_on()), b"00PON\r");
//!
//! let framer = CommandFramer::serial("1".parse().unwrap());
//! assert_eq!(framer.frame(&Command::power_on()), b"\x02AD1;PON\x03");
//! assert_eq!(framer.variant(), TransportVariant::Serial);
//! ```

pub mod codec;
pub mod command;
pub mod error;
pub mod framing;
pub mod input;
pub mod reply;

pub use codec::LineCodec;
pub use command::{Command, DeviceId};
pub use error::ParseError;
pub use framing::{render, CommandFramer, ETX, STX};
pub use input::InputId;
pub use reply::Reply;

/// Identifies which wire framing a projector session uses
///
/// Selected once when the session is built and never changed afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TransportVariant {
    /// RS-232 framing with STX/ETX envelope and device id
    Serial,
    /// NTCONTROL framing over TCP, carriage-return terminated
    IpNetwork,
}

impl TransportVariant {
    /// Returns a human-readable name for the transport
    pub fn name(&self) -> &'static str {
        match self {
            TransportVariant::Serial => "Serial (RS-232)",
            TransportVariant::IpNetwork => "IP (NTCONTROL)",
        }
    }

    /// The byte that terminates a frame on this transport
    ///
    /// Used both when rendering commands and when splitting received data into lines.
    pub fn terminator(&self) -> u8 {
        match self {
            TransportVariant::Serial => ETX,
            TransportVariant::IpNetwork => b'\r',
        }
    }

    /// Resolve the transport from a configuration control method string
    ///
    /// Accepts `"com"` and `"tcpip"` (case-insensitive). Anything else is a
    /// configuration error: no framer can be built for it.
    pub fn from_control_method(method: &str) -> Result<Self, ParseError> {
        match method.trim().to_ascii_lowercase().as_str() {
            "com" => Ok(TransportVariant::Serial),
            "tcpip" => Ok(TransportVariant::IpNetwork),
            _ => Err(ParseError::UnsupportedTransport(method.to_string())),
        }
    }

    /// Whether this transport requires the NTCONTROL authentication handshake
    pub fn requires_handshake(&self) -> bool {
        matches!(self, TransportVariant::IpNetwork)
    }
}

/// Trait for streaming codecs that split incoming data into frames
pub trait ProtocolCodec {
    /// The frame type produced by this codec
    type Frame;

    /// Push raw bytes into the codec's buffer
    fn push_bytes(&mut self, data: &[u8]);

    /// Try to extract the next complete frame from the buffer
    fn next_frame(&mut self) -> Option<Self::Frame>;

    /// Try to extract the next complete frame along with its raw bytes
    ///
    /// This is useful for traffic logging where we want to show the exact
    /// bytes that were consumed for each frame.
    fn next_frame_with_bytes(&mut self) -> Option<(Self::Frame, Vec<u8>)>;

    /// Clear the internal buffer
    fn clear(&mut self);
}
