//! Logical projector commands
//!
//! A [`Command`] is a short code (`PON`, `QPW`, `IIS`, ...) with an optional
//! parameter. It carries no framing; see [`crate::framing`] for that.

use std::fmt;
use std::str::FromStr;

use crate::error::ParseError;
use crate::input::InputId;

/// Power on
pub const POWER_ON: &str = "PON";
/// Power off (standby)
pub const POWER_OFF: &str = "POF";
/// Power state query
pub const POWER_QUERY: &str = "QPW";
/// Input select / input echo
pub const INPUT_SELECT: &str = "IIS";

/// A logical command: name plus optional parameter
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Command {
    name: String,
    parameter: Option<String>,
}

impl Command {
    /// Create a command without a parameter
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parameter: None,
        }
    }

    /// Create a command with a parameter
    pub fn with_parameter(name: impl Into<String>, parameter: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parameter: Some(parameter.into()),
        }
    }

    /// Build a command from free-form text, rejecting anything that would break framing
    ///
    /// Used for raw console-style commands where the name comes from a user.
    pub fn parse_raw(name: &str, parameter: Option<&str>) -> Result<Self, ParseError> {
        if name.bytes().any(is_framing_byte) {
            return Err(ParseError::InvalidCommand(name.to_string()));
        }
        let name = name.trim();
        if name.is_empty() || name.contains(':') {
            return Err(ParseError::InvalidCommand(name.to_string()));
        }
        match parameter {
            Some(p) if p.bytes().any(is_framing_byte) => {
                Err(ParseError::InvalidCommand(format!("{}:{}", name, p)))
            }
            Some(p) => Ok(Self::with_parameter(name.to_ascii_uppercase(), p)),
            None => Ok(Self::new(name.to_ascii_uppercase())),
        }
    }

    /// `PON`
    pub fn power_on() -> Self {
        Self::new(POWER_ON)
    }

    /// `POF`
    pub fn power_off() -> Self {
        Self::new(POWER_OFF)
    }

    /// `QPW`
    pub fn power_query() -> Self {
        Self::new(POWER_QUERY)
    }

    /// `IIS:{input}`
    pub fn input_select(input: InputId) -> Self {
        Self::with_parameter(INPUT_SELECT, input.code())
    }

    /// The command code
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The parameter, if any
    pub fn parameter(&self) -> Option<&str> {
        self.parameter.as_deref()
    }

    /// Case-insensitive comparison of the command code
    pub fn is(&self, code: &str) -> bool {
        self.name.eq_ignore_ascii_case(code)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.parameter {
            Some(p) => write!(f, "{}:{}", self.name, p),
            None => f.write_str(&self.name),
        }
    }
}

fn is_framing_byte(b: u8) -> bool {
    matches!(b, 0x02 | 0x03 | b'\r' | b'\n')
}

/// Serial device id embedded after `AD` in serial frames
///
/// Kept as the configured text (`"1"`, `"01"`, `"ZZ"` for broadcast) so the
/// frame carries exactly what the projector was configured with.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DeviceId(String);

impl DeviceId {
    /// The id as it appears on the wire
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for DeviceId {
    fn default() -> Self {
        Self("ZZ".to_string())
    }
}

impl FromStr for DeviceId {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() || s.len() > 2 || !s.bytes().all(|b| b.is_ascii_alphanumeric()) {
            return Err(ParseError::InvalidDeviceId(s.to_string()));
        }
        Ok(Self(s.to_ascii_uppercase()))
    }
}

impl From<u8> for DeviceId {
    fn from(id: u8) -> Self {
        Self(format!("{:02}", id.min(99)))
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
