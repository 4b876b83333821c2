//! Physical input identifiers

use std::fmt;
use std::str::FromStr;

use crate::error::ParseError;

/// Projector input selection
///
/// `None` is the explicit "not known yet / not understood" value: it is the
/// default before anything has been observed and the result of parsing an
/// unrecognized input report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum InputId {
    /// No input known
    #[default]
    None,
    /// Computer 1 (VGA)
    Rg1,
    /// Computer 2 (VGA)
    Rg2,
    /// Composite video
    Vid,
    /// S-video
    Svd,
    /// DVI-D
    Dvi,
    /// HDMI 1
    Hd1,
    /// HDMI 2
    Hd2,
    /// SDI
    Sd1,
    /// DIGITAL LINK (HDBaseT)
    Dl1,
}

impl InputId {
    /// All selectable inputs (excludes `None`)
    pub const ALL: [InputId; 9] = [
        InputId::Rg1,
        InputId::Rg2,
        InputId::Vid,
        InputId::Svd,
        InputId::Dvi,
        InputId::Hd1,
        InputId::Hd2,
        InputId::Sd1,
        InputId::Dl1,
    ];

    /// Wire code used as the `IIS` parameter
    pub fn code(&self) -> &'static str {
        match self {
            InputId::None => "NONE",
            InputId::Rg1 => "RG1",
            InputId::Rg2 => "RG2",
            InputId::Vid => "VID",
            InputId::Svd => "SVD",
            InputId::Dvi => "DVI",
            InputId::Hd1 => "HD1",
            InputId::Hd2 => "HD2",
            InputId::Sd1 => "SD1",
            InputId::Dl1 => "DL1",
        }
    }

    /// Returns a human-readable name for the input
    pub fn name(&self) -> &'static str {
        match self {
            InputId::None => "None",
            InputId::Rg1 => "Computer 1",
            InputId::Rg2 => "Computer 2",
            InputId::Vid => "Video",
            InputId::Svd => "S-Video",
            InputId::Dvi => "DVI-D",
            InputId::Hd1 => "HDMI 1",
            InputId::Hd2 => "HDMI 2",
            InputId::Sd1 => "SDI",
            InputId::Dl1 => "DIGITAL LINK",
        }
    }

    /// Parse an input code, mapping anything unrecognized to [`InputId::None`]
    pub fn parse_lenient(s: &str) -> Self {
        s.parse().unwrap_or(InputId::None)
    }
}

impl FromStr for InputId {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let code = s.trim();
        if code.eq_ignore_ascii_case("none") {
            return Ok(InputId::None);
        }
        InputId::ALL
            .iter()
            .copied()
            .find(|input| input.code().eq_ignore_ascii_case(code))
            .ok_or_else(|| ParseError::UnknownInput(code.to_string()))
    }
}

impl fmt::Display for InputId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_case_insensitive() {
        assert_eq!("hd1".parse::<InputId>(), Ok(InputId::Hd1));
        assert_eq!(" DL1 ".parse::<InputId>(), Ok(InputId::Dl1));
        assert_eq!("None".parse::<InputId>(), Ok(InputId::None));
    }

    #[test]
    fn test_parse_lenient_unknown_is_none() {
        assert_eq!(InputId::parse_lenient("xyz"), InputId::None);
        assert_eq!(InputId::parse_lenient(""), InputId::None);
        assert_eq!(InputId::parse_lenient("rg2"), InputId::Rg2);
    }

    #[test]
    fn test_code_round_trips_for_all_inputs() {
        for input in InputId::ALL {
            assert_eq!(input.code().parse::<InputId>(), Ok(input));
        }
    }
}
