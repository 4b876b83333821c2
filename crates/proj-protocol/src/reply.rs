//! Reply line classification
//!
//! Replies carry no command identity of their own; the session attributes a
//! data reply to whichever command is in flight. These helpers only look at
//! the text.

use crate::error::ParseError;
use crate::input::InputId;

/// Marker of a digest-protected session: `NTCONTROL 1 {seed}`
pub const AUTH_CHALLENGE_MARKER: &str = "ntcontrol 1";
/// Marker of an unprotected session: `NTCONTROL 0`
pub const AUTH_NONE_MARKER: &str = "ntcontrol 0";

/// What a received line is, before attribution
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Authentication challenge carrying the random seed
    AuthChallenge {
        /// Third space-delimited token of the challenge line
        seed: String,
    },
    /// Challenge marker present but no seed token
    AuthChallengeMalformed(String),
    /// Projector does not require a digest
    AuthNotRequired,
    /// Anything else: a reply to the in-flight command (or noise)
    Data(String),
}

/// Classify a received line (case-insensitive for the auth markers)
pub fn classify(line: &str) -> Reply {
    let lower = line.to_ascii_lowercase();

    if let Some(pos) = lower.find(AUTH_CHALLENGE_MARKER) {
        return match challenge_seed(&line[pos..]) {
            Ok(seed) => Reply::AuthChallenge { seed },
            Err(_) => Reply::AuthChallengeMalformed(line.to_string()),
        };
    }

    if lower.contains(AUTH_NONE_MARKER) {
        return Reply::AuthNotRequired;
    }

    Reply::Data(line.to_string())
}

/// Extract the seed from `ntcontrol 1 {seed}`
pub fn challenge_seed(line: &str) -> Result<String, ParseError> {
    line.split_whitespace()
        .nth(2)
        .map(str::to_string)
        .ok_or_else(|| ParseError::MissingSeed(line.to_string()))
}

/// Interpret a reply to a power command or query
///
/// `001` or `pon` means on; otherwise `000` or `pof` means off. Anything else
/// (error replies such as `ER401`) carries no power information.
pub fn power_observation(line: &str) -> Option<bool> {
    let lower = line.to_ascii_lowercase();
    if line.contains("001") || lower.contains("pon") {
        Some(true)
    } else if line.contains("000") || lower.contains("pof") {
        Some(false)
    } else {
        None
    }
}

/// Interpret a reply to an input command or query
///
/// Strips a leading `iis:` token and maps unknown codes to [`InputId::None`].
pub fn input_observation(line: &str) -> InputId {
    let trimmed = line.trim();
    let value = match trimmed.get(..4) {
        Some(prefix) if prefix.eq_ignore_ascii_case("iis:") => &trimmed[4..],
        _ => trimmed,
    };
    InputId::parse_lenient(value.trim())
}
