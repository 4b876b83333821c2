//! Reply attribution
//!
//! Replies do not say which command they answer. A line is attributed to the
//! single in-flight command, and the in-flight command's code decides what the
//! line means. The parser holds no state; the engine applies the outcome.

use proj_protocol::command::{INPUT_SELECT, POWER_QUERY};
use proj_protocol::reply::{self, Reply};
use proj_protocol::{Command, InputId};

/// What a received line means for the session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedLine {
    /// `ntcontrol 1 {seed}`: hand the line to the auth session, then resolve
    AuthChallenge(String),
    /// `ntcontrol 1` without a seed
    MalformedChallenge(String),
    /// `ntcontrol 0`: resolve without a digest
    AuthNotRequired,
    /// No command in flight: discard
    Unsolicited(String),
    /// Reply to a power command/query; `None` when the text carries no power state
    Power(Option<bool>),
    /// Reply to an input command/query
    Input(InputId),
    /// Reply to any other command; only resolves the in-flight slot
    Resolved,
}

impl ParsedLine {
    /// Whether this outcome frees the in-flight slot
    pub fn resolves_pending(&self) -> bool {
        !matches!(self, Self::Unsolicited(_) | Self::MalformedChallenge(_))
    }
}

/// Interpret one received line against the in-flight command
pub fn parse_line(line: &str, pending: Option<&Command>) -> ParsedLine {
    match reply::classify(line) {
        Reply::AuthChallenge { .. } => ParsedLine::AuthChallenge(line.to_string()),
        Reply::AuthChallengeMalformed(raw) => ParsedLine::MalformedChallenge(raw),
        Reply::AuthNotRequired => ParsedLine::AuthNotRequired,
        Reply::Data(text) => match pending {
            None => ParsedLine::Unsolicited(text),
            Some(cmd) if cmd.is(POWER_QUERY) => ParsedLine::Power(reply::power_observation(&text)),
            Some(cmd) if cmd.is(INPUT_SELECT) => {
                ParsedLine::Input(reply::input_observation(&text))
            }
            Some(_) => ParsedLine::Resolved,
        },
    }
}
