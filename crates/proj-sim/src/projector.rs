//! Virtual projector simulation
//!
//! Answers framed commands the way the real device does, including the
//! NTCONTROL greeting and digest check on IP links.

use std::collections::VecDeque;

use md5::{Digest, Md5};
use proj_protocol::command::{INPUT_SELECT, POWER_OFF, POWER_ON, POWER_QUERY};
use proj_protocol::{DeviceId, InputId, TransportVariant, ETX, STX};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Reply for a command the projector does not understand
pub const ERR_UNKNOWN_COMMAND: &str = "ER401";
/// Reply for a bad or missing digest
pub const ERR_AUTH: &str = "ERRA";

/// Serial id that every projector answers to
const BROADCAST_ID: &str = "ZZ";

/// Configuration for creating a virtual projector
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VirtualProjectorConfig {
    /// Display name/identifier
    pub id: String,
    /// Framing the projector speaks
    pub variant: TransportVariant,
    /// Serial device id the projector answers to
    pub device_id: String,
    /// Whether IP clients must send a digest
    pub require_auth: bool,
    /// NTCONTROL account name
    pub username: String,
    /// NTCONTROL account password
    pub password: String,
    /// Challenge seed sent in the greeting
    pub seed: String,
    /// Initial power state
    pub initially_on: bool,
    /// Answer the first power query after a power-on with "off"
    pub stale_off_after_power_on: bool,
}

impl Default for VirtualProjectorConfig {
    fn default() -> Self {
        Self {
            id: "Virtual Projector".to_string(),
            variant: TransportVariant::IpNetwork,
            device_id: "01".to_string(),
            require_auth: true,
            username: "admin1".to_string(),
            password: "panasonic".to_string(),
            seed: "a1b2c3d4".to_string(),
            initially_on: false,
            stale_off_after_power_on: false,
        }
    }
}

/// A simulated projector
#[derive(Debug)]
pub struct VirtualProjector {
    config: VirtualProjectorConfig,
    device_id: DeviceId,
    power_on: bool,
    input: InputId,
    stale_off_pending: bool,
    /// Command bodies received, in order (digest and envelope stripped)
    history: Vec<String>,
    /// Pending output bytes (framed replies)
    pending_output: VecDeque<Vec<u8>>,
}

impl VirtualProjector {
    /// Create a virtual projector
    pub fn new(config: VirtualProjectorConfig) -> Self {
        let device_id = config.device_id.parse().unwrap_or_default();
        Self {
            power_on: config.initially_on,
            config,
            device_id,
            input: InputId::None,
            stale_off_pending: false,
            history: Vec::new(),
            pending_output: VecDeque::new(),
        }
    }

    /// Get the projector id
    pub fn id(&self) -> &str {
        &self.config.id
    }

    /// Framing in use
    pub fn variant(&self) -> TransportVariant {
        self.config.variant
    }

    /// Whether the lamp is on
    pub fn is_on(&self) -> bool {
        self.power_on
    }

    /// Selected input
    pub fn input(&self) -> InputId {
        self.input
    }

    /// Command bodies received so far
    pub fn history(&self) -> &[String] {
        &self.history
    }

    /// The digest a client must prefix, if authentication is required
    pub fn expected_digest(&self) -> Option<String> {
        if !self.requires_digest() {
            return None;
        }
        let input = format!(
            "{}:{}:{}",
            self.config.username, self.config.password, self.config.seed
        );
        Some(hex::encode(Md5::digest(input.as_bytes())))
    }

    fn requires_digest(&self) -> bool {
        self.config.variant == TransportVariant::IpNetwork && self.config.require_auth
    }

    /// Queue the connection greeting (IP only)
    pub fn connect(&mut self) {
        if self.config.variant != TransportVariant::IpNetwork {
            return;
        }
        let greeting = if self.config.require_auth {
            format!("NTCONTROL 1 {}", self.config.seed)
        } else {
            "NTCONTROL 0".to_string()
        };
        self.queue_reply(&greeting);
    }

    /// Process one received line (terminator and STX/ETX already stripped)
    pub fn process_line(&mut self, line: &str) {
        let Some(body) = self.open_envelope(line) else {
            return;
        };
        debug!("Virtual projector {} executing {:?}", self.config.id, body);
        self.history.push(body.clone());

        let reply = self.execute(&body);
        self.queue_reply(&reply);
    }

    /// Get the next pending output bytes
    pub fn take_output(&mut self) -> Option<Vec<u8>> {
        self.pending_output.pop_front()
    }

    /// Strip digest and envelope, answering `ERRA` on a bad digest
    fn open_envelope(&mut self, line: &str) -> Option<String> {
        match self.config.variant {
            TransportVariant::IpNetwork => {
                let mut rest = line;
                if let Some(digest) = self.expected_digest() {
                    match rest.strip_prefix(digest.as_str()) {
                        Some(after) => rest = after,
                        None => {
                            warn!("Virtual projector {} rejected digest", self.config.id);
                            self.queue_reply(ERR_AUTH);
                            return None;
                        }
                    }
                }
                match rest.strip_prefix("00") {
                    Some(body) => Some(body.to_string()),
                    None => {
                        self.queue_reply(ERR_UNKNOWN_COMMAND);
                        None
                    }
                }
            }
            TransportVariant::Serial => {
                let (address, body) = line.strip_prefix("AD")?.split_once(';')?;
                let addressed = address.eq_ignore_ascii_case(self.device_id.as_str())
                    || address.eq_ignore_ascii_case(BROADCAST_ID);
                if !addressed {
                    debug!("Virtual projector {} ignoring id {}", self.config.id, address);
                    return None;
                }
                Some(body.to_string())
            }
        }
    }

    fn execute(&mut self, body: &str) -> String {
        let (name, parameter) = match body.split_once(':') {
            Some((name, parameter)) => (name, Some(parameter)),
            None => (body, None),
        };

        if name.eq_ignore_ascii_case(POWER_ON) {
            if !self.power_on {
                self.stale_off_pending = self.config.stale_off_after_power_on;
            }
            self.power_on = true;
            POWER_ON.to_string()
        } else if name.eq_ignore_ascii_case(POWER_OFF) {
            self.power_on = false;
            self.stale_off_pending = false;
            POWER_OFF.to_string()
        } else if name.eq_ignore_ascii_case(POWER_QUERY) {
            if std::mem::take(&mut self.stale_off_pending) || !self.power_on {
                "000".to_string()
            } else {
                "001".to_string()
            }
        } else if name.eq_ignore_ascii_case(INPUT_SELECT) {
            match parameter {
                None => format!("{}:{}", INPUT_SELECT, self.input.code()),
                Some(code) => match code.parse::<InputId>() {
                    Ok(input) if input != InputId::None => {
                        self.input = input;
                        format!("{}:{}", INPUT_SELECT, input.code())
                    }
                    _ => ERR_UNKNOWN_COMMAND.to_string(),
                },
            }
        } else {
            ERR_UNKNOWN_COMMAND.to_string()
        }
    }

    fn queue_reply(&mut self, text: &str) {
        let framed = match self.config.variant {
            TransportVariant::IpNetwork => format!("{}\r", text).into_bytes(),
            TransportVariant::Serial => {
                let mut out = Vec::with_capacity(text.len() + 2);
                out.push(STX);
                out.extend_from_slice(text.as_bytes());
                out.push(ETX);
                out
            }
        };
        self.pending_output.push_back(framed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(projector: &mut VirtualProjector) -> Vec<Vec<u8>> {
        std::iter::from_fn(|| projector.take_output()).collect()
    }

    #[test]
    fn test_ip_greeting_and_digest() {
        let mut projector = VirtualProjector::new(VirtualProjectorConfig::default());
        projector.connect();
        assert_eq!(drain(&mut projector), [b"NTCONTROL 1 a1b2c3d4\r".to_vec()]);

        let digest = projector.expected_digest().unwrap();
        assert_eq!(digest, "05aecabf6f01bb79966719ab30fe8540");

        projector.process_line(&format!("{}00PON", digest));
        assert_eq!(drain(&mut projector), [b"PON\r".to_vec()]);
        assert!(projector.is_on());
    }

    #[test]
    fn test_bad_digest_rejected() {
        let mut projector = VirtualProjector::new(VirtualProjectorConfig::default());
        projector.process_line("00PON");
        assert_eq!(drain(&mut projector), [b"ERRA\r".to_vec()]);
        assert!(!projector.is_on());
        assert!(projector.history().is_empty());
    }

    #[test]
    fn test_no_auth_greeting() {
        let mut projector = VirtualProjector::new(VirtualProjectorConfig {
            require_auth: false,
            ..Default::default()
        });
        projector.connect();
        assert_eq!(drain(&mut projector), [b"NTCONTROL 0\r".to_vec()]);

        projector.process_line("00QPW");
        assert_eq!(drain(&mut projector), [b"000\r".to_vec()]);
    }

    #[test]
    fn test_serial_addressing() {
        let mut projector = VirtualProjector::new(VirtualProjectorConfig {
            variant: TransportVariant::Serial,
            ..Default::default()
        });
        projector.connect();
        assert!(drain(&mut projector).is_empty());

        projector.process_line("AD02;PON");
        assert!(drain(&mut projector).is_empty());

        projector.process_line("AD01;IIS:HD1");
        assert_eq!(drain(&mut projector), [b"\x02IIS:HD1\x03".to_vec()]);
        assert_eq!(projector.input(), InputId::Hd1);

        projector.process_line("ADZZ;QPW");
        assert_eq!(drain(&mut projector), [b"\x02000\x03".to_vec()]);
    }

    #[test]
    fn test_stale_off_after_power_on() {
        let mut projector = VirtualProjector::new(VirtualProjectorConfig {
            require_auth: false,
            stale_off_after_power_on: true,
            ..Default::default()
        });
        projector.process_line("00PON");
        projector.process_line("00QPW");
        projector.process_line("00QPW");
        assert_eq!(
            drain(&mut projector),
            [b"PON\r".to_vec(), b"000\r".to_vec(), b"001\r".to_vec()]
        );
    }

    #[test]
    fn test_unknown_command_and_input() {
        let mut projector = VirtualProjector::new(VirtualProjectorConfig {
            require_auth: false,
            ..Default::default()
        });
        projector.process_line("00XYZ");
        projector.process_line("00IIS:BAD");
        projector.process_line("00IIS");
        assert_eq!(
            drain(&mut projector),
            [
                b"ER401\r".to_vec(),
                b"ER401\r".to_vec(),
                b"IIS:NONE\r".to_vec()
            ]
        );
    }
}
