//! Session configuration
//!
//! [`ProjectorConfig`] is the JSON document as written by an installer (field
//! names follow the plugin config convention). [`SessionConfig`] is the
//! validated, resolved form a session is built from.

use std::path::Path;
use std::time::Duration;

use proj_protocol::{CommandFramer, DeviceId, TransportVariant};
use serde::{Deserialize, Serialize};

use crate::auth::Credentials;
use crate::error::ConfigError;
use crate::power::{DEFAULT_COOL_DOWN, DEFAULT_WARM_UP};
use crate::queue::DEFAULT_QUEUE_CAPACITY;

/// NTCONTROL listens here unless configured otherwise
pub const DEFAULT_TCP_PORT: u16 = 1024;

/// Serial control configuration as stored on disk
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ComParams {
    /// Serial device path
    pub port: String,
    /// Baud rate
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
}

/// TCP control configuration as stored on disk
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TcpSshProperties {
    /// Host name or IP address
    pub address: String,
    /// TCP port
    #[serde(default = "default_tcp_port")]
    pub port: u16,
    /// NTCONTROL account name
    #[serde(default)]
    pub username: String,
    /// NTCONTROL account password
    #[serde(default)]
    pub password: String,
}

/// Control method section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ControlConfig {
    /// `"com"` or `"tcpip"`
    pub method: String,
    /// Required for `tcpip`
    #[serde(default)]
    pub tcp_ssh_properties: Option<TcpSshProperties>,
    /// Required for `com`
    #[serde(default)]
    pub com_params: Option<ComParams>,
}

/// Projector configuration document
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProjectorConfig {
    /// Transport selection and parameters
    pub control: ControlConfig,
    /// Serial device id (serial only)
    #[serde(default)]
    pub id: Option<String>,
    /// Warm-up override in seconds (0 = default)
    #[serde(default)]
    pub warmup_time_in_seconds: u64,
    /// Cool-down override in seconds (0 = default)
    #[serde(default)]
    pub cooldown_time_in_seconds: u64,
    /// Power poll period (0 = no polling)
    #[serde(default = "default_poll_time_ms")]
    pub poll_time_ms: u64,
    /// Silence before the link is reported as degraded
    #[serde(default = "default_warning_timeout_ms")]
    pub warning_timeout_ms: u64,
    /// Silence before the link is reported as failed
    #[serde(default = "default_error_timeout_ms")]
    pub error_timeout_ms: u64,
    /// Maximum commands waiting to be sent
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Delay between reconnect attempts
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
    /// Give up on an unanswered command after this long (0 = wait forever)
    #[serde(default)]
    pub reply_timeout_ms: u64,
}

fn default_baud_rate() -> u32 {
    9600
}

fn default_tcp_port() -> u16 {
    DEFAULT_TCP_PORT
}

fn default_poll_time_ms() -> u64 {
    50_000
}

fn default_warning_timeout_ms() -> u64 {
    60_000
}

fn default_error_timeout_ms() -> u64 {
    120_000
}

fn default_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}

fn default_reconnect_delay_ms() -> u64 {
    5_000
}

impl ProjectorConfig {
    /// Parse a JSON config document
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read and parse a JSON config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Validate and resolve into a session configuration
    pub fn into_session_config(self) -> Result<SessionConfig, ConfigError> {
        let variant = TransportVariant::from_control_method(&self.control.method)?;

        let (endpoint, credentials) = match variant {
            TransportVariant::IpNetwork => {
                let tcp = self
                    .control
                    .tcp_ssh_properties
                    .ok_or(ConfigError::MissingTcpProperties)?;
                (
                    Endpoint::Tcp {
                        address: tcp.address,
                        port: tcp.port,
                    },
                    Some(Credentials::new(tcp.username, tcp.password)),
                )
            }
            TransportVariant::Serial => {
                let com = self.control.com_params.ok_or(ConfigError::MissingComParams)?;
                (
                    Endpoint::Serial {
                        port: com.port,
                        baud_rate: com.baud_rate,
                    },
                    None,
                )
            }
        };

        let device_id = match (&self.id, variant) {
            (Some(id), TransportVariant::Serial) => id.parse::<DeviceId>()?,
            _ => DeviceId::default(),
        };

        if self.queue_capacity == 0 {
            return Err(ConfigError::ZeroQueueCapacity);
        }
        if self.error_timeout_ms <= self.warning_timeout_ms {
            return Err(ConfigError::MonitorTimeouts {
                warning_ms: self.warning_timeout_ms,
                error_ms: self.error_timeout_ms,
            });
        }

        Ok(SessionConfig {
            variant,
            device_id,
            credentials,
            endpoint,
            warm_up: seconds_or(self.warmup_time_in_seconds, DEFAULT_WARM_UP),
            cool_down: seconds_or(self.cooldown_time_in_seconds, DEFAULT_COOL_DOWN),
            poll_interval: (self.poll_time_ms > 0).then(|| Duration::from_millis(self.poll_time_ms)),
            warning_timeout: Duration::from_millis(self.warning_timeout_ms),
            error_timeout: Duration::from_millis(self.error_timeout_ms),
            queue_capacity: self.queue_capacity,
            reconnect_delay: Duration::from_millis(self.reconnect_delay_ms),
            reply_timeout: (self.reply_timeout_ms > 0)
                .then(|| Duration::from_millis(self.reply_timeout_ms)),
        })
    }
}

fn seconds_or(seconds: u64, default: Duration) -> Duration {
    if seconds == 0 {
        default
    } else {
        Duration::from_secs(seconds)
    }
}

/// Where the projector is reached
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// TCP host and port
    Tcp {
        /// Host name or address
        address: String,
        /// TCP port
        port: u16,
    },
    /// Serial device
    Serial {
        /// Device path
        port: String,
        /// Baud rate
        baud_rate: u32,
    },
}

/// Validated configuration a session is built from
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Framing in use
    pub variant: TransportVariant,
    /// Serial device id
    pub device_id: DeviceId,
    /// NTCONTROL credentials (IP only)
    pub credentials: Option<Credentials>,
    /// Where to connect
    pub endpoint: Endpoint,
    /// Warm-up period
    pub warm_up: Duration,
    /// Cool-down period
    pub cool_down: Duration,
    /// Power poll period, if polling
    pub poll_interval: Option<Duration>,
    /// Silence before `Warning`
    pub warning_timeout: Duration,
    /// Silence before `Error`
    pub error_timeout: Duration,
    /// Maximum commands waiting to be sent
    pub queue_capacity: usize,
    /// Delay between reconnect attempts
    pub reconnect_delay: Duration,
    /// How long an in-flight command may wait for its reply, if bounded
    pub reply_timeout: Option<Duration>,
}

impl SessionConfig {
    /// IP session with default timings
    pub fn ip(address: impl Into<String>, port: u16, credentials: Credentials) -> Self {
        Self::with_defaults(
            TransportVariant::IpNetwork,
            DeviceId::default(),
            Some(credentials),
            Endpoint::Tcp {
                address: address.into(),
                port,
            },
        )
    }

    /// Serial session with default timings
    pub fn serial(port: impl Into<String>, baud_rate: u32, device_id: DeviceId) -> Self {
        Self::with_defaults(
            TransportVariant::Serial,
            device_id,
            None,
            Endpoint::Serial {
                port: port.into(),
                baud_rate,
            },
        )
    }

    fn with_defaults(
        variant: TransportVariant,
        device_id: DeviceId,
        credentials: Option<Credentials>,
        endpoint: Endpoint,
    ) -> Self {
        Self {
            variant,
            device_id,
            credentials,
            endpoint,
            warm_up: DEFAULT_WARM_UP,
            cool_down: DEFAULT_COOL_DOWN,
            poll_interval: Some(Duration::from_millis(default_poll_time_ms())),
            warning_timeout: Duration::from_millis(default_warning_timeout_ms()),
            error_timeout: Duration::from_millis(default_error_timeout_ms()),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            reconnect_delay: Duration::from_millis(default_reconnect_delay_ms()),
            reply_timeout: None,
        }
    }

    /// Framer for this session's transport
    pub fn framer(&self) -> CommandFramer {
        CommandFramer::new(self.variant, self.device_id.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tcp_config_defaults() {
        let config = ProjectorConfig::from_json(
            r#"{
                "control": {
                    "method": "tcpip",
                    "tcpSshProperties": { "address": "10.0.0.20", "username": "admin1", "password": "panasonic" }
                }
            }"#,
        )
        .unwrap();

        let session = config.into_session_config().unwrap();
        assert_eq!(session.variant, TransportVariant::IpNetwork);
        assert_eq!(
            session.endpoint,
            Endpoint::Tcp {
                address: "10.0.0.20".into(),
                port: DEFAULT_TCP_PORT
            }
        );
        assert_eq!(session.credentials, Some(Credentials::new("admin1", "panasonic")));
        assert_eq!(session.warm_up, DEFAULT_WARM_UP);
        assert_eq!(session.cool_down, DEFAULT_COOL_DOWN);
        assert_eq!(session.poll_interval, Some(Duration::from_millis(50_000)));
        assert_eq!(session.queue_capacity, 50);
        assert_eq!(session.reply_timeout, None);
    }

    #[test]
    fn test_serial_config_with_overrides() {
        let config = ProjectorConfig::from_json(
            r#"{
                "control": { "method": "com", "comParams": { "port": "/dev/ttyUSB0" } },
                "id": "01",
                "warmupTimeInSeconds": 30,
                "cooldownTimeInSeconds": 90,
                "pollTimeMs": 0,
                "queueCapacity": 10,
                "replyTimeoutMs": 3000
            }"#,
        )
        .unwrap();

        let session = config.into_session_config().unwrap();
        assert_eq!(session.variant, TransportVariant::Serial);
        assert_eq!(session.device_id.as_str(), "01");
        assert!(session.credentials.is_none());
        assert_eq!(session.warm_up, Duration::from_secs(30));
        assert_eq!(session.cool_down, Duration::from_secs(90));
        assert_eq!(session.poll_interval, None);
        assert_eq!(session.queue_capacity, 10);
        assert_eq!(session.reply_timeout, Some(Duration::from_millis(3000)));
        assert_eq!(session.framer().frame(&proj_protocol::Command::power_on()), b"\x02AD01;PON\x03");
    }

    #[test]
    fn test_unsupported_method_is_fatal() {
        let config = ProjectorConfig::from_json(r#"{ "control": { "method": "ir" } }"#).unwrap();
        assert!(matches!(
            config.into_session_config(),
            Err(ConfigError::Transport(_))
        ));
    }

    #[test]
    fn test_missing_sections() {
        let tcp = ProjectorConfig::from_json(r#"{ "control": { "method": "tcpip" } }"#).unwrap();
        assert!(matches!(
            tcp.into_session_config(),
            Err(ConfigError::MissingTcpProperties)
        ));

        let com = ProjectorConfig::from_json(r#"{ "control": { "method": "com" } }"#).unwrap();
        assert!(matches!(
            com.into_session_config(),
            Err(ConfigError::MissingComParams)
        ));
    }

    #[test]
    fn test_invalid_values() {
        let bad_id = ProjectorConfig::from_json(
            r#"{ "control": { "method": "com", "comParams": { "port": "COM1" } }, "id": "1;2" }"#,
        )
        .unwrap();
        assert!(bad_id.into_session_config().is_err());

        let bad_timeouts = ProjectorConfig::from_json(
            r#"{
                "control": { "method": "com", "comParams": { "port": "COM1" } },
                "warningTimeoutMs": 5000,
                "errorTimeoutMs": 5000
            }"#,
        )
        .unwrap();
        assert!(matches!(
            bad_timeouts.into_session_config(),
            Err(ConfigError::MonitorTimeouts { .. })
        ));
    }

    #[test]
    fn test_malformed_json() {
        assert!(matches!(
            ProjectorConfig::from_json("{ not json"),
            Err(ConfigError::Json(_))
        ));
    }
}
