//! Projector control session
//!
//! This crate drives one projector over serial or NTCONTROL/TCP: it frames
//! commands, answers the MD5 authentication challenge, keeps exactly one
//! command in flight, attributes replies to that command, and runs the
//! timed power lifecycle.
//!
//! # Architecture
//!
//! [`ProjectorEngine`] is the synchronous core. It never performs I/O; each
//! call leaves [`EngineOutput`]s behind (bytes to write, timers to arm,
//! events to publish). [`run_projector_actor`] owns one engine per device
//! and funnels caller requests, received lines, connection changes and timer
//! expiries through a single channel, so the engine is only ever touched from
//! one task. Callers use a [`ProjectorHandle`] and watch the
//! [`ProjectorEvent`] stream.
//!
//! # Example
//!
//! ```rust,no_run
//! use proj_control::{spawn_projector, Credentials, SessionConfig, TcpConnector};
//!
//! # async fn example() -> Result<(), proj_control::ControlError> {
//! let config = SessionConfig::ip("10.0.0.20", 1024, Credentials::new("admin1", "panasonic"));
//! let connector = TcpConnector::new("10.0.0.20", 1024);
//! let (projector, mut events, _task) = spawn_projector(config, connector);
//!
//! projector.power_on().await?;
//! while let Some(event) = events.recv().await {
//!     println!("{:?}", event);
//! }
//! # Ok(())
//! # }
//! ```

pub mod actor;
pub mod auth;
pub mod config;
pub mod connection;
pub mod engine;
pub mod error;
pub mod events;
pub mod handle;
pub mod monitor;
pub mod parser;
pub mod power;
pub mod queue;
pub mod state;
pub mod transport;

// Re-export actor types
pub use actor::{run_projector_actor, ProjectorActorCommand};
pub use handle::{spawn_projector, ProjectorHandle};

// Re-export session building blocks
pub use auth::{compute_digest, AuthSession, Credentials};
pub use config::{Endpoint, ProjectorConfig, SessionConfig};
pub use engine::{EngineOutput, ProjectorEngine};
pub use error::{AuthError, ConfigError, ControlError};
pub use events::ProjectorEvent;
pub use monitor::{CommsMonitor, CommsStatus};
pub use parser::{parse_line, ParsedLine};
pub use power::{PowerLifecycle, PowerState, PowerTimer};
pub use queue::SendQueue;
pub use state::ProjectorStatus;
pub use transport::{Connector, SerialConnector, TcpConnector, VirtualConnector};
