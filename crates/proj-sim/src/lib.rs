//! Projector Simulation Library
//!
//! This crate simulates a Panasonic-style projector for exercising the
//! control session without hardware. It includes:
//!
//! - **VirtualProjector**: answers framed commands, tracks power and input,
//!   and performs the NTCONTROL greeting and digest check on IP links
//! - **run_virtual_projector_task**: serves a virtual projector over any
//!   async stream, such as one half of `tokio::io::duplex()`
//!
//! # Example
//!
//! ```rust
//! use proj_sim::{VirtualProjector, VirtualProjectorConfig};
//!
//! let mut projector = VirtualProjector::new(VirtualProjectorConfig {
//!     require_auth: false,
//!     ..Default::default()
//! });
//!
//! projector.connect();
//! projector.process_line("00PON");
//! assert!(projector.is_on());
//!
//! while let Some(bytes) = projector.take_output() {
//!     println!("Projector output: {:02X?}", bytes);
//! }
//! ```

pub mod projector;
pub mod projector_task;

pub use projector::{VirtualProjector, VirtualProjectorConfig};
pub use projector_task::{run_virtual_projector_task, VirtualProjectorStateEvent};
