//! Transport connectors
//!
//! A [`Connector`] opens a fresh byte stream to the projector each time the
//! session (re)connects. The session never cares what is underneath: TCP,
//! a serial port, or an in-process simulator on a `DuplexStream`.

use std::future::Future;
use std::io;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_serial::{DataBits, Parity, SerialPortBuilderExt, SerialStream, StopBits};
use tracing::debug;

use crate::config::Endpoint;
use crate::error::ControlError;

/// Opens byte streams to a projector
pub trait Connector: Send + Sync + 'static {
    /// The stream type produced
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    /// Open a new connection
    fn connect(&self) -> impl Future<Output = Result<Self::Stream, ControlError>> + Send;

    /// Human-readable target, for logs
    fn describe(&self) -> String;
}

/// NTCONTROL over TCP
#[derive(Debug, Clone)]
pub struct TcpConnector {
    address: String,
    port: u16,
}

impl TcpConnector {
    /// Connect to `address:port`
    pub fn new(address: impl Into<String>, port: u16) -> Self {
        Self {
            address: address.into(),
            port,
        }
    }
}

impl Connector for TcpConnector {
    type Stream = TcpStream;

    fn connect(&self) -> impl Future<Output = Result<TcpStream, ControlError>> + Send {
        async move {
            debug!("Connecting to {}:{}", self.address, self.port);
            let stream = TcpStream::connect((self.address.as_str(), self.port)).await?;
            stream.set_nodelay(true)?;
            Ok(stream)
        }
    }

    fn describe(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }
}

/// RS-232 control port, 8N1
#[derive(Debug, Clone)]
pub struct SerialConnector {
    port: String,
    baud_rate: u32,
}

impl SerialConnector {
    /// Open `port` at `baud_rate`
    pub fn new(port: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port: port.into(),
            baud_rate,
        }
    }
}

impl Connector for SerialConnector {
    type Stream = SerialStream;

    fn connect(&self) -> impl Future<Output = Result<SerialStream, ControlError>> + Send {
        async move {
            debug!("Opening {} at {} baud", self.port, self.baud_rate);
            let stream = tokio_serial::new(&self.port, self.baud_rate)
                .data_bits(DataBits::Eight)
                .parity(Parity::None)
                .stop_bits(StopBits::One)
                .timeout(Duration::from_millis(100))
                .open_native_async()?;
            Ok(stream)
        }
    }

    fn describe(&self) -> String {
        self.port.clone()
    }
}

/// Connector backed by a closure, for in-process simulators
///
/// Each connect calls the closure for a new stream, typically one half of a
/// `tokio::io::duplex()` whose other half was handed to a simulator task.
pub struct VirtualConnector<F> {
    name: String,
    make: F,
}

impl<F> VirtualConnector<F> {
    /// Create a connector named `name` (for logs)
    pub fn new(name: impl Into<String>, make: F) -> Self {
        Self {
            name: name.into(),
            make,
        }
    }
}

impl<F, S> Connector for VirtualConnector<F>
where
    F: Fn() -> io::Result<S> + Send + Sync + 'static,
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    type Stream = S;

    fn connect(&self) -> impl Future<Output = Result<S, ControlError>> + Send {
        let result = (self.make)();
        async move { Ok(result?) }
    }

    fn describe(&self) -> String {
        format!("[VRT] {}", self.name)
    }
}

/// Describe an endpoint without opening it
pub fn describe_endpoint(endpoint: &Endpoint) -> String {
    match endpoint {
        Endpoint::Tcp { address, port } => format!("{}:{}", address, port),
        Endpoint::Serial { port, baud_rate } => format!("{} @ {} baud", port, baud_rate),
    }
}
