//! Virtual projector actor task
//!
//! Owns a [`VirtualProjector`] and serves it over an async stream, typically
//! the device half of a `tokio::io::duplex()` pair. The task:
//! - Sends the greeting when it starts
//! - Reads framed commands from the stream and writes replies back
//! - Emits state changes via a broadcast channel

use std::io;

use proj_protocol::{InputId, LineCodec, ProtocolCodec};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::VirtualProjector;

/// State event emitted when the virtual projector's state changes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualProjectorStateEvent {
    /// Lamp on
    pub power_on: bool,
    /// Selected input
    pub input: InputId,
}

/// Run the virtual projector actor task
///
/// Returns the projector when the client closes the stream, so its state can
/// be carried over to the next connection.
pub async fn run_virtual_projector_task<S>(
    mut stream: S,
    mut projector: VirtualProjector,
    state_tx: Option<broadcast::Sender<VirtualProjectorStateEvent>>,
) -> io::Result<VirtualProjector>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut codec = LineCodec::new(projector.variant());
    let mut buf = [0u8; 1024];

    info!(
        "Starting virtual projector task for {} ({})",
        projector.id(),
        projector.variant().name()
    );

    projector.connect();
    flush_output(&mut stream, &mut projector).await?;

    loop {
        let n = match stream.read(&mut buf).await {
            Ok(0) => {
                debug!("Virtual projector stream closed for {}", projector.id());
                break;
            }
            Ok(n) => n,
            Err(e) => {
                warn!("Virtual projector {} stream error: {}", projector.id(), e);
                return Err(e);
            }
        };
        debug!(
            "Virtual projector {} received {} bytes: {:02X?}",
            projector.id(),
            n,
            &buf[..n]
        );

        codec.push_bytes(&buf[..n]);
        while let Some(line) = codec.next_line() {
            let before = (projector.is_on(), projector.input());
            projector.process_line(&line);
            let after = (projector.is_on(), projector.input());

            if before != after {
                if let Some(tx) = &state_tx {
                    let _ = tx.send(VirtualProjectorStateEvent {
                        power_on: after.0,
                        input: after.1,
                    });
                }
            }
        }
        flush_output(&mut stream, &mut projector).await?;
    }

    info!("Virtual projector task ended for {}", projector.id());
    Ok(projector)
}

async fn flush_output<S>(stream: &mut S, projector: &mut VirtualProjector) -> io::Result<()>
where
    S: AsyncWrite + Unpin,
{
    while let Some(bytes) = projector.take_output() {
        stream.write_all(&bytes).await?;
    }
    stream.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::VirtualProjectorConfig;
    use proj_protocol::TransportVariant;

    async fn read_reply(client: &mut tokio::io::DuplexStream, terminator: u8) -> Vec<u8> {
        let mut out = Vec::new();
        let mut byte = [0u8; 1];
        loop {
            client.read_exact(&mut byte).await.unwrap();
            out.push(byte[0]);
            if byte[0] == terminator {
                return out;
            }
        }
    }

    #[tokio::test]
    async fn test_ip_session_over_stream() {
        let projector = VirtualProjector::new(VirtualProjectorConfig::default());
        let digest = projector.expected_digest().unwrap();
        let (mut client, device) = tokio::io::duplex(1024);
        let (state_tx, mut state_rx) = broadcast::channel(8);
        let task = tokio::spawn(run_virtual_projector_task(device, projector, Some(state_tx)));

        assert_eq!(read_reply(&mut client, b'\r').await, b"NTCONTROL 1 a1b2c3d4\r");

        client
            .write_all(format!("{}00PON\r", digest).as_bytes())
            .await
            .unwrap();
        assert_eq!(read_reply(&mut client, b'\r').await, b"PON\r");
        assert_eq!(
            state_rx.recv().await.unwrap(),
            VirtualProjectorStateEvent {
                power_on: true,
                input: InputId::None
            }
        );

        drop(client);
        let projector = task.await.unwrap().unwrap();
        assert!(projector.is_on());
        assert_eq!(projector.history(), ["PON"]);
    }

    #[tokio::test]
    async fn test_serial_session_over_stream() {
        let projector = VirtualProjector::new(VirtualProjectorConfig {
            variant: TransportVariant::Serial,
            ..Default::default()
        });
        let (mut client, device) = tokio::io::duplex(1024);
        let task = tokio::spawn(run_virtual_projector_task(device, projector, None));

        // Two frames in one write
        client
            .write_all(b"\x02AD01;PON\x03\x02AD01;QPW\x03")
            .await
            .unwrap();
        assert_eq!(read_reply(&mut client, 0x03).await, b"\x02PON\x03");
        assert_eq!(read_reply(&mut client, 0x03).await, b"\x02001\x03");

        drop(client);
        assert!(task.await.unwrap().is_ok());
    }
}
