//! Async I/O for one projector link
//!
//! Each open link runs in its own task. Outbound bytes arrive from the actor
//! over a channel; inbound bytes are split into reply lines with
//! [`LineCodec`] and posted back to the actor. When the stream ends or fails
//! the task reports the disconnect and exits.

use std::io::ErrorKind;

use proj_protocol::{LineCodec, ProtocolCodec, TransportVariant};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::actor::ProjectorActorCommand;

/// Commands that can be sent to a connection task
#[derive(Debug)]
pub enum ConnectionCommand {
    /// Write these bytes
    Write(Vec<u8>),
    /// Close the link
    Shutdown,
}

/// One open link to a projector
///
/// Generic over the I/O type so TCP, serial and in-process simulators share
/// the same loop.
pub struct ProjectorConnection<T> {
    connection: u64,
    name: String,
    io: T,
    codec: LineCodec,
    actor_tx: mpsc::WeakSender<ProjectorActorCommand>,
    buffer: Vec<u8>,
}

impl<T> ProjectorConnection<T>
where
    T: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Wrap an open stream
    pub fn new(
        connection: u64,
        name: String,
        io: T,
        variant: TransportVariant,
        actor_tx: mpsc::WeakSender<ProjectorActorCommand>,
    ) -> Self {
        Self {
            connection,
            name,
            io,
            codec: LineCodec::new(variant),
            actor_tx,
            buffer: vec![0u8; 1024],
        }
    }

    async fn write(&mut self, data: &[u8]) -> Result<(), std::io::Error> {
        self.io.write_all(data).await?;
        self.io.flush().await
    }


    /// Main loop - runs until the link fails, shutdown is requested, or the actor is gone
    pub async fn run(mut self, mut cmd_rx: mpsc::Receiver<ConnectionCommand>) {
        info!("Link {} open on {}", self.connection, self.name);

        loop {
            tokio::select! {
                cmd = cmd_rx.recv() => {
                    match cmd {
                        Some(ConnectionCommand::Write(data)) => {
                            if let Err(e) = self.write(&data).await {
                                warn!("Write error on {}: {}", self.name, e);
                                post(&self.actor_tx, ProjectorActorCommand::ReportError {
                                    source: "Transport".to_string(),
                                    message: format!("Write error: {}", e),
                                }).await;
                                break;
                            }
                        }
                        Some(ConnectionCommand::Shutdown) | None => {
                            debug!("Shutdown requested for link {}", self.connection);
                            break;
                        }
                    }
                }

                result = self.io.read(&mut self.buffer) => {
                    match result {
                        Ok(0) => {
                            debug!("{} closed the link", self.name);
                            break;
                        }
                        Ok(n) => {
                            debug!("Read {} bytes from {}: {:02X?}", n, self.name, &self.buffer[..n]);
                            self.codec.push_bytes(&self.buffer[..n]);
                            while let Some(line) = self.codec.next_line() {
                                let cmd = ProjectorActorCommand::LineReceived {
                                    connection: self.connection,
                                    line,
                                };
                                if !post(&self.actor_tx, cmd).await {
                                    return;
                                }
                            }
                        }
                        Err(e) if e.kind() == ErrorKind::WouldBlock => continue,
                        Err(e) => {
                            warn!("Read error on {}: {}", self.name, e);
                            post(&self.actor_tx, ProjectorActorCommand::ReportError {
                                source: "Transport".to_string(),
                                message: format!("Read error: {}", e),
                            }).await;
                            break;
                        }
                    }
                }
            }
        }

        info!("Link {} on {} closed", self.connection, self.name);
        post(&self.actor_tx, ProjectorActorCommand::Disconnected {
            connection: self.connection,
        })
        .await;
    }
}

/// Deliver to the actor; `false` once the actor is gone
///
/// Borrows only the sender, so the run future stays `Send` for any `Send` stream.
async fn post(
    actor_tx: &mpsc::WeakSender<ProjectorActorCommand>,
    cmd: ProjectorActorCommand,
) -> bool {
    match actor_tx.upgrade() {
        Some(tx) => tx.send(cmd).await.is_ok(),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::marker::PhantomData;
    use std::pin::Pin;
    use std::task::{Context, Poll};

    use tokio::io::{DuplexStream, ReadBuf};

    /// Stream that is `Send` but not `Sync`, like a serial port handle
    struct UnsyncStream {
        inner: DuplexStream,
        _unsync: PhantomData<Cell<()>>,
    }

    impl AsyncRead for UnsyncStream {
        fn poll_read(
            mut self: Pin<&mut Self>,
            cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<std::io::Result<()>> {
            Pin::new(&mut self.inner).poll_read(cx, buf)
        }
    }

    impl AsyncWrite for UnsyncStream {
        fn poll_write(
            mut self: Pin<&mut Self>,
            cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<std::io::Result<usize>> {
            Pin::new(&mut self.inner).poll_write(cx, buf)
        }

        fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
            Pin::new(&mut self.inner).poll_flush(cx)
        }

        fn poll_shutdown(
            mut self: Pin<&mut Self>,
            cx: &mut Context<'_>,
        ) -> Poll<std::io::Result<()>> {
            Pin::new(&mut self.inner).poll_shutdown(cx)
        }
    }

    #[tokio::test]
    async fn test_runs_on_stream_that_is_not_sync() {
        let (actor_tx, mut actor_rx) = mpsc::channel(16);
        let (_write_tx, write_rx) = mpsc::channel(16);
        let (client, mut device) = tokio::io::duplex(256);
        let stream = UnsyncStream {
            inner: client,
            _unsync: PhantomData,
        };

        let conn = ProjectorConnection::new(
            3,
            "serial".into(),
            stream,
            TransportVariant::Serial,
            actor_tx.downgrade(),
        );
        let task = tokio::spawn(conn.run(write_rx));

        device.write_all(b"\x02001\x03").await.unwrap();
        match actor_rx.recv().await.unwrap() {
            ProjectorActorCommand::LineReceived { connection, line } => {
                assert_eq!(connection, 3);
                assert_eq!(line, "001");
            }
            other => panic!("unexpected {:?}", other),
        }

        drop(device);
        assert!(matches!(
            actor_rx.recv().await.unwrap(),
            ProjectorActorCommand::Disconnected { connection: 3 }
        ));
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_lines_and_disconnect_reach_actor() {
        let (actor_tx, mut actor_rx) = mpsc::channel(16);
        let (write_tx, write_rx) = mpsc::channel(16);
        let (client, mut device) = tokio::io::duplex(256);

        let conn = ProjectorConnection::new(
            7,
            "test".into(),
            client,
            TransportVariant::IpNetwork,
            actor_tx.downgrade(),
        );
        let task = tokio::spawn(conn.run(write_rx));

        device.write_all(b"NTCONTROL 0\r001\r").await.unwrap();
        for expected in ["NTCONTROL 0", "001"] {
            match actor_rx.recv().await.unwrap() {
                ProjectorActorCommand::LineReceived { connection, line } => {
                    assert_eq!(connection, 7);
                    assert_eq!(line, expected);
                }
                other => panic!("unexpected {:?}", other),
            }
        }

        write_tx
            .send(ConnectionCommand::Write(b"00QPW\r".to_vec()))
            .await
            .unwrap();
        let mut buf = [0u8; 6];
        device.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"00QPW\r");

        drop(device);
        assert!(matches!(
            actor_rx.recv().await.unwrap(),
            ProjectorActorCommand::Disconnected { connection: 7 }
        ));
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_closes_stream() {
        let (actor_tx, _actor_rx) = mpsc::channel(16);
        let (write_tx, write_rx) = mpsc::channel(16);
        let (client, mut device) = tokio::io::duplex(256);

        let conn = ProjectorConnection::new(
            1,
            "test".into(),
            client,
            TransportVariant::Serial,
            actor_tx.downgrade(),
        );
        let task = tokio::spawn(conn.run(write_rx));
        write_tx.send(ConnectionCommand::Shutdown).await.unwrap();
        task.await.unwrap();

        let mut buf = [0u8; 1];
        assert_eq!(device.read(&mut buf).await.unwrap(), 0);
    }
}
