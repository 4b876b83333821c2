//! Projector session actor
//!
//! One task per projector owns the [`ProjectorEngine`]. Caller requests,
//! received lines, connection changes, timer expiries and poll ticks all
//! arrive through a single command channel, so engine state is only ever
//! touched from this task.
//!
//! # Architecture
//!
//! ```text
//!   ProjectorHandle ──┐
//!   connection task ──┼──> cmd channel ──> actor ──> engine
//!   timer sleeps    ──┘                      │
//!                                            ├──> connection task (bytes)
//!                                            └──> event channel
//! ```
//!
//! Connect attempts and lifecycle timers run as spawned tasks that post their
//! result back into the command channel. Every link gets a connection number;
//! messages from a link that has since been replaced are ignored.

use std::sync::Arc;

use proj_protocol::{Command, InputId};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval, interval_at, Duration, Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::connection::{ConnectionCommand, ProjectorConnection};
use crate::engine::{EngineOutput, ProjectorEngine};
use crate::error::ControlError;
use crate::events::ProjectorEvent;
use crate::power::PowerTimer;
use crate::state::ProjectorStatus;
use crate::transport::Connector;

/// How often link health is re-evaluated
const MONITOR_TICK: Duration = Duration::from_secs(1);

/// Reply channel for caller requests
pub type Responder = oneshot::Sender<Result<(), ControlError>>;

/// Commands sent to the projector actor
#[derive(Debug)]
pub enum ProjectorActorCommand {
    // -------------------------------------------------------------------------
    // Caller requests
    // -------------------------------------------------------------------------
    /// Power on with warm-up
    PowerOn {
        /// Accepted or rejected
        response: Responder,
    },

    /// Power off with cool-down
    PowerOff {
        /// Accepted or rejected
        response: Responder,
    },

    /// Send the opposite of the observed power flag
    PowerToggle {
        /// Accepted or rejected
        response: Responder,
    },

    /// Select an input
    SetInput {
        /// Input to select
        input: InputId,
        /// Accepted or rejected
        response: Responder,
    },

    /// Queue a power query
    Poll {
        /// Accepted or rejected
        response: Responder,
    },

    /// Queue an arbitrary command
    SendCommand {
        /// The command
        command: Command,
        /// Accepted or rejected
        response: Responder,
    },

    /// Query a status snapshot
    QueryStatus {
        /// Channel to send back the snapshot
        response: oneshot::Sender<ProjectorStatus>,
    },

    /// Connect (and keep reconnecting)
    Connect,

    /// Close the link and stop reconnecting
    Disconnect,

    /// Stop the actor
    Shutdown,

    // -------------------------------------------------------------------------
    // Internal notifications
    // -------------------------------------------------------------------------
    /// A connect attempt succeeded
    Connected {
        /// Connection number of the attempt
        connection: u64,
        /// Outbound channel of the new link
        writer: mpsc::Sender<ConnectionCommand>,
    },

    /// A connect attempt failed
    ConnectFailed {
        /// Connection number of the attempt
        connection: u64,
        /// Why
        message: String,
    },

    /// A link closed
    Disconnected {
        /// Connection number of the link
        connection: u64,
    },

    /// A reply line arrived
    LineReceived {
        /// Connection number of the link
        connection: u64,
        /// Line with framing stripped
        line: String,
    },

    /// A lifecycle timer fired
    TimerElapsed {
        /// Which timer
        timer: PowerTimer,
        /// Generation it was scheduled under
        generation: u64,
    },

    /// The reply deadline of a transmitted command passed
    ReplyTimedOut {
        /// Transmit sequence it was armed for
        sequence: u64,
    },

    /// The reconnect delay elapsed
    ReconnectDue,

    /// Report an error from an async task (emits ProjectorEvent::Error)
    ReportError {
        /// Source of the error (e.g. "Transport")
        source: String,
        /// Error message
        message: String,
    },
}

/// Internal state for the projector actor
struct ActorState<C: Connector> {
    engine: ProjectorEngine,
    connector: Arc<C>,
    self_tx: mpsc::WeakSender<ProjectorActorCommand>,
    event_tx: mpsc::Sender<ProjectorEvent>,
    /// Outbound channel of the current link
    writer: Option<mpsc::Sender<ConnectionCommand>>,
    /// Number of the current (or in-progress) link
    connection: u64,
    connecting: bool,
    /// Cleared by an explicit disconnect
    auto_reconnect: bool,
    reconnect_pending: bool,
    reconnect_delay: Duration,
}

impl<C: Connector> ActorState<C> {
    async fn emit(&self, event: ProjectorEvent) {
        let _ = self.event_tx.send(event).await;
    }

    /// Carry out everything the engine asked for
    async fn flush(&mut self) {
        for output in self.engine.drain_outputs() {
            match output {
                EngineOutput::Transmit(data) => match &self.writer {
                    Some(writer) => {
                        if writer.send(ConnectionCommand::Write(data)).await.is_err() {
                            warn!("Link task gone, dropping outbound frame");
                        }
                    }
                    None => warn!("No link, dropping outbound frame"),
                },
                EngineOutput::Schedule {
                    timer,
                    generation,
                    after,
                } => self.schedule_timer(timer, generation, after),
                EngineOutput::ReplyDeadline { sequence, after } => {
                    self.schedule_reply_deadline(sequence, after)
                }
                EngineOutput::Reconnect => self.schedule_reconnect(),
                EngineOutput::Event(event) => self.emit(event).await,
            }
        }
    }

    fn schedule_timer(&self, timer: PowerTimer, generation: u64, after: Duration) {
        debug!("{:?} timer armed for {:?} (generation {})", timer, after, generation);
        let tx = self.self_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(after).await;
            if let Some(tx) = tx.upgrade() {
                let _ = tx
                    .send(ProjectorActorCommand::TimerElapsed { timer, generation })
                    .await;
            }
        });
    }

    fn schedule_reply_deadline(&self, sequence: u64, after: Duration) {
        let tx = self.self_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(after).await;
            if let Some(tx) = tx.upgrade() {
                let _ = tx
                    .send(ProjectorActorCommand::ReplyTimedOut { sequence })
                    .await;
            }
        });
    }

    fn schedule_reconnect(&mut self) {
        if !self.auto_reconnect
            || self.connecting
            || self.writer.is_some()
            || self.reconnect_pending
        {
            return;
        }
        self.reconnect_pending = true;
        debug!("Reconnecting in {:?}", self.reconnect_delay);

        let tx = self.self_tx.clone();
        let delay = self.reconnect_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(tx) = tx.upgrade() {
                let _ = tx.send(ProjectorActorCommand::ReconnectDue).await;
            }
        });
    }

    fn start_connect(&mut self) {
        if self.connecting || self.writer.is_some() {
            return;
        }
        self.connecting = true;
        self.connection += 1;
        let connection = self.connection;
        let connector = Arc::clone(&self.connector);
        let tx = self.self_tx.clone();
        let variant = self.engine.variant();

        info!("Connecting to {} (link {})", connector.describe(), connection);
        tokio::spawn(async move {
            match connector.connect().await {
                Ok(stream) => {
                    let (writer, write_rx) = mpsc::channel(64);
                    let Some(actor_tx) = tx.upgrade() else {
                        return;
                    };
                    // The actor must learn about the link before its first line
                    if actor_tx
                        .send(ProjectorActorCommand::Connected { connection, writer })
                        .await
                        .is_err()
                    {
                        return;
                    }
                    drop(actor_tx);
                    ProjectorConnection::new(connection, connector.describe(), stream, variant, tx)
                        .run(write_rx)
                        .await;
                }
                Err(e) => {
                    if let Some(actor_tx) = tx.upgrade() {
                        let _ = actor_tx
                            .send(ProjectorActorCommand::ConnectFailed {
                                connection,
                                message: e.to_string(),
                            })
                            .await;
                    }
                }
            }
        });
    }

    async fn close_link(&mut self) {
        if let Some(writer) = self.writer.take() {
            let _ = writer.send(ConnectionCommand::Shutdown).await;
            self.engine.on_connection_changed(false);
        }
        // Invalidate any attempt still in flight
        self.connection += 1;
        self.connecting = false;
    }

    async fn respond(&mut self, response: Responder, result: Result<(), ControlError>) {
        self.flush().await;
        let _ = response.send(result);
    }
}

/// Run the projector actor
///
/// Connects immediately and keeps reconnecting after failures until
/// [`ProjectorActorCommand::Disconnect`]. Returns after
/// [`ProjectorActorCommand::Shutdown`] or once every sender is dropped.
pub async fn run_projector_actor<C: Connector>(
    config: SessionConfig,
    connector: C,
    self_tx: mpsc::WeakSender<ProjectorActorCommand>,
    mut cmd_rx: mpsc::Receiver<ProjectorActorCommand>,
    event_tx: mpsc::Sender<ProjectorEvent>,
) {
    let mut state = ActorState {
        engine: ProjectorEngine::new(&config),
        connector: Arc::new(connector),
        self_tx,
        event_tx,
        writer: None,
        connection: 0,
        connecting: false,
        auto_reconnect: true,
        reconnect_pending: false,
        reconnect_delay: config.reconnect_delay,
    };
    info!(
        "Projector actor started ({}, {})",
        config.variant.name(),
        state.connector.describe()
    );

    let mut poll_timer = config.poll_interval.map(|period| {
        let mut timer = interval_at(Instant::now() + period, period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
        timer
    });
    let mut monitor_timer = interval(MONITOR_TICK);
    monitor_timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

    state.engine.start_monitoring(clock_now());
    state.start_connect();
    state.flush().await;

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                let Some(cmd) = cmd else { break; };
                match cmd {
                    ProjectorActorCommand::PowerOn { response } => {
                        let result = state.engine.power_on();
                        state.respond(response, result).await;
                    }

                    ProjectorActorCommand::PowerOff { response } => {
                        let result = state.engine.power_off();
                        state.respond(response, result).await;
                    }

                    ProjectorActorCommand::PowerToggle { response } => {
                        let result = state.engine.power_toggle();
                        state.respond(response, result).await;
                    }

                    ProjectorActorCommand::SetInput { input, response } => {
                        let result = state.engine.set_input(input);
                        state.respond(response, result).await;
                    }

                    ProjectorActorCommand::Poll { response } => {
                        let result = state.engine.poll();
                        state.respond(response, result).await;
                    }

                    ProjectorActorCommand::SendCommand { command, response } => {
                        let result = state.engine.send_command(command);
                        state.respond(response, result).await;
                    }

                    ProjectorActorCommand::QueryStatus { response } => {
                        let _ = response.send(state.engine.status());
                    }

                    ProjectorActorCommand::Connect => {
                        info!("Connect requested");
                        state.auto_reconnect = true;
                        state.engine.start_monitoring(clock_now());
                        state.start_connect();
                        state.flush().await;
                    }

                    ProjectorActorCommand::Disconnect => {
                        info!("Disconnect requested");
                        state.auto_reconnect = false;
                        state.close_link().await;
                        state.engine.stop_monitoring();
                        state.flush().await;
                    }

                    ProjectorActorCommand::Shutdown => {
                        info!("Shutdown requested");
                        state.auto_reconnect = false;
                        state.close_link().await;
                        state.engine.stop_monitoring();
                        state.flush().await;
                        break;
                    }

                    ProjectorActorCommand::Connected { connection, writer } => {
                        if connection != state.connection || !state.connecting {
                            debug!("Dropping stale link {}", connection);
                            let _ = writer.send(ConnectionCommand::Shutdown).await;
                            continue;
                        }
                        state.connecting = false;
                        state.writer = Some(writer);
                        state.engine.on_connection_changed(true);
                        state.flush().await;
                    }

                    ProjectorActorCommand::ConnectFailed { connection, message } => {
                        if connection != state.connection {
                            continue;
                        }
                        warn!("Connect to {} failed: {}", state.connector.describe(), message);
                        state.connecting = false;
                        state.emit(ProjectorEvent::Error {
                            source: "Transport".to_string(),
                            message,
                        }).await;
                        state.schedule_reconnect();
                    }

                    ProjectorActorCommand::Disconnected { connection } => {
                        if connection != state.connection || state.writer.is_none() {
                            continue;
                        }
                        warn!("Link {} dropped", connection);
                        state.writer = None;
                        state.engine.on_connection_changed(false);
                        state.flush().await;
                        state.schedule_reconnect();
                    }

                    ProjectorActorCommand::LineReceived { connection, line } => {
                        if connection != state.connection || state.writer.is_none() {
                            debug!("Ignoring line from stale link {}: {:?}", connection, line);
                            continue;
                        }
                        state.engine.on_line(&line, clock_now());
                        state.flush().await;
                    }

                    ProjectorActorCommand::TimerElapsed { timer, generation } => {
                        state.engine.on_timer(timer, generation);
                        state.flush().await;
                    }

                    ProjectorActorCommand::ReplyTimedOut { sequence } => {
                        state.engine.on_reply_timeout(sequence);
                        state.flush().await;
                    }

                    ProjectorActorCommand::ReconnectDue => {
                        state.reconnect_pending = false;
                        if state.auto_reconnect {
                            state.start_connect();
                        }
                    }

                    ProjectorActorCommand::ReportError { source, message } => {
                        state.emit(ProjectorEvent::Error { source, message }).await;
                    }
                }
            }

            _ = next_tick(&mut poll_timer) => {
                // Avoid stacking queries behind a dead link
                if !state.engine.has_work() {
                    debug!("Polling power state");
                    let _ = state.engine.poll();
                    state.flush().await;
                }
            }

            _ = monitor_timer.tick() => {
                state.engine.on_tick(clock_now());
                state.flush().await;
            }
        }
    }

    info!("Projector actor stopped");
}

/// Engine clock, read from tokio's (pausable) clock
fn clock_now() -> std::time::Instant {
    Instant::now().into_std()
}

async fn next_tick(timer: &mut Option<Interval>) {
    match timer {
        Some(timer) => {
            timer.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::CommsStatus;
    use crate::power::PowerState;
    use crate::transport::VirtualConnector;
    use proj_protocol::DeviceId;
    use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
    use tokio::time::timeout;

    /// Connector whose device ends are handed to the test
    fn test_connector() -> (
        VirtualConnector<impl Fn() -> std::io::Result<DuplexStream> + Send + Sync + 'static>,
        mpsc::UnboundedReceiver<DuplexStream>,
    ) {
        let (device_tx, device_rx) = mpsc::unbounded_channel();
        let connector = VirtualConnector::new("test", move || {
            let (client, device) = tokio::io::duplex(1024);
            device_tx
                .send(device)
                .map_err(|_| std::io::Error::other("test gone"))?;
            Ok(client)
        });
        (connector, device_rx)
    }

    fn spawn_actor<C: Connector>(
        config: SessionConfig,
        connector: C,
    ) -> (
        mpsc::Sender<ProjectorActorCommand>,
        mpsc::Receiver<ProjectorEvent>,
    ) {
        let (cmd_tx, cmd_rx) = mpsc::channel(64);
        let (event_tx, event_rx) = mpsc::channel(256);
        tokio::spawn(run_projector_actor(
            config,
            connector,
            cmd_tx.downgrade(),
            cmd_rx,
            event_tx,
        ));
        (cmd_tx, event_rx)
    }

    async fn status(tx: &mpsc::Sender<ProjectorActorCommand>) -> ProjectorStatus {
        let (response, rx) = oneshot::channel();
        tx.send(ProjectorActorCommand::QueryStatus { response })
            .await
            .unwrap();
        rx.await.unwrap()
    }

    async fn wait_for(
        events: &mut mpsc::Receiver<ProjectorEvent>,
        pred: impl Fn(&ProjectorEvent) -> bool,
    ) -> ProjectorEvent {
        timeout(Duration::from_secs(30), async {
            loop {
                let event = events.recv().await.expect("event channel closed");
                if pred(&event) {
                    return event;
                }
            }
        })
        .await
        .expect("timed out waiting for event")
    }

    async fn read_frame(device: &mut DuplexStream, terminator: u8) -> Vec<u8> {
        let mut out = Vec::new();
        let mut byte = [0u8; 1];
        loop {
            device.read_exact(&mut byte).await.unwrap();
            out.push(byte[0]);
            if byte[0] == terminator {
                return out;
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_warm_up_elapses_to_on() {
        let mut config = SessionConfig::serial("sim", 9600, DeviceId::from(1));
        config.poll_interval = None;
        let (connector, mut devices) = test_connector();
        let (tx, mut events) = spawn_actor(config, connector);

        let mut device = devices.recv().await.unwrap();
        wait_for(&mut events, |e| {
            matches!(e, ProjectorEvent::ConnectionChanged { connected: true })
        })
        .await;

        let (response, rx) = oneshot::channel();
        tx.send(ProjectorActorCommand::PowerOn { response })
            .await
            .unwrap();
        rx.await.unwrap().unwrap();

        assert_eq!(read_frame(&mut device, 0x03).await, b"\x02AD01;PON\x03");
        assert_eq!(status(&tx).await.power_state, PowerState::Warming);

        wait_for(&mut events, |e| {
            matches!(
                e,
                ProjectorEvent::PowerStateChanged {
                    state: PowerState::On
                }
            )
        })
        .await;
        assert!(status(&tx).await.power_is_on);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ip_session_waits_for_greeting() {
        let mut config = SessionConfig::ip(
            "sim",
            1024,
            crate::auth::Credentials::new("admin", "adminpass"),
        );
        config.poll_interval = None;
        let (connector, mut devices) = test_connector();
        let (tx, mut events) = spawn_actor(config, connector);
        let mut device = devices.recv().await.unwrap();
        wait_for(&mut events, |e| {
            matches!(e, ProjectorEvent::ConnectionChanged { connected: true })
        })
        .await;

        let (response, rx) = oneshot::channel();
        tx.send(ProjectorActorCommand::Poll { response }).await.unwrap();
        rx.await.unwrap().unwrap();
        assert_eq!(status(&tx).await.queued, 1);

        device.write_all(b"NTCONTROL 1 12345678\r").await.unwrap();
        assert_eq!(
            read_frame(&mut device, b'\r').await,
            b"be027c90e76bbe0582b88dc6a0cfa6f000QPW\r"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnects_after_drop() {
        let mut config = SessionConfig::serial("sim", 9600, DeviceId::default());
        config.poll_interval = None;
        let (connector, mut devices) = test_connector();
        let (tx, mut events) = spawn_actor(config, connector);

        let first = devices.recv().await.unwrap();
        wait_for(&mut events, |e| {
            matches!(e, ProjectorEvent::ConnectionChanged { connected: true })
        })
        .await;
        drop(first);
        wait_for(&mut events, |e| {
            matches!(e, ProjectorEvent::ConnectionChanged { connected: false })
        })
        .await;

        // Reconnect delay elapses under paused time
        let _second = devices.recv().await.unwrap();
        wait_for(&mut events, |e| {
            matches!(e, ProjectorEvent::ConnectionChanged { connected: true })
        })
        .await;
        assert!(status(&tx).await.connected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_explicit_disconnect_stops_reconnecting() {
        let mut config = SessionConfig::serial("sim", 9600, DeviceId::default());
        config.poll_interval = None;
        let (connector, mut devices) = test_connector();
        let (tx, mut events) = spawn_actor(config, connector);

        let _device = devices.recv().await.unwrap();
        wait_for(&mut events, |e| {
            matches!(e, ProjectorEvent::ConnectionChanged { connected: true })
        })
        .await;

        tx.send(ProjectorActorCommand::Disconnect).await.unwrap();
        wait_for(&mut events, |e| {
            matches!(e, ProjectorEvent::ConnectionChanged { connected: false })
        })
        .await;

        // Queued work must not bring the link back on its own
        let (response, rx) = oneshot::channel();
        tx.send(ProjectorActorCommand::Poll { response }).await.unwrap();
        rx.await.unwrap().unwrap();
        tokio::time::sleep(Duration::from_secs(30)).await;

        let snapshot = status(&tx).await;
        assert!(!snapshot.connected);
        assert_eq!(snapshot.queued, 1);
        assert_eq!(snapshot.comms, CommsStatus::Stopped);
        assert!(devices.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_timer_queries_power() {
        let mut config = SessionConfig::serial("sim", 9600, DeviceId::default());
        config.poll_interval = Some(Duration::from_secs(50));
        let (connector, mut devices) = test_connector();
        let (_tx, mut events) = spawn_actor(config, connector);

        let mut device = devices.recv().await.unwrap();
        wait_for(&mut events, |e| {
            matches!(e, ProjectorEvent::ConnectionChanged { connected: true })
        })
        .await;

        assert_eq!(read_frame(&mut device, 0x03).await, b"\x02ADZZ;QPW\x03");
    }
}
