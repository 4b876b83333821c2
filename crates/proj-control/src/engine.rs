//! Projector session engine
//!
//! The synchronous core of a session. It owns the auth session, send queue,
//! power lifecycle, input state and comms monitor, and never performs I/O.
//! Every entry point appends [`EngineOutput`]s to an internal buffer that the
//! owner drains with [`ProjectorEngine::drain_outputs`] and carries out in
//! order: write bytes, arm timers, reconnect, publish events.

use std::str::FromStr;
use std::time::{Duration, Instant};

use proj_protocol::command::INPUT_SELECT;
use proj_protocol::{Command, CommandFramer, InputId, TransportVariant};
use tracing::{debug, info, warn};

use crate::auth::AuthSession;
use crate::config::SessionConfig;
use crate::error::ControlError;
use crate::events::ProjectorEvent;
use crate::monitor::{CommsMonitor, CommsStatus};
use crate::parser::{parse_line, ParsedLine};
use crate::power::{PowerLifecycle, PowerState, PowerStep, PowerTimer};
use crate::queue::SendQueue;
use crate::state::ProjectorStatus;

/// Side effect requested by the engine
#[derive(Debug, Clone, PartialEq)]
pub enum EngineOutput {
    /// Write these bytes to the transport
    Transmit(Vec<u8>),
    /// Deliver `on_timer(timer, generation)` after `after`
    Schedule {
        /// Which timer
        timer: PowerTimer,
        /// Generation the expiry must match
        generation: u64,
        /// Delay from now
        after: Duration,
    },
    /// Deliver `on_reply_timeout(sequence)` after `after`
    ReplyDeadline {
        /// Transmit sequence the expiry must match
        sequence: u64,
        /// Delay from now
        after: Duration,
    },
    /// The transport is down and commands are waiting
    Reconnect,
    /// Publish to observers
    Event(ProjectorEvent),
}

/// Observable values diffed around every entry point
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Observed {
    power_state: PowerState,
    power_is_on: bool,
    input: InputId,
}

/// Per-device session state machine
#[derive(Debug)]
pub struct ProjectorEngine {
    framer: CommandFramer,
    auth: AuthSession,
    queue: SendQueue,
    power: PowerLifecycle,
    monitor: CommsMonitor,
    input: InputId,
    connected: bool,
    reply_timeout: Option<Duration>,
    /// Bumped on every transmit
    sequence: u64,
    output_buffer: Vec<EngineOutput>,
}

impl ProjectorEngine {
    /// Create an engine for a resolved session configuration
    pub fn new(config: &SessionConfig) -> Self {
        Self {
            framer: config.framer(),
            auth: AuthSession::new(config.variant, config.credentials.clone()),
            queue: SendQueue::new(config.queue_capacity),
            power: PowerLifecycle::new(config.warm_up, config.cool_down),
            monitor: CommsMonitor::new(config.warning_timeout, config.error_timeout),
            input: InputId::None,
            connected: false,
            reply_timeout: config.reply_timeout,
            sequence: 0,
            output_buffer: Vec::new(),
        }
    }

    /// Transport variant in use
    pub fn variant(&self) -> TransportVariant {
        self.framer.variant()
    }

    /// Current power lifecycle state
    pub fn power_state(&self) -> PowerState {
        self.power.state()
    }

    /// Observed on/off flag
    pub fn power_is_on(&self) -> bool {
        self.power.is_on()
    }

    /// Current input
    pub fn current_input(&self) -> InputId {
        self.input
    }

    /// Whether the transport is connected
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Whether commands may be transmitted right now
    pub fn is_ready(&self) -> bool {
        self.connected && self.auth.is_cleared()
    }

    /// Whether the device counts as online
    pub fn is_online(&self) -> bool {
        self.monitor.status().is_online()
    }

    /// Whether any command is waiting or in flight
    pub fn has_work(&self) -> bool {
        !self.queue.is_empty() || self.queue.pending().is_some()
    }

    /// Read-only snapshot of the session
    pub fn status(&self) -> ProjectorStatus {
        ProjectorStatus {
            transport: self.variant(),
            power_state: self.power.state(),
            power_is_on: self.power.is_on(),
            input: self.input,
            connected: self.connected,
            ready: self.is_ready(),
            comms: self.monitor.status(),
            queued: self.queue.len(),
            pending: self.queue.pending().map(|c| c.name().to_string()),
        }
    }

    /// Take everything produced since the last drain
    pub fn drain_outputs(&mut self) -> Vec<EngineOutput> {
        std::mem::take(&mut self.output_buffer)
    }

    // -------------------------------------------------------------------------
    // Caller actions
    // -------------------------------------------------------------------------

    /// Queue an arbitrary command
    pub fn send_command(&mut self, command: Command) -> Result<(), ControlError> {
        let before = self.observed();
        let result = self.enqueue(command);
        self.emit_changes(before);
        result
    }

    /// Turn the projector on (warm-up applies)
    pub fn power_on(&mut self) -> Result<(), ControlError> {
        let before = self.observed();
        let steps = self.power.request_on();
        self.run_power_steps(before, steps)
    }

    /// Turn the projector off (cool-down applies)
    pub fn power_off(&mut self) -> Result<(), ControlError> {
        let before = self.observed();
        let steps = self.power.request_off();
        self.run_power_steps(before, steps)
    }

    /// Send the opposite of the observed power flag
    pub fn power_toggle(&mut self) -> Result<(), ControlError> {
        let before = self.observed();
        let steps = self.power.request_toggle();
        self.run_power_steps(before, steps)
    }

    /// Select an input, powering on first if necessary
    pub fn set_input(&mut self, input: InputId) -> Result<(), ControlError> {
        let before = self.observed();
        let steps = self.power.request_input(input);
        self.run_power_steps(before, steps)
    }

    /// Queue a power query
    pub fn poll(&mut self) -> Result<(), ControlError> {
        self.send_command(Command::power_query())
    }

    // -------------------------------------------------------------------------
    // Transport and timer notifications
    // -------------------------------------------------------------------------

    /// A line arrived from the projector (framing already stripped)
    pub fn on_line(&mut self, line: &str, now: Instant) {
        let before = self.observed();
        self.push_event(ProjectorEvent::DataIn {
            line: line.to_string(),
        });
        if let Some(status) = self.monitor.record_activity(now) {
            self.push_event(ProjectorEvent::CommsStatusChanged { status });
        }

        let parsed = parse_line(line, self.queue.pending());
        let resolves = parsed.resolves_pending();

        match parsed {
            ParsedLine::AuthChallenge(raw) => match self.auth.on_challenge(&raw) {
                Ok(_) => {
                    info!("NTCONTROL challenge accepted, commands will carry a digest");
                    self.push_event(ProjectorEvent::Authenticated { digest: true });
                }
                Err(e) => {
                    warn!("Cannot answer NTCONTROL challenge: {}", e);
                    self.push_error("Auth", e.to_string());
                }
            },
            ParsedLine::MalformedChallenge(raw) => {
                warn!("Malformed NTCONTROL challenge: {:?}", raw);
                self.push_error("Auth", format!("challenge without seed: {:?}", raw));
            }
            ParsedLine::AuthNotRequired => {
                info!("Projector does not require authentication");
                self.auth.on_no_auth();
                self.push_event(ProjectorEvent::Authenticated { digest: false });
            }
            ParsedLine::Unsolicited(text) => {
                debug!("Discarding unsolicited reply {:?}", text);
            }
            ParsedLine::Power(Some(is_on)) => self.power.on_observed_power(is_on),
            ParsedLine::Power(None) => {
                debug!("Power reply carried no state: {:?}", line);
            }
            ParsedLine::Input(input) => self.input = input,
            ParsedLine::Resolved => {}
        }

        if resolves {
            let gate = self.is_ready();
            if let Some(next) = self.queue.on_reply_resolved(gate) {
                self.transmit(next);
            }
        }
        self.emit_changes(before);
    }

    /// The transport connected or dropped
    pub fn on_connection_changed(&mut self, connected: bool) {
        if self.connected == connected {
            return;
        }
        let before = self.observed();
        self.connected = connected;
        self.auth.reset();
        self.push_event(ProjectorEvent::ConnectionChanged { connected });

        if connected {
            info!("Connected ({})", self.variant().name());
            if let Some(next) = self.queue.on_transport_ready(self.is_ready()) {
                self.transmit(next);
            }
        } else {
            info!("Disconnected");
            if let Some(lost) = self.queue.abandon_pending() {
                warn!("Abandoning {} after disconnect", lost);
            }
            if !self.queue.is_empty() {
                self.output_buffer.push(EngineOutput::Reconnect);
            }
        }
        self.emit_changes(before);
    }

    /// A scheduled lifecycle timer fired
    pub fn on_timer(&mut self, timer: PowerTimer, generation: u64) {
        let before = self.observed();
        let steps = self.power.on_timer(timer, generation);
        // Deferred input after warm-up; a full queue is already reported as an event
        let _ = self.run_power_steps(before, steps);
    }

    /// The reply deadline for transmit `sequence` passed
    ///
    /// Frees the in-flight slot so a lost reply cannot wedge the queue. The
    /// command is not retried.
    pub fn on_reply_timeout(&mut self, sequence: u64) {
        if sequence != self.sequence {
            return;
        }
        let Some(lost) = self.queue.abandon_pending() else {
            return;
        };
        warn!("No reply to {}, giving up on it", lost);
        let before = self.observed();
        self.push_error("Queue", format!("no reply to {}", lost));

        let gate = self.is_ready();
        if let Some(next) = self.queue.on_transport_ready(gate) {
            self.transmit(next);
        }
        self.emit_changes(before);
    }

    /// Re-evaluate link health
    pub fn on_tick(&mut self, now: Instant) {
        if let Some(status) = self.monitor.evaluate(now) {
            if status == CommsStatus::Error {
                warn!("No traffic from projector, link marked as failed");
            }
            self.push_event(ProjectorEvent::CommsStatusChanged { status });
        }
    }

    /// Start link health monitoring
    pub fn start_monitoring(&mut self, now: Instant) {
        if let Some(status) = self.monitor.start(now) {
            self.push_event(ProjectorEvent::CommsStatusChanged { status });
        }
    }

    /// Stop link health monitoring
    pub fn stop_monitoring(&mut self) {
        if let Some(status) = self.monitor.stop() {
            self.push_event(ProjectorEvent::CommsStatusChanged { status });
        }
    }

    // -------------------------------------------------------------------------
    // Internals
    // -------------------------------------------------------------------------

    /// Apply lifecycle steps; `before` is the snapshot taken ahead of the lifecycle call
    fn run_power_steps(
        &mut self,
        before: Observed,
        steps: Vec<PowerStep>,
    ) -> Result<(), ControlError> {
        let mut result = Ok(());
        for step in steps {
            match step {
                PowerStep::Send(command) => {
                    if let Err(e) = self.enqueue(command) {
                        if result.is_ok() {
                            result = Err(e);
                        }
                    }
                }
                PowerStep::Schedule {
                    timer,
                    generation,
                    after,
                } => self.output_buffer.push(EngineOutput::Schedule {
                    timer,
                    generation,
                    after,
                }),
            }
        }
        self.emit_changes(before);
        result
    }

    fn enqueue(&mut self, command: Command) -> Result<(), ControlError> {
        let gate = self.is_ready();
        match self.queue.enqueue(command.clone(), gate) {
            Ok(Some(next)) => self.transmit(next),
            Ok(None) => {}
            Err(e) => {
                warn!("Rejected {}: {}", command, e);
                self.push_event(ProjectorEvent::CommandRejected {
                    command,
                    reason: e.to_string(),
                });
                return Err(e);
            }
        }
        if !self.connected {
            self.output_buffer.push(EngineOutput::Reconnect);
        }
        Ok(())
    }

    fn transmit(&mut self, command: Command) {
        let framed = self.framer.frame(&command);
        let data = self.auth.apply_prefix(&framed);
        debug!("Sending {} as {:02X?}", command, data);

        if command.is(INPUT_SELECT) {
            if let Some(input) = command.parameter().and_then(|p| InputId::from_str(p).ok()) {
                self.input = input;
            }
        }

        self.sequence += 1;
        self.output_buffer.push(EngineOutput::Transmit(data.clone()));
        if let Some(after) = self.reply_timeout {
            self.output_buffer.push(EngineOutput::ReplyDeadline {
                sequence: self.sequence,
                after,
            });
        }
        self.push_event(ProjectorEvent::DataOut { data });
    }

    fn observed(&self) -> Observed {
        Observed {
            power_state: self.power.state(),
            power_is_on: self.power.is_on(),
            input: self.input,
        }
    }

    fn emit_changes(&mut self, before: Observed) {
        let after = self.observed();
        if before.power_state != after.power_state {
            info!(
                "Power {} -> {}",
                before.power_state.name(),
                after.power_state.name()
            );
            self.push_event(ProjectorEvent::PowerStateChanged {
                state: after.power_state,
            });
        }
        if before.power_is_on != after.power_is_on {
            self.push_event(ProjectorEvent::PowerIsOnChanged {
                on: after.power_is_on,
            });
        }
        if before.input != after.input {
            info!("Input {} -> {}", before.input, after.input);
            self.push_event(ProjectorEvent::InputChanged { input: after.input });
        }
    }

    fn push_event(&mut self, event: ProjectorEvent) {
        self.output_buffer.push(EngineOutput::Event(event));
    }

    fn push_error(&mut self, source: &str, message: String) {
        self.push_event(ProjectorEvent::Error {
            source: source.to_string(),
            message,
        });
    }
}
