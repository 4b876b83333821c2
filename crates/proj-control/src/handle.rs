//! Caller-side handle to a running projector session

use proj_protocol::{Command, InputId};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::actor::{run_projector_actor, ProjectorActorCommand, Responder};
use crate::config::SessionConfig;
use crate::error::ControlError;
use crate::events::ProjectorEvent;
use crate::state::ProjectorStatus;
use crate::transport::Connector;

/// Capacity of the actor command channel
const COMMAND_CHANNEL_SIZE: usize = 256;
/// Capacity of the event channel
const EVENT_CHANNEL_SIZE: usize = 256;

/// Cloneable handle for driving one projector
///
/// Requests return once the session has accepted (or rejected) them; they
/// never wait for the projector's reply.
#[derive(Debug, Clone)]
pub struct ProjectorHandle {
    cmd_tx: mpsc::Sender<ProjectorActorCommand>,
}

/// Start a session actor on the current tokio runtime
///
/// Returns the handle, the event stream and the actor's join handle.
pub fn spawn_projector<C: Connector>(
    config: SessionConfig,
    connector: C,
) -> (
    ProjectorHandle,
    mpsc::Receiver<ProjectorEvent>,
    JoinHandle<()>,
) {
    let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_CHANNEL_SIZE);
    let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_SIZE);
    let task = tokio::spawn(run_projector_actor(
        config,
        connector,
        cmd_tx.downgrade(),
        cmd_rx,
        event_tx,
    ));
    (ProjectorHandle { cmd_tx }, event_rx, task)
}

impl ProjectorHandle {
    async fn request(
        &self,
        make: impl FnOnce(Responder) -> ProjectorActorCommand,
    ) -> Result<(), ControlError> {
        let (response, rx) = oneshot::channel();
        self.cmd_tx
            .send(make(response))
            .await
            .map_err(|_| ControlError::SessionClosed)?;
        rx.await.map_err(|_| ControlError::SessionClosed)?
    }

    async fn notify(&self, cmd: ProjectorActorCommand) -> Result<(), ControlError> {
        self.cmd_tx
            .send(cmd)
            .await
            .map_err(|_| ControlError::SessionClosed)
    }

    /// Turn on; the session goes through warm-up
    pub async fn power_on(&self) -> Result<(), ControlError> {
        self.request(|response| ProjectorActorCommand::PowerOn { response })
            .await
    }

    /// Turn off; the session goes through cool-down
    pub async fn power_off(&self) -> Result<(), ControlError> {
        self.request(|response| ProjectorActorCommand::PowerOff { response })
            .await
    }

    /// Send the opposite of the observed power flag
    pub async fn power_toggle(&self) -> Result<(), ControlError> {
        self.request(|response| ProjectorActorCommand::PowerToggle { response })
            .await
    }

    /// Select an input (powers on first if off)
    pub async fn set_input(&self, input: InputId) -> Result<(), ControlError> {
        self.request(|response| ProjectorActorCommand::SetInput { input, response })
            .await
    }

    /// Queue a power query
    pub async fn poll(&self) -> Result<(), ControlError> {
        self.request(|response| ProjectorActorCommand::Poll { response })
            .await
    }

    /// Queue a raw command, e.g. `send_command("QIN", None)`
    pub async fn send_command(
        &self,
        name: &str,
        parameter: Option<&str>,
    ) -> Result<(), ControlError> {
        let command = Command::parse_raw(name, parameter)?;
        self.request(|response| ProjectorActorCommand::SendCommand { command, response })
            .await
    }

    /// Connect and re-enable automatic reconnection
    pub async fn connect(&self) -> Result<(), ControlError> {
        self.notify(ProjectorActorCommand::Connect).await
    }

    /// Close the link and disable automatic reconnection
    pub async fn disconnect(&self) -> Result<(), ControlError> {
        self.notify(ProjectorActorCommand::Disconnect).await
    }

    /// Snapshot of the session
    pub async fn status(&self) -> Result<ProjectorStatus, ControlError> {
        let (response, rx) = oneshot::channel();
        self.notify(ProjectorActorCommand::QueryStatus { response })
            .await?;
        rx.await.map_err(|_| ControlError::SessionClosed)
    }

    /// Stop the session
    pub async fn shutdown(&self) -> Result<(), ControlError> {
        self.notify(ProjectorActorCommand::Shutdown).await
    }
}
