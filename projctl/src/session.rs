//! Session wiring for the command line
//!
//! Picks a connector for the configured endpoint (or the simulator), runs a
//! single action and logs events until the wait period is over.

use std::time::Duration;

use anyhow::{Context, Result};
use proj_control::{
    spawn_projector, Connector, Endpoint, ProjectorEvent, ProjectorStatus, SerialConnector,
    SessionConfig, TcpConnector, VirtualConnector,
};
use proj_protocol::{DeviceId, TransportVariant};
use proj_sim::{run_virtual_projector_task, VirtualProjector, VirtualProjectorConfig};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::Action;

/// Run `action` against the projector described by `session`
pub async fn run(
    session: SessionConfig,
    simulate: bool,
    action: Action,
    wait: Duration,
) -> Result<ProjectorStatus> {
    if simulate {
        let connector = simulator_connector(&session);
        return drive(session, connector, action, wait).await;
    }

    match session.endpoint.clone() {
        Endpoint::Tcp { address, port } => {
            drive(session, TcpConnector::new(address, port), action, wait).await
        }
        Endpoint::Serial { port, baud_rate } => {
            drive(session, SerialConnector::new(port, baud_rate), action, wait).await
        }
    }
}

/// Virtual projector that accepts this session's credentials and device id
fn simulator_connector(session: &SessionConfig) -> impl Connector {
    let sim_config = VirtualProjectorConfig {
        id: "projctl-sim".to_string(),
        variant: session.variant,
        device_id: if session.device_id == DeviceId::default() {
            "01".to_string()
        } else {
            session.device_id.to_string()
        },
        require_auth: session.variant == TransportVariant::IpNetwork
            && session
                .credentials
                .as_ref()
                .is_some_and(|c| !c.username.is_empty()),
        username: session
            .credentials
            .as_ref()
            .map(|c| c.username.clone())
            .unwrap_or_default(),
        password: session
            .credentials
            .as_ref()
            .map(|c| c.password.clone())
            .unwrap_or_default(),
        ..Default::default()
    };

    VirtualConnector::new("projctl-sim", move || {
        let (client, device) = tokio::io::duplex(1024);
        let projector = VirtualProjector::new(sim_config.clone());
        tokio::spawn(async move {
            if let Err(e) = run_virtual_projector_task(device, projector, None).await {
                debug!("Simulator link ended: {}", e);
            }
        });
        Ok(client)
    })
}

async fn drive<C: Connector>(
    session: SessionConfig,
    connector: C,
    action: Action,
    wait: Duration,
) -> Result<ProjectorStatus> {
    let (handle, events, task) = spawn_projector(session, connector);
    let logger = tokio::spawn(log_events(events));

    match &action {
        Action::On => handle.power_on().await?,
        Action::Off => handle.power_off().await?,
        Action::Toggle => handle.power_toggle().await?,
        Action::Input { input } => handle.set_input(*input).await?,
        Action::Poll => handle.poll().await?,
        Action::Send { name, parameter } => {
            handle.send_command(name, parameter.as_deref()).await?
        }
        Action::Status | Action::Watch => {}
    }

    if action == Action::Watch {
        info!("Watching; press Ctrl-C to stop");
        tokio::signal::ctrl_c()
            .await
            .context("waiting for Ctrl-C")?;
    } else {
        tokio::time::sleep(wait).await;
    }

    let status = handle.status().await?;
    handle.shutdown().await?;
    task.await.context("session task failed")?;
    logger.abort();
    Ok(status)
}

async fn log_events(mut events: mpsc::Receiver<ProjectorEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            ProjectorEvent::DataOut { data } => {
                debug!("-> {}", String::from_utf8_lossy(&data).escape_debug())
            }
            ProjectorEvent::DataIn { line } => debug!("<- {}", line),
            ProjectorEvent::CommandRejected { command, reason } => {
                warn!("Command {} rejected: {}", command, reason)
            }
            ProjectorEvent::Error { source, message } => warn!("{}: {}", source, message),
            other => info!("{:?}", other),
        }
    }
}
