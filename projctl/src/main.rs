//! projctl - drive a projector from the command line
//!
//! Loads a JSON projector config, opens a control session over the
//! configured transport (or an in-process virtual projector with
//! `--simulate`), issues one action, logs session events for a while and
//! prints a status snapshot.

mod session;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use proj_control::ProjectorConfig;
use proj_protocol::InputId;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "projctl")]
#[command(author, version, about = "Projector control over serial or NTCONTROL/TCP")]
struct Cli {
    /// Projector config file (JSON)
    #[arg(short, long)]
    config: PathBuf,

    /// Talk to an in-process virtual projector instead of the configured transport
    #[arg(long)]
    simulate: bool,

    /// How long to keep the session open after issuing the action
    #[arg(long, default_value_t = 3000)]
    wait_ms: u64,

    #[command(subcommand)]
    command: Action,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
enum Action {
    /// Power on (warm-up applies)
    On,
    /// Power off (cool-down applies)
    Off,
    /// Send the opposite of the observed power state
    Toggle,
    /// Select an input, powering on first if needed
    Input {
        /// Input code (RG1, RG2, VID, SVD, DVI, HD1, HD2, SD1, DL1)
        input: InputId,
    },
    /// Query power state
    Poll,
    /// Send a raw command code, e.g. `send QIN` or `send IIS HD2`
    Send {
        /// Command code
        name: String,
        /// Optional parameter
        parameter: Option<String>,
    },
    /// Connect, wait, and print the session status
    Status,
    /// Keep the session open and log events until Ctrl-C
    Watch,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            "projctl=info,proj_control=info,proj_protocol=info,proj_sim=info".into()
        }))
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();

    let config = ProjectorConfig::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    let session = config
        .into_session_config()
        .context("invalid projector config")?;

    tracing::info!("Starting projctl ({})", session.variant.name());

    let status = session::run(
        session,
        cli.simulate,
        cli.command,
        Duration::from_millis(cli.wait_ms),
    )
    .await?;

    println!("{}", serde_json::to_string_pretty(&status)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_input_action() {
        let cli = Cli::try_parse_from(["projctl", "--config", "p.json", "input", "hd1"]).unwrap();
        assert_eq!(cli.command, Action::Input { input: InputId::Hd1 });
        assert_eq!(cli.wait_ms, 3000);
        assert!(!cli.simulate);
    }

    #[test]
    fn test_parse_rejects_unknown_input() {
        assert!(Cli::try_parse_from(["projctl", "-c", "p.json", "input", "xyz"]).is_err());
    }

    #[test]
    fn test_parse_send_with_parameter() {
        let cli = Cli::try_parse_from([
            "projctl",
            "-c",
            "p.json",
            "--simulate",
            "--wait-ms",
            "100",
            "send",
            "IIS",
            "HD2",
        ])
        .unwrap();
        assert!(cli.simulate);
        assert_eq!(cli.wait_ms, 100);
        assert_eq!(
            cli.command,
            Action::Send {
                name: "IIS".into(),
                parameter: Some("HD2".into())
            }
        );
    }
}
