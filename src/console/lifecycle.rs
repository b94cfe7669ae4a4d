use std::{process::Stdio, time::Duration};

use anyhow::{Context, bail};
use owo_colors::OwoColorize;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::{
    config::{self, ServerConfig},
    error::ConfigError,
    session::{self, WaitOutcome},
};

use super::Console;

const STOP_POLL: Duration = Duration::from_secs(1);
const STOP_DEADLINE: Duration = Duration::from_secs(180);

/// Load the config and check every lifecycle precondition: the world dir
/// exists, the config is present and well-formed, the kind is operable, and
/// the launch script still targets the recorded kind.
async fn read_operable_config(console: &Console) -> anyhow::Result<ServerConfig> {
    if !console.world_path.is_dir() {
        bail!(
            "World path {} does not exist",
            console.world_path.display()
        );
    }

    let config = match config::read_config(&console.world_path).await {
        Ok(config) => config,
        Err(err @ ConfigError::NotFound(_)) => {
            return Err(err).context("no server is installed here; run the install action first");
        }
        Err(err @ ConfigError::Malformed(_, _)) => {
            return Err(err)
                .context("the server configuration is damaged; repair it or re-run install");
        }
        Err(err) => return Err(err.into()),
    };

    if !config.server_type.is_operable() {
        bail!(
            "Server kind {} is not supported yet; re-run install with a forge distribution",
            config.server_type
        );
    }

    config::validate_launch_script(&console.world_path, config.server_type)
        .await
        .context("the launch script no longer matches the installed server; re-run install")?;

    Ok(config)
}

pub async fn start(console: &Console) -> anyhow::Result<()> {
    let config = read_operable_config(console).await?;
    let script = console.world_path.join(config::LAUNCH_SCRIPT);

    println!(
        "Starting {} server in {}...",
        config.server_type,
        console.world_path.display()
    );

    console
        .sessions
        .start(config.server_type, &script, &console.world_path, |line| {
            super::status_line(line);
        })
        .await?;
    super::end_status_line();

    println!(
        "{} Server launched in session {}",
        "✓".green(),
        session::session_name(config.server_type)
    );
    Ok(())
}

pub async fn stop(console: &Console) -> anyhow::Result<()> {
    let config = read_operable_config(console).await?;
    stop_session(console, &config).await?;
    println!("{} Server stopped", "✓".green());
    Ok(())
}

async fn stop_session(console: &Console, config: &ServerConfig) -> anyhow::Result<()> {
    console.sessions.send_stop(config.server_type).await?;
    println!("Waiting for the server to shut down (ctrl-c to stop waiting)...");

    // Ctrl-c cancels the wait, not the whole console.
    let cancel = CancellationToken::new();
    let guard = cancel.clone();
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            guard.cancel();
        }
    });

    let outcome = console
        .sessions
        .wait_for_exit(config.server_type, STOP_POLL, STOP_DEADLINE, &cancel)
        .await;
    watcher.abort();

    match outcome {
        WaitOutcome::Exited => Ok(()),
        WaitOutcome::TimedOut => bail!(
            "the server did not exit within {}s; it is still shutting down or stuck",
            STOP_DEADLINE.as_secs()
        ),
        WaitOutcome::Cancelled => bail!("stopped waiting; the server may still be shutting down"),
    }
}

pub async fn restart(console: &Console) -> anyhow::Result<()> {
    let config = read_operable_config(console).await?;

    if console.sessions.is_running(config.server_type).await {
        stop_session(console, &config).await?;
        println!("{} Server stopped", "✓".green());
    } else {
        println!("Server is not running, starting it fresh...");
    }

    start(console).await
}

pub async fn status(console: &Console) -> anyhow::Result<()> {
    let config = read_operable_config(console).await?;
    let name = session::session_name(config.server_type);

    if console.sessions.is_running(config.server_type).await {
        println!("{} Session {name} is running", "✓".green());
    } else {
        println!("{} Session {name} is not running", "✗".yellow());
    }
    Ok(())
}

/// Attach the operator's terminal to the running session; returns when the
/// operator detaches (or the session dies).
pub async fn attach(console: &Console) -> anyhow::Result<()> {
    let config = read_operable_config(console).await?;
    let name = session::session_name(config.server_type);

    if !console.sessions.is_running(config.server_type).await {
        bail!("session {name} is not running; start the server first");
    }

    println!("Attaching to {name} (detach with ctrl-a d)...");
    let status = Command::new("screen")
        .args(["-r", &name])
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .status()
        .await
        .context("failed to attach; is screen installed?")?;

    println!("Screen session exited with {status}");
    Ok(())
}
