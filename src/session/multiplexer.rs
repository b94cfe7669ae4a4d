use async_trait::async_trait;
use tokio::process::Command;

use crate::error::SessionError;

/// The terminal multiplexer hosting the detached server process. The manager
/// only ever needs to enumerate sessions and push console input into one;
/// everything else goes through the launch script.
#[async_trait]
pub trait Multiplexer: Send + Sync {
    /// Names of the sessions the multiplexer currently hosts.
    async fn sessions(&self) -> Result<Vec<String>, SessionError>;

    /// Inject raw text into a named session's input stream.
    async fn send_input(&self, session: &str, input: &str) -> Result<(), SessionError>;
}

/// GNU screen. Sessions are listed with `screen -ls` and fed input with
/// `screen -S <name> -X stuff <text>`.
#[derive(Debug, Default)]
pub struct Screen;

#[async_trait]
impl Multiplexer for Screen {
    async fn sessions(&self) -> Result<Vec<String>, SessionError> {
        // `screen -ls` exits non-zero when no sessions exist; the listing on
        // stdout is still authoritative, so only spawn failures are errors.
        let output = Command::new("screen").arg("-ls").output().await?;
        Ok(parse_session_list(&String::from_utf8_lossy(&output.stdout)))
    }

    async fn send_input(&self, session: &str, input: &str) -> Result<(), SessionError> {
        let status = Command::new("screen")
            .args(["-S", session, "-X", "stuff", input])
            .status()
            .await?;

        if !status.success() {
            return Err(SessionError::CommandFailed(format!(
                "screen -S {session} -X stuff exited with {status}"
            )));
        }

        Ok(())
    }
}

/// Pull session names out of a `screen -ls` listing. Session lines look like
/// `\t12345.mineworker_forge\t(Detached)`; the surrounding banner lines have
/// no `pid.name` token and are skipped.
pub(crate) fn parse_session_list(listing: &str) -> Vec<String> {
    listing
        .lines()
        .filter_map(|line| {
            let first = line.trim().split_whitespace().next()?;
            let (pid, name) = first.split_once('.')?;
            pid.parse::<u32>().ok()?;
            Some(name.to_string())
        })
        .collect()
}
