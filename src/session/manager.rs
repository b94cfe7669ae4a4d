use std::{
    path::{Path, PathBuf},
    process::Stdio,
    time::Duration,
};

use tokio::{
    io::{AsyncBufReadExt, BufReader},
    process::Command,
    time::{Instant, sleep},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{config::ServerKind, error::SessionError, session::session_name};

use super::Multiplexer;

/// How a bounded wait for session exit ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Exited,
    TimedOut,
    Cancelled,
}

/// Manages the detached server session without ever holding a handle to it:
/// state is re-derived from the multiplexer on every call, because the
/// hosting process can die or be killed outside this tool.
pub struct SessionManager<M: Multiplexer> {
    mux: M,
}

impl<M: Multiplexer> SessionManager<M> {
    pub fn new(mux: M) -> Self {
        Self { mux }
    }

    /// A failed listing (multiplexer missing, no sessions at all) reads as
    /// not-running rather than an error: the console always has a fallback
    /// action, and a genuinely broken setup fails loudly on start.
    pub async fn is_running(&self, kind: ServerKind) -> bool {
        let name = session_name(kind);
        match self.mux.sessions().await {
            Ok(sessions) => sessions.iter().any(|s| s.contains(&name)),
            Err(err) => {
                debug!(%err, "session listing failed, treating as not running");
                false
            }
        }
    }

    /// Spawn the launch script as a detached session. The script's stdout is
    /// streamed line-by-line into `on_output` until it closes; completion
    /// means "process launched", not "server ready". An advisory lock file
    /// beside the script keeps two concurrent starts from racing the
    /// is-running check.
    pub async fn start<F>(
        &self,
        kind: ServerKind,
        launch_script: &Path,
        cwd: &Path,
        mut on_output: F,
    ) -> Result<(), SessionError>
    where
        F: FnMut(&str),
    {
        let _lock = StartLock::acquire(cwd, kind).await?;

        if self.is_running(kind).await {
            return Err(SessionError::AlreadyRunning(session_name(kind)));
        }

        let mut child = Command::new(launch_script)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| SessionError::SpawnFailed(e.to_string()))?;

        let stdout = child.stdout.take().ok_or(SessionError::NoStdoutPipe)?;
        let mut lines = BufReader::new(stdout).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            on_output(&line);
        }

        let status = child.wait().await?;
        if !status.success() {
            return Err(SessionError::SpawnFailed(format!(
                "launch script exited with {status}"
            )));
        }

        Ok(())
    }

    /// Inject the graceful-shutdown convention (`stop` + newline) into the
    /// session's console.
    pub async fn send_stop(&self, kind: ServerKind) -> Result<(), SessionError> {
        let name = session_name(kind);
        if !self.is_running(kind).await {
            return Err(SessionError::NotRunning(name));
        }
        self.mux.send_input(&name, "stop\n").await
    }

    /// Poll until the session is gone, the deadline passes, or the token is
    /// cancelled. A listing failure counts as exited, matching `is_running`.
    pub async fn wait_for_exit(
        &self,
        kind: ServerKind,
        poll_interval: Duration,
        deadline: Duration,
        cancel: &CancellationToken,
    ) -> WaitOutcome {
        let started = Instant::now();
        loop {
            if !self.is_running(kind).await {
                return WaitOutcome::Exited;
            }
            if started.elapsed() >= deadline {
                warn!(kind = %kind, "session did not exit before the deadline");
                return WaitOutcome::TimedOut;
            }
            tokio::select! {
                _ = cancel.cancelled() => return WaitOutcome::Cancelled,
                _ = sleep(poll_interval) => {}
            }
        }
    }
}

/// Advisory lock file keyed by server kind, held across the
/// check-then-spawn sequence in `start`. Removed on drop.
struct StartLock {
    path: PathBuf,
}

impl StartLock {
    async fn acquire(dir: &Path, kind: ServerKind) -> Result<Self, SessionError> {
        let path = dir.join(format!("{}.lock", session_name(kind)));
        match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(_) => Ok(Self { path }),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                Err(SessionError::Locked(path))
            }
            Err(e) => Err(e.into()),
        }
    }
}

impl Drop for StartLock {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}
