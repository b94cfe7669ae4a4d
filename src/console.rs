mod install;
mod lifecycle;
mod setup;
mod world;

use std::{
    fmt::{self, Display},
    io::Write,
    path::PathBuf,
};

use inquire::{InquireError, Select};
use owo_colors::OwoColorize;
use tokio::process::Command;
use tracing::error;

use crate::{
    config,
    session::{Screen, SessionManager},
    settings::Settings,
};

/// The operator console: one menu loop, one action at a time. Every failed
/// action is reported and control returns to the menu; only explicit exit
/// (or prompt interrupt at the menu itself) leaves the loop.
pub struct Console {
    pub(crate) world_path: PathBuf,
    pub(crate) settings: Settings,
    pub(crate) sessions: SessionManager<Screen>,
    pub(crate) http: reqwest::Client,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MenuAction {
    Setup,
    Load,
    Upload,
    Install,
    Start,
    Stop,
    Restart,
    Status,
    Console,
    Exit,
}

impl MenuAction {
    const ALL: [MenuAction; 10] = [
        MenuAction::Setup,
        MenuAction::Load,
        MenuAction::Upload,
        MenuAction::Install,
        MenuAction::Start,
        MenuAction::Stop,
        MenuAction::Restart,
        MenuAction::Status,
        MenuAction::Console,
        MenuAction::Exit,
    ];
}

impl Display for MenuAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            MenuAction::Setup => "Quick Setup (install missing packages, update DNS)",
            MenuAction::Load => "Load World (download a world archive from the drive)",
            MenuAction::Upload => "Upload World (archive the world and back it up)",
            MenuAction::Install => "Install Server (run a distribution installer)",
            MenuAction::Start => "Start Server",
            MenuAction::Stop => "Stop Server",
            MenuAction::Restart => "Restart Server",
            MenuAction::Status => "Check Status",
            MenuAction::Console => "Open Console (attach to the server session)",
            MenuAction::Exit => "Exit",
        };
        write!(f, "{label}")
    }
}

impl Console {
    pub fn new(world_path: PathBuf, settings: Settings) -> Self {
        Self {
            world_path,
            settings,
            sessions: SessionManager::new(Screen),
            http: reqwest::Client::new(),
        }
    }

    pub async fn run(&self) -> anyhow::Result<()> {
        loop {
            self.print_banner().await;

            let action = match Select::new("Select an action", MenuAction::ALL.to_vec()).prompt() {
                Ok(action) => action,
                Err(err) if prompt_cancelled(&err) => MenuAction::Exit,
                Err(err) => return Err(err.into()),
            };

            if action == MenuAction::Exit {
                println!("Goodbye!");
                return Ok(());
            }

            if let Err(err) = self.dispatch(action).await {
                error!(?action, err = %err, "action failed");
                println!("{} {err:#}", "✗".red());
            }

            wait_for_enter();
        }
    }

    async fn dispatch(&self, action: MenuAction) -> anyhow::Result<()> {
        match action {
            MenuAction::Setup => setup::run(self).await,
            MenuAction::Load => world::load(self).await,
            MenuAction::Upload => world::upload(self).await,
            MenuAction::Install => install::run(self).await,
            MenuAction::Start => lifecycle::start(self).await,
            MenuAction::Stop => lifecycle::stop(self).await,
            MenuAction::Restart => lifecycle::restart(self).await,
            MenuAction::Status => lifecycle::status(self).await,
            MenuAction::Console => lifecycle::attach(self).await,
            MenuAction::Exit => Ok(()),
        }
    }

    async fn print_banner(&self) {
        let screen = version_line("screen").await;
        let java = version_line("java").await;
        let config = config::read_config(&self.world_path).await.ok();

        println!();
        println!("{}", "Minecraft Worker Node".cyan().bold());
        println!(
            "  {} {}",
            "World dir:".cyan(),
            self.world_path.display().green()
        );
        print_tool_line("screen", screen.as_deref());
        print_tool_line("java", java.as_deref());
        match &config {
            Some(config) => {
                println!(
                    "  {} {} ({})",
                    "Server:".cyan(),
                    config.server_type.green(),
                    config.memory
                );
                let running = self.sessions.is_running(config.server_type).await;
                let state = if running {
                    "running".green().to_string()
                } else {
                    "not running".yellow().to_string()
                };
                println!("  {} {state}", "Session:".cyan());
            }
            None => println!("  {} {}", "Server:".cyan(), "not installed".yellow()),
        }
        println!();
    }
}

fn print_tool_line(name: &str, version: Option<&str>) {
    match version {
        Some(version) => println!("  {} {}", format!("{name}:").cyan(), version.green()),
        None => println!("  {} {}", format!("{name}:").cyan(), "not found".red()),
    }
}

/// First line of `<tool> --version`, if the tool is on PATH.
async fn version_line(tool: &str) -> Option<String> {
    let output = Command::new(tool).arg("--version").output().await.ok()?;
    let text = String::from_utf8_lossy(&output.stdout);
    let line = text.lines().next()?.trim();
    if line.is_empty() {
        return None;
    }
    Some(line.to_string())
}

pub(crate) fn prompt_cancelled(err: &InquireError) -> bool {
    matches!(
        err,
        InquireError::OperationCanceled | InquireError::OperationInterrupted
    )
}

/// Redraw a single status line in place; used for chunk progress and for
/// echoing launcher/installer output without scrolling the menu away.
pub(crate) fn status_line(text: &str) {
    let line: String = text.replace(['\r', '\n'], " ").chars().take(100).collect();
    print!("\r\x1b[K{line}");
    let _ = std::io::stdout().flush();
}

pub(crate) fn end_status_line() {
    println!();
}

pub(crate) fn print_transfer_progress(label: &str, done: u64, total: u64) {
    let percent = if total == 0 {
        100.0
    } else {
        done as f64 / total as f64 * 100.0
    };
    status_line(&format!(
        "{label}: {:.2}% ({done} of {total} bytes)",
        percent
    ));
}

fn wait_for_enter() {
    use std::io::BufRead;

    print!("Press enter to continue...");
    let _ = std::io::stdout().flush();
    let mut scratch = String::new();
    let _ = std::io::stdin().lock().read_line(&mut scratch);
}

#[cfg(test)]
mod tests {
    use super::*;

    // Every interactive prompt (install, upload resume, world selection)
    // treats esc and ctrl-c as "abort this action quietly".
    #[test]
    fn esc_and_ctrl_c_both_read_as_cancellation() {
        assert!(prompt_cancelled(&InquireError::OperationCanceled));
        assert!(prompt_cancelled(&InquireError::OperationInterrupted));
        assert!(!prompt_cancelled(&InquireError::NotTTY));
    }
}
