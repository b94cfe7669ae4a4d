use std::process::Stdio;

use anyhow::{Context, bail};
use inquire::{Select, Text};
use owo_colors::OwoColorize;
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    process::Command,
};

use crate::config::{self, MemoryLimit, ServerConfig, ServerKind};

use super::Console;

/// Run a distribution installer inside the world directory, then write the
/// launch script, JVM flags file and config record next to what it produced.
/// Only forge installers are wired up; the other kinds are selectable but
/// refused, matching what the lifecycle actions can operate.
pub async fn run(console: &Console) -> anyhow::Result<()> {
    if !console.world_path.is_dir() {
        bail!(
            "World path {} does not exist; create it and drop the installer jar inside",
            console.world_path.display()
        );
    }

    let kind = match Select::new("Select the server type to install", ServerKind::ALL.to_vec())
        .prompt()
    {
        Ok(kind) => kind,
        Err(err) if super::prompt_cancelled(&err) => {
            println!("Installation cancelled.");
            return Ok(());
        }
        Err(err) => return Err(err.into()),
    };

    if !kind.is_operable() {
        bail!("installation for {kind} is not supported yet");
    }

    let installer = prompt_installer(console).await?;
    let Some(installer) = installer else {
        println!("Installation cancelled.");
        return Ok(());
    };

    println!("Installing {kind} from {installer}...");
    run_installer(console, &installer).await?;
    println!("{} Installer finished", "✓".green());

    let memory = prompt_memory()?;
    let Some(memory) = memory else {
        println!("Installation cancelled.");
        return Ok(());
    };

    config::write_jvm_args(&console.world_path, &memory).await?;
    println!("{} Memory limit set to {memory}", "✓".green());

    // The forge installer emits a run.sh whose java line carries the right
    // library arguments; keep that line, wrap it in a detached session.
    let java_line = read_java_line(console).await?;
    config::write_launch_script(&console.world_path, kind, &java_line).await?;

    let world_path = tokio::fs::canonicalize(&console.world_path)
        .await
        .unwrap_or_else(|_| console.world_path.clone());
    let server_config = ServerConfig {
        server_type: kind,
        world_path,
        memory,
    };
    config::write_config(&console.world_path, &server_config).await?;

    println!(
        "{} {kind} server installed in {}",
        "✓".green(),
        console.world_path.display()
    );
    Ok(())
}

/// Suggest the first `*installer.jar` in the world directory, let the
/// operator correct it.
async fn prompt_installer(console: &Console) -> anyhow::Result<Option<String>> {
    let mut suggestion = None;
    let mut entries = tokio::fs::read_dir(&console.world_path).await?;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.to_lowercase().contains("forge") && name.ends_with("installer.jar") {
            suggestion = Some(name);
            break;
        }
    }

    loop {
        let mut prompt = Text::new("Installer JAR file name:");
        if let Some(suggestion) = suggestion.as_deref() {
            prompt = prompt.with_default(suggestion);
        }

        let name = match prompt.prompt() {
            Ok(name) => name.trim().to_string(),
            Err(err) if super::prompt_cancelled(&err) => return Ok(None),
            Err(err) => return Err(err.into()),
        };

        if name.is_empty() {
            println!("Installer JAR file name cannot be empty.");
            continue;
        }
        if !console.world_path.join(&name).is_file() {
            println!("File {name} does not exist in the world directory.");
            continue;
        }
        return Ok(Some(name));
    }
}

fn prompt_memory() -> anyhow::Result<Option<MemoryLimit>> {
    loop {
        let raw = match Text::new("Maximum server memory (e.g. 2G):")
            .with_default("2G")
            .prompt()
        {
            Ok(raw) => raw,
            Err(err) if super::prompt_cancelled(&err) => return Ok(None),
            Err(err) => return Err(err.into()),
        };

        match raw.trim().parse::<MemoryLimit>() {
            Ok(memory) => return Ok(Some(memory)),
            Err(err) => println!("{err}"),
        }
    }
}

async fn run_installer(console: &Console, installer: &str) -> anyhow::Result<()> {
    let mut child = Command::new("java")
        .args(["-jar", installer, "--installServer"])
        .current_dir(&console.world_path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .kill_on_drop(true)
        .spawn()
        .context("failed to run java; is a JDK installed?")?;

    let stdout = child.stdout.take().context("installer has no stdout")?;
    let mut lines = BufReader::new(stdout).lines();
    let mut tail: Vec<String> = Vec::new();

    // Ctrl-c aborts the installer (kill_on_drop) instead of orphaning it.
    let status = loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    super::status_line(&line);
                    tail.push(line);
                    if tail.len() > 5 {
                        tail.remove(0);
                    }
                }
                _ => break child.wait().await?,
            },
            _ = tokio::signal::ctrl_c() => {
                super::end_status_line();
                bail!("installation interrupted");
            }
        }
    };
    super::end_status_line();

    if !status.success() {
        bail!(
            "installer exited with {status}; last output:\n{}",
            tail.join("\n")
        );
    }
    Ok(())
}

async fn read_java_line(console: &Console) -> anyhow::Result<String> {
    let script = tokio::fs::read_to_string(console.world_path.join(config::LAUNCH_SCRIPT))
        .await
        .context("the installer did not produce a run.sh launch script")?;

    script
        .lines()
        .find(|line| line.trim_start().starts_with("java"))
        .map(str::to_string)
        .context("run.sh contains no java launch line")
}
