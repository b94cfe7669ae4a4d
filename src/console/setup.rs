use std::process::Stdio;

use anyhow::{Context, bail};
use inquire::Password;
use owo_colors::OwoColorize;
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    process::Command,
};
use tracing::info;

use crate::dns::DnsClient;

use super::Console;

/// (display name, binary to look for, apt package to install)
const PACKAGES: [(&str, &str, &str); 2] = [
    ("Screen", "screen", "screen"),
    ("Java 21", "java", "openjdk-21-jdk-headless"),
];

/// Check the host has everything the server needs, install what is missing,
/// and point the DNS record at this machine. The sudo password is prompted
/// once and lives only inside this invocation.
pub async fn run(console: &Console) -> anyhow::Result<()> {
    let mut missing = Vec::new();
    for (name, binary, package) in PACKAGES {
        if let Some(version) = super::version_line(binary).await {
            println!("{} {name} is installed ({version})", "✓".green());
        } else {
            missing.push((name, package));
        }
    }

    if !missing.is_empty() {
        let password = match Password::new("Password to install missing packages:")
            .without_confirmation()
            .prompt()
        {
            Ok(password) => password,
            Err(err) if super::prompt_cancelled(&err) => {
                println!("Setup cancelled.");
                return Ok(());
            }
            Err(err) => return Err(err.into()),
        };

        for (name, package) in missing {
            println!("Installing {name}...");
            apt_install(package, &password)
                .await
                .with_context(|| format!("failed to install {name} ({package})"))?;
            println!("{} {name} installed", "✓".green());
        }
    }

    update_dns(console).await?;

    println!("{} Setup complete", "✓".green());
    Ok(())
}

async fn apt_install(package: &str, password: &str) -> anyhow::Result<()> {
    let mut child = Command::new("sudo")
        .args(["-S", "apt-get", "install", "-y", package])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .kill_on_drop(true)
        .spawn()
        .context("failed to spawn sudo")?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin.write_all(password.as_bytes()).await?;
        stdin.write_all(b"\n").await?;
    }

    if let Some(stdout) = child.stdout.take() {
        let mut lines = BufReader::new(stdout).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            super::status_line(&line);
        }
        super::end_status_line();
    }

    let status = child.wait().await?;
    if !status.success() {
        bail!("apt-get exited with {status}; try installing it manually");
    }
    Ok(())
}

async fn update_dns(console: &Console) -> anyhow::Result<()> {
    let Some(dns) = console.settings.dns.as_ref() else {
        println!("No DNS settings configured, skipping the A record update.");
        return Ok(());
    };

    let address = public_ipv4(console)
        .await
        .context("could not determine this machine's public IPv4 address")?;

    let client = DnsClient::new(&dns.zone_id, &dns.api_token);
    let record = client
        .upsert_a_record(&dns.hostname, &address)
        .await
        .with_context(|| format!("failed to update the A record for {}", dns.hostname))?;

    info!(hostname = %record.name, address = %record.content, "A record in place");
    println!(
        "{} {} points at {}",
        "✓".green(),
        record.name,
        record.content
    );
    Ok(())
}

async fn public_ipv4(console: &Console) -> anyhow::Result<String> {
    let address = console
        .http
        .get("https://api.ipify.org")
        .send()
        .await?
        .error_for_status()?
        .text()
        .await?;

    let address = address.trim().to_string();
    if address.parse::<std::net::Ipv4Addr>().is_err() {
        bail!("unexpected answer from the IP echo service: {address:?}");
    }
    Ok(address)
}
