use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use inquire::{Confirm, Select, Text};
use owo_colors::OwoColorize;

use crate::{
    archive,
    auth::{self, AuthContext},
    error::AuthError,
    settings::DriveSettings,
    transfer::{self, DriveTransport, RemoteArchive},
};

use super::Console;

fn drive_settings(console: &Console) -> anyhow::Result<&DriveSettings> {
    console.settings.drive.as_ref().context(
        "no drive settings: add a \"drive\" section with folder_id to mineworker.json",
    )
}

/// Authenticate for the duration of this one action. The token leaves this
/// scope only as the transport's bearer string, which is dropped with it.
async fn authenticate(console: &Console, drive: &DriveSettings) -> anyhow::Result<AuthContext> {
    let context = auth::authenticate(
        &console.http,
        &drive.credentials_path,
        &drive.token_path,
        |url| {
            println!("Authorize this app by visiting:\n  {url}");
            Text::new("After authorizing, paste the code here:")
                .prompt()
                .map_err(|_| AuthError::Cancelled)
        },
    )
    .await
    .context("drive authentication failed")?;

    println!("{} Authenticated with the drive", "✓".green());
    Ok(context)
}

/// Archive the world directory and upload it to the backup folder. An
/// interrupted upload leaves its archive and resume sidecar behind; rerunning
/// this action offers to pick that transfer up instead of re-archiving.
pub async fn upload(console: &Console) -> anyhow::Result<()> {
    let drive = drive_settings(console)?;

    if !console.world_path.is_dir() {
        bail!("World path {} does not exist", console.world_path.display());
    }
    let staging = staging_dir(&console.world_path)?;

    let archive_path = match find_resumable(&staging).await? {
        Some(leftover) => {
            println!(
                "An interrupted upload of {} was found.",
                leftover.display()
            );
            let resume = match Confirm::new("Resume it instead of making a fresh archive?")
                .with_default(true)
                .prompt()
            {
                Ok(resume) => resume,
                Err(err) if super::prompt_cancelled(&err) => {
                    println!("Upload cancelled.");
                    return Ok(());
                }
                Err(err) => return Err(err.into()),
            };
            if resume {
                leftover
            } else {
                compress_world(console, &staging).await?
            }
        }
        None => compress_world(console, &staging).await?,
    };

    let name = archive_path
        .file_name()
        .and_then(|n| n.to_str())
        .context("archive path has no file name")?
        .to_string();

    let auth = authenticate(console, drive).await?;
    let transport = DriveTransport::new(auth.access_token)?;

    println!("Uploading {name}...");
    let file_id = transport
        .upload(&archive_path, &drive.folder_id, &name, |done, total| {
            super::print_transfer_progress("Uploading", done, total);
        })
        .await
        .context("upload failed; rerun this action to resume it")?;
    super::end_status_line();

    tokio::fs::remove_file(&archive_path)
        .await
        .context("uploaded fine, but the local archive could not be removed")?;

    println!("{} World uploaded. File ID: {file_id}", "✓".green());
    Ok(())
}

/// Download a chosen remote archive and unpack it over the world directory.
pub async fn load(console: &Console) -> anyhow::Result<()> {
    let drive = drive_settings(console)?;
    let staging = staging_dir(&console.world_path)?;

    let auth = authenticate(console, drive).await?;
    let transport = DriveTransport::new(auth.access_token)?;

    println!("Loading available worlds from the drive...");
    let archives = transport
        .list_archives(&drive.folder_id)
        .await
        .context("failed to list remote archives")?;

    if archives.is_empty() {
        bail!("no world archives found in the backup folder");
    }
    println!(
        "{} {} archive(s) found",
        "✓".green(),
        archives.len()
    );

    let chosen: RemoteArchive = match Select::new("Select a world to load", archives).prompt() {
        Ok(chosen) => chosen,
        Err(err) if super::prompt_cancelled(&err) => {
            println!("Load cancelled.");
            return Ok(());
        }
        Err(err) => return Err(err.into()),
    };

    let dest = staging.join("world.zip");
    println!("Downloading {}...", chosen.name);
    transport
        .download(&chosen, &dest, |done, total| {
            super::print_transfer_progress("Downloading", done, total);
        })
        .await
        .context("download failed; no partial file was left behind")?;
    super::end_status_line();

    println!("Extracting into {}...", console.world_path.display());
    archive::extract(&dest, &console.world_path)
        .await
        .context("failed to extract the downloaded archive")?;

    tokio::fs::remove_file(&dest).await.ok();
    println!("{} World loaded into {}", "✓".green(), console.world_path.display());
    Ok(())
}

/// Archives are staged beside the world directory, never inside it, so a
/// backup does not archive itself.
fn staging_dir(world_path: &Path) -> anyhow::Result<PathBuf> {
    world_path
        .parent()
        .map(Path::to_path_buf)
        .context("world path has no parent directory to stage archives in")
}

async fn compress_world(console: &Console, staging: &Path) -> anyhow::Result<PathBuf> {
    let archive_path = staging.join(archive::backup_name(chrono::Local::now()));

    println!("Archiving {}...", console.world_path.display());
    let size = archive::compress_dir(&console.world_path, &archive_path)
        .await
        .context("failed to archive the world directory")?;
    println!(
        "{} World archived ({:.2} MB)",
        "✓".green(),
        size as f64 / 1024.0 / 1024.0
    );

    Ok(archive_path)
}

/// A leftover `<archive>.zip` with an `.upload.json` sidecar marks an upload
/// that died partway.
async fn find_resumable(staging: &Path) -> anyhow::Result<Option<PathBuf>> {
    let mut entries = tokio::fs::read_dir(staging).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let is_zip = path.extension().is_some_and(|ext| ext == "zip");
        if is_zip && transfer::resume_path(&path).exists() {
            return Ok(Some(path));
        }
    }
    Ok(None)
}
