use std::{
    fmt::{self, Display},
    io::SeekFrom,
    path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use reqwest::header::{CONTENT_LENGTH, CONTENT_RANGE, LOCATION, RANGE};
use serde::{Deserialize, Deserializer, Serialize};
use tokio::{
    fs::File,
    io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt},
};
use tracing::{debug, info, warn};

use crate::error::TransferError;

use super::chunk::TransferSession;

pub const ZIP_MIME: &str = "application/zip";

const DRIVE_API: &str = "https://www.googleapis.com";

/// One archive in the remote folder, as returned by the listing query.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RemoteArchive {
    pub id: String,
    pub name: String,
    #[serde(default, rename = "size", deserialize_with = "size_from_string")]
    pub size_bytes: u64,
    #[serde(rename = "modifiedTime")]
    pub modified_at: DateTime<Utc>,
}

// The drive API reports file sizes as JSON strings.
fn size_from_string<'de, D: Deserializer<'de>>(d: D) -> Result<u64, D::Error> {
    let raw = Option::<String>::deserialize(d)?;
    Ok(raw.and_then(|s| s.parse().ok()).unwrap_or(0))
}

impl Display for RemoteArchive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({:.2} MB, modified {})",
            self.name,
            self.size_bytes as f64 / 1024.0 / 1024.0,
            self.modified_at.format("%Y-%m-%d %H:%M"),
        )
    }
}

/// Where an interrupted upload can pick up again: the store-issued session
/// URL plus the bytes it had acknowledged when the transfer died. Persisted
/// beside the archive so a rerun of the upload action can resume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumeState {
    pub session_url: String,
    pub acked_bytes: u64,
}

pub fn resume_path(archive: &Path) -> PathBuf {
    let mut name = archive.as_os_str().to_os_string();
    name.push(".upload.json");
    PathBuf::from(name)
}

async fn load_resume(path: &Path) -> Option<ResumeState> {
    let data = tokio::fs::read(path).await.ok()?;
    serde_json::from_slice(&data).ok()
}

async fn save_resume(path: &Path, state: &ResumeState) {
    match serde_json::to_vec_pretty(state) {
        Ok(json) => {
            if let Err(err) = tokio::fs::write(path, json).await {
                warn!(%err, "failed to persist upload resume state");
            }
        }
        Err(err) => warn!(%err, "failed to serialize upload resume state"),
    }
}

async fn clear_resume(path: &Path) {
    let _ = tokio::fs::remove_file(path).await;
}

/// Moves one archive between local disk and the remote drive folder in
/// 5 MiB chunks, without ever holding the whole file in memory.
pub struct DriveTransport {
    http: reqwest::Client,
    token: String,
    base_url: String,
}

impl DriveTransport {
    pub fn new(access_token: impl Into<String>) -> Result<Self, TransferError> {
        Self::with_base_url(access_token, DRIVE_API)
    }

    /// The base URL is swappable so tests can point at a local mock server.
    pub fn with_base_url(
        access_token: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Result<Self, TransferError> {
        // 308 Resume Incomplete must reach us as a plain response, not be
        // retried as a redirect. A client without that policy is useless
        // here, so construction fails rather than falling back.
        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        Ok(Self {
            http,
            token: access_token.into(),
            base_url: base_url.into(),
        })
    }

    /// Chunked resumable upload. Returns the remote file id. The progress
    /// callback fires after every acknowledged chunk with
    /// `(transferred, total)`. A failed chunk leaves a resume sidecar beside
    /// the archive; the next call probes the store and continues from the
    /// last byte it acknowledged.
    pub async fn upload<F>(
        &self,
        local: &Path,
        folder_id: &str,
        name: &str,
        mut progress: F,
    ) -> Result<String, TransferError>
    where
        F: FnMut(u64, u64),
    {
        let total = tokio::fs::metadata(local).await?.len();
        let sidecar = resume_path(local);

        let (session_url, mut session) = match load_resume(&sidecar).await {
            Some(state) => match self.probe(&state.session_url, total).await {
                Ok(Probe::Complete(id)) => {
                    // The store already holds the whole file from a previous run.
                    clear_resume(&sidecar).await;
                    progress(total, total);
                    return id.ok_or(TransferError::NoFileId);
                }
                Ok(Probe::Partial(acked)) => {
                    info!(acked, total, "resuming interrupted upload");
                    (state.session_url, TransferSession::resumed(total, acked))
                }
                _ => {
                    debug!("stored upload session is no longer usable, starting over");
                    clear_resume(&sidecar).await;
                    let url = self.initiate(folder_id, name, total).await?;
                    (url, TransferSession::new(total))
                }
            },
            None => {
                let url = self.initiate(folder_id, name, total).await?;
                (url, TransferSession::new(total))
            }
        };

        let mut file = File::open(local).await?;
        if session.transferred() > 0 {
            file.seek(SeekFrom::Start(session.transferred())).await?;
        }

        let mut completed = None;
        while let Some(chunk) = session.next_chunk() {
            let mut buf = vec![0u8; chunk.len() as usize];
            file.read_exact(&mut buf).await?;

            let sent = self
                .http
                .put(&session_url)
                .header(CONTENT_LENGTH, chunk.len())
                .header(CONTENT_RANGE, chunk.content_range())
                .body(buf)
                .send()
                .await;

            let response = match sent {
                Ok(response) => response,
                Err(err) => {
                    self.checkpoint(&sidecar, &session_url, &session).await;
                    return Err(err.into());
                }
            };

            match response.status().as_u16() {
                200 | 201 => completed = Some(response),
                308 => {}
                status => {
                    self.checkpoint(&sidecar, &session_url, &session).await;
                    return Err(TransferError::ChunkRejected {
                        range: chunk.content_range(),
                        status,
                    });
                }
            }

            session.ack(&chunk);
            progress(session.transferred(), session.total());
        }

        clear_resume(&sidecar).await;

        let metadata: serde_json::Value = completed.ok_or(TransferError::NoFileId)?.json().await?;
        metadata
            .get("id")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or(TransferError::NoFileId)
    }

    async fn checkpoint(&self, sidecar: &Path, session_url: &str, session: &TransferSession) {
        save_resume(
            sidecar,
            &ResumeState {
                session_url: session_url.to_string(),
                acked_bytes: session.transferred(),
            },
        )
        .await;
    }

    /// Request a resumable session; the store answers with the session URL
    /// in the Location header.
    async fn initiate(
        &self,
        folder_id: &str,
        name: &str,
        total: u64,
    ) -> Result<String, TransferError> {
        let response = self
            .http
            .post(format!("{}/upload/drive/v3/files", self.base_url))
            .query(&[("uploadType", "resumable")])
            .bearer_auth(&self.token)
            .header("X-Upload-Content-Type", ZIP_MIME)
            .header("X-Upload-Content-Length", total)
            .json(&serde_json::json!({ "name": name, "parents": [folder_id] }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(TransferError::InitRejected(response.status().as_u16()));
        }

        response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or(TransferError::NoSessionUrl)
    }

    /// Ask the store how much of a prior session it holds: a `bytes */total`
    /// probe. 308 carries a Range header with the acknowledged prefix;
    /// 200/201 means the upload already finished and the body holds the file
    /// metadata; anything else means the session is gone.
    async fn probe(&self, session_url: &str, total: u64) -> Result<Probe, TransferError> {
        let response = self
            .http
            .put(session_url)
            .header(CONTENT_LENGTH, 0u64)
            .header(CONTENT_RANGE, format!("bytes */{total}"))
            .send()
            .await?;

        match response.status().as_u16() {
            200 | 201 => {
                let id = response
                    .json::<serde_json::Value>()
                    .await
                    .ok()
                    .and_then(|v| v.get("id").and_then(|id| id.as_str()).map(str::to_string));
                Ok(Probe::Complete(id))
            }
            308 => {
                let acked = response
                    .headers()
                    .get(RANGE)
                    .and_then(|v| v.to_str().ok())
                    .and_then(parse_range_end)
                    .map(|end| end + 1)
                    .unwrap_or(0);
                Ok(Probe::Partial(acked))
            }
            _ => Ok(Probe::Gone),
        }
    }

    /// Streaming download; the destination exists and is complete only on
    /// success. Any mid-stream failure removes the partial file.
    pub async fn download<F>(
        &self,
        archive: &RemoteArchive,
        dest: &Path,
        mut progress: F,
    ) -> Result<(), TransferError>
    where
        F: FnMut(u64, u64),
    {
        let response = self
            .http
            .get(format!("{}/drive/v3/files/{}", self.base_url, archive.id))
            .query(&[("alt", "media")])
            .bearer_auth(&self.token)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(TransferError::DownloadRejected(
                archive.name.clone(),
                response.status().as_u16(),
            ));
        }

        let total = response.content_length().unwrap_or(archive.size_bytes);
        let mut sink = File::create(dest).await?;
        let mut stream = response.bytes_stream();
        let mut downloaded = 0u64;

        let streamed: Result<(), TransferError> = async {
            while let Some(item) = stream.next().await {
                let bytes = item?;
                sink.write_all(&bytes).await?;
                downloaded += bytes.len() as u64;
                progress(downloaded, total);
            }
            sink.flush().await?;
            Ok(())
        }
        .await;

        if let Err(err) = streamed {
            drop(sink);
            let _ = tokio::fs::remove_file(dest).await;
            return Err(err);
        }

        Ok(())
    }

    /// One metadata query over the backup folder, newest first. Archive
    /// counts stay small enough that pagination has never been needed.
    pub async fn list_archives(&self, folder_id: &str) -> Result<Vec<RemoteArchive>, TransferError> {
        let query =
            format!("'{folder_id}' in parents and trashed = false and mimeType = '{ZIP_MIME}'");

        let response = self
            .http
            .get(format!("{}/drive/v3/files", self.base_url))
            .query(&[
                ("q", query.as_str()),
                ("fields", "files(id, name, mimeType, modifiedTime, size)"),
                ("orderBy", "modifiedTime desc"),
            ])
            .bearer_auth(&self.token)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(TransferError::ListRejected(response.status().as_u16()));
        }

        #[derive(Deserialize)]
        struct Listing {
            #[serde(default)]
            files: Vec<RemoteArchive>,
        }

        Ok(response.json::<Listing>().await?.files)
    }
}

/// What the store still knows about a previously started upload session.
enum Probe {
    Complete(Option<String>),
    Partial(u64),
    Gone,
}

/// `Range: bytes=0-5242879` → 5242879.
fn parse_range_end(header: &str) -> Option<u64> {
    header.strip_prefix("bytes=")?.split_once('-')?.1.parse().ok()
}
