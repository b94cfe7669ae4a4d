use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("No server configuration found in {0}")]
    NotFound(PathBuf),

    #[error("Server configuration {0} is malformed: {1}")]
    Malformed(PathBuf, String),

    #[error("Invalid memory limit {0:?}: expected <number>[M|G], e.g. 2G")]
    InvalidMemory(String),

    #[error("Unknown server kind: {0}")]
    UnknownKind(String),

    #[error("World directory does not exist: {0}")]
    MissingWorldDir(PathBuf),

    #[error("Launch script {0} is missing or does not launch a {1} session")]
    LaunchScriptMismatch(PathBuf, String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Server is already running in session {0}")]
    AlreadyRunning(String),

    #[error("No session named {0} is running")]
    NotRunning(String),

    #[error("Another start is in progress (lock file {0} exists)")]
    Locked(PathBuf),

    #[error("Failed to spawn launch script: {0}")]
    SpawnFailed(String),

    #[error("Failed to access child stdout pipe")]
    NoStdoutPipe,

    #[error("Multiplexer command failed: {0}")]
    CommandFailed(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("Upload initiation was rejected: HTTP {0}")]
    InitRejected(u16),

    #[error("Upload session URL missing from initiation response")]
    NoSessionUrl,

    #[error("Chunk {range} was rejected: HTTP {status}")]
    ChunkRejected { range: String, status: u16 },

    #[error("Completed upload returned no file id")]
    NoFileId,

    #[error("Download of {0} was rejected: HTTP {1}")]
    DownloadRejected(String, u16),

    #[error("Remote listing was rejected: HTTP {0}")]
    ListRejected(u16),

    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("Source directory does not exist: {0}")]
    MissingSource(PathBuf),

    #[error("Archive is corrupt or unreadable: {0}")]
    Corrupt(String),

    #[error(transparent)]
    Zip(#[from] zip::result::ZipError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Archive task was aborted")]
    TaskAborted,
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Credential file {0} is missing")]
    MissingCredentials(PathBuf),

    #[error("Credential file {0} is malformed: {1}")]
    MalformedCredentials(PathBuf, String),

    #[error("Authorization was cancelled")]
    Cancelled,

    #[error("Token exchange was rejected: HTTP {0}")]
    ExchangeRejected(u16),

    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum DnsError {
    #[error("DNS API rejected the request: HTTP {0}")]
    Rejected(u16),

    #[error("DNS API reported failure: {0}")]
    ApiFailure(String),

    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Settings file {0} is malformed: {1}")]
    Malformed(PathBuf, String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
