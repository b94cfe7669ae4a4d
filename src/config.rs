use std::{
    fmt::{self, Display},
    path::{Path, PathBuf},
    str::FromStr,
};

use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::{fs::File, io::AsyncWriteExt};

use crate::{error::ConfigError, session};

/// Persisted record describing how an installed server is launched.
/// Lives inside the world directory, written once by the install action.
pub const CONFIG_FILE: &str = "mineworker_config.json";

/// JVM heap flags file read by the forge-generated launcher.
pub const JVM_ARGS_FILE: &str = "user_jvm_args.txt";

/// Launch script the install action rewrites to run inside a detached session.
pub const LAUNCH_SCRIPT: &str = "run.sh";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerKind {
    Vanilla,
    Forge,
    Fabric,
    NeoForge,
    Quilt,
    Purpur,
    Paper,
}

impl ServerKind {
    pub const ALL: [ServerKind; 7] = [
        ServerKind::Vanilla,
        ServerKind::Forge,
        ServerKind::Fabric,
        ServerKind::NeoForge,
        ServerKind::Quilt,
        ServerKind::Purpur,
        ServerKind::Paper,
    ];

    /// Only forge installs can currently be started, stopped or attached to.
    /// Other kinds are valid installer choices and round-trip through the
    /// config store, but lifecycle actions refuse them.
    pub fn is_operable(self) -> bool {
        matches!(self, ServerKind::Forge)
    }
}

impl Display for ServerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ServerKind::Vanilla => "vanilla",
            ServerKind::Forge => "forge",
            ServerKind::Fabric => "fabric",
            ServerKind::NeoForge => "neoforge",
            ServerKind::Quilt => "quilt",
            ServerKind::Purpur => "purpur",
            ServerKind::Paper => "paper",
        };
        write!(f, "{name}")
    }
}

impl FromStr for ServerKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "vanilla" => Ok(ServerKind::Vanilla),
            "forge" => Ok(ServerKind::Forge),
            "fabric" => Ok(ServerKind::Fabric),
            "neoforge" => Ok(ServerKind::NeoForge),
            "quilt" => Ok(ServerKind::Quilt),
            "purpur" => Ok(ServerKind::Purpur),
            "paper" => Ok(ServerKind::Paper),
            other => Err(ConfigError::UnknownKind(other.to_string())),
        }
    }
}

/// Maximum heap size string, e.g. `512M` or `2G`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MemoryLimit(String);

impl MemoryLimit {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for MemoryLimit {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let re = Regex::new(r"^\d+[MG]$").unwrap();
        if !re.is_match(s) {
            return Err(ConfigError::InvalidMemory(s.to_string()));
        }
        Ok(Self(s.to_string()))
    }
}

impl TryFrom<String> for MemoryLimit {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<MemoryLimit> for String {
    fn from(value: MemoryLimit) -> Self {
        value.0
    }
}

impl Display for MemoryLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Field names match the file format the console has always written, so
/// configs from older installs keep loading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(rename = "serverType")]
    pub server_type: ServerKind,

    #[serde(rename = "worldPath")]
    pub world_path: PathBuf,

    pub memory: MemoryLimit,
}

pub async fn write_config(world_path: &Path, config: &ServerConfig) -> Result<(), ConfigError> {
    let path = world_path.join(CONFIG_FILE);
    let json = serde_json::to_vec_pretty(config)
        .map_err(|e| ConfigError::Malformed(path.clone(), e.to_string()))?;
    File::create(&path).await?.write_all(&json).await?;
    Ok(())
}

/// A missing file and a damaged file are different failures: the first means
/// "run install", the second means the file needs repair.
pub async fn read_config(world_path: &Path) -> Result<ServerConfig, ConfigError> {
    let path = world_path.join(CONFIG_FILE);
    let data = match tokio::fs::read(&path).await {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ConfigError::NotFound(path));
        }
        Err(e) => return Err(e.into()),
    };

    serde_json::from_slice(&data).map_err(|e| ConfigError::Malformed(path, e.to_string()))
}

pub fn jvm_args(memory: &MemoryLimit) -> String {
    format!("-Xmx{memory}\n-Xms{memory}\n")
}

pub async fn write_jvm_args(world_path: &Path, memory: &MemoryLimit) -> Result<(), ConfigError> {
    let path = world_path.join(JVM_ARGS_FILE);
    File::create(&path)
        .await?
        .write_all(jvm_args(memory).as_bytes())
        .await?;
    Ok(())
}

/// Wrap the java invocation the installer generated so it runs detached
/// inside the named multiplexer session.
pub fn launch_script(kind: ServerKind, java_line: &str) -> String {
    format!(
        "#!/usr/bin/env sh\nscreen -dmS {} {}\n",
        session::session_name(kind),
        java_line.trim()
    )
}

pub async fn write_launch_script(
    world_path: &Path,
    kind: ServerKind,
    java_line: &str,
) -> Result<PathBuf, ConfigError> {
    use std::os::unix::fs::PermissionsExt;

    let path = world_path.join(LAUNCH_SCRIPT);
    File::create(&path)
        .await?
        .write_all(launch_script(kind, java_line).as_bytes())
        .await?;
    tokio::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).await?;
    Ok(path)
}

/// The config record and the launch script are written together by install
/// but can drift apart afterwards. Lifecycle actions call this to catch a
/// script that no longer targets the recorded server kind.
pub async fn validate_launch_script(
    world_path: &Path,
    kind: ServerKind,
) -> Result<PathBuf, ConfigError> {
    let path = world_path.join(LAUNCH_SCRIPT);
    let session = session::session_name(kind);

    let script = tokio::fs::read_to_string(&path)
        .await
        .map_err(|_| ConfigError::LaunchScriptMismatch(path.clone(), session.clone()))?;

    if !script.contains(&session) {
        return Err(ConfigError::LaunchScriptMismatch(path, session));
    }

    Ok(path)
}
