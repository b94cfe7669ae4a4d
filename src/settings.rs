use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use crate::error::SettingsError;

/// Operator settings, read once at startup from the console's launch
/// directory. Everything in here is optional: a missing file just means the
/// drive and DNS actions will ask for it when they are used.
pub const SETTINGS_FILE: &str = "mineworker.json";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub drive: Option<DriveSettings>,
    #[serde(default)]
    pub dns: Option<DnsSettings>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DriveSettings {
    /// Remote folder holding the world archives.
    pub folder_id: String,
    #[serde(default = "default_credentials_path")]
    pub credentials_path: PathBuf,
    #[serde(default = "default_token_path")]
    pub token_path: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DnsSettings {
    pub zone_id: String,
    pub api_token: String,
    /// Hostname whose A record tracks this machine's public address.
    pub hostname: String,
}

fn default_credentials_path() -> PathBuf {
    PathBuf::from("cred.json")
}

fn default_token_path() -> PathBuf {
    PathBuf::from("token.json")
}

pub async fn load(dir: &Path) -> Result<Settings, SettingsError> {
    let path = dir.join(SETTINGS_FILE);
    let data = match tokio::fs::read(&path).await {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "no settings file, using defaults");
            return Ok(Settings::default());
        }
        Err(e) => return Err(e.into()),
    };

    serde_json::from_slice(&data).map_err(|e| SettingsError::Malformed(path, e.to_string()))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    use super::*;

    #[tokio::test]
    async fn missing_file_yields_empty_settings() {
        let dir = tempdir().unwrap();
        let settings = load(dir.path()).await.unwrap();
        assert!(settings.drive.is_none());
        assert!(settings.dns.is_none());
    }

    #[tokio::test]
    async fn minimal_drive_section_fills_in_defaults() {
        let dir = tempdir().unwrap();
        tokio::fs::write(
            dir.path().join(SETTINGS_FILE),
            br#"{ "drive": { "folder_id": "folder123" } }"#,
        )
        .await
        .unwrap();

        let settings = load(dir.path()).await.unwrap();
        let drive = settings.drive.unwrap();
        assert_eq!(drive.folder_id, "folder123");
        assert_eq!(drive.credentials_path, PathBuf::from("cred.json"));
        assert_eq!(drive.token_path, PathBuf::from("token.json"));
    }

    #[tokio::test]
    async fn damaged_settings_file_is_malformed() {
        let dir = tempdir().unwrap();
        tokio::fs::write(dir.path().join(SETTINGS_FILE), b"{ nope")
            .await
            .unwrap();

        assert!(matches!(
            load(dir.path()).await,
            Err(SettingsError::Malformed(_, _))
        ));
    }
}
