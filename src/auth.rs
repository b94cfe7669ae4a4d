use std::path::Path;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::AuthError;

const SCOPE: &str = "https://www.googleapis.com/auth/drive";
const AUTH_ENDPOINT: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const TOKEN_ENDPOINT: &str = "https://oauth2.googleapis.com/token";
const OOB_REDIRECT: &str = "urn:ietf:wg:oauth:2.0:oob";

/// Credentials for exactly one console action. Dropped when the action
/// returns; nothing here outlives a single menu selection.
pub struct AuthContext {
    pub access_token: String,
}

#[derive(Debug, Clone, Deserialize)]
struct InstalledCredentials {
    client_id: String,
    client_secret: String,
    #[serde(default)]
    redirect_uris: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct CredentialFile {
    installed: InstalledCredentials,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredToken {
    access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    refresh_token: Option<String>,
    #[serde(default)]
    expiry: Option<DateTime<Utc>>,
}

impl StoredToken {
    /// Fresh means usable for the length of one action, with a margin.
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        match self.expiry {
            Some(expiry) => expiry > now + Duration::seconds(60),
            None => false,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
}

/// Obtain an access token for the drive scope: reuse the cached token if it
/// is still fresh, refresh it if possible, otherwise walk the operator
/// through the one-time browser authorization. `prompt_code` shows the
/// authorization URL and returns the code the operator pasted back.
pub async fn authenticate<F>(
    http: &reqwest::Client,
    credentials_path: &Path,
    token_path: &Path,
    prompt_code: F,
) -> Result<AuthContext, AuthError>
where
    F: FnOnce(&str) -> Result<String, AuthError>,
{
    let credentials = read_credentials(credentials_path).await?;

    if let Some(stored) = read_token(token_path).await {
        if stored.is_fresh(Utc::now()) {
            debug!("using cached drive token");
            return Ok(AuthContext {
                access_token: stored.access_token,
            });
        }

        if let Some(refresh_token) = stored.refresh_token.clone() {
            debug!("cached drive token expired, refreshing");
            let renewed = refresh(http, &credentials, &refresh_token).await?;
            let merged = StoredToken {
                // A refresh response usually omits the refresh token; keep
                // the one we have.
                refresh_token: renewed.refresh_token.or(stored.refresh_token),
                ..renewed
            };
            write_token(token_path, &merged).await?;
            return Ok(AuthContext {
                access_token: merged.access_token,
            });
        }
    }

    let redirect_uri = credentials
        .redirect_uris
        .first()
        .cloned()
        .unwrap_or_else(|| OOB_REDIRECT.to_string());

    let auth_url = reqwest::Url::parse_with_params(
        AUTH_ENDPOINT,
        &[
            ("client_id", credentials.client_id.as_str()),
            ("redirect_uri", redirect_uri.as_str()),
            ("response_type", "code"),
            ("scope", SCOPE),
            ("access_type", "offline"),
        ],
    )
    .map_err(|e| {
        AuthError::MalformedCredentials(credentials_path.to_path_buf(), e.to_string())
    })?;

    let code = prompt_code(auth_url.as_str())?;
    let code = code.trim();
    if code.is_empty() {
        return Err(AuthError::Cancelled);
    }

    let token = exchange(http, &credentials, code, &redirect_uri).await?;
    write_token(token_path, &token).await?;
    info!("drive token stored");

    Ok(AuthContext {
        access_token: token.access_token,
    })
}

async fn read_credentials(path: &Path) -> Result<InstalledCredentials, AuthError> {
    let data = tokio::fs::read(path)
        .await
        .map_err(|_| AuthError::MissingCredentials(path.to_path_buf()))?;
    let file: CredentialFile = serde_json::from_slice(&data)
        .map_err(|e| AuthError::MalformedCredentials(path.to_path_buf(), e.to_string()))?;
    Ok(file.installed)
}

async fn read_token(path: &Path) -> Option<StoredToken> {
    let data = tokio::fs::read(path).await.ok()?;
    serde_json::from_slice(&data).ok()
}

async fn write_token(path: &Path, token: &StoredToken) -> Result<(), AuthError> {
    let json = serde_json::to_vec_pretty(token)
        .map_err(|e| AuthError::MalformedCredentials(path.to_path_buf(), e.to_string()))?;
    tokio::fs::write(path, json).await?;
    Ok(())
}

async fn refresh(
    http: &reqwest::Client,
    credentials: &InstalledCredentials,
    refresh_token: &str,
) -> Result<StoredToken, AuthError> {
    let response = http
        .post(TOKEN_ENDPOINT)
        .form(&[
            ("grant_type", "refresh_token"),
            ("client_id", credentials.client_id.as_str()),
            ("client_secret", credentials.client_secret.as_str()),
            ("refresh_token", refresh_token),
        ])
        .send()
        .await?;

    into_stored(response).await
}

async fn exchange(
    http: &reqwest::Client,
    credentials: &InstalledCredentials,
    code: &str,
    redirect_uri: &str,
) -> Result<StoredToken, AuthError> {
    let response = http
        .post(TOKEN_ENDPOINT)
        .form(&[
            ("grant_type", "authorization_code"),
            ("client_id", credentials.client_id.as_str()),
            ("client_secret", credentials.client_secret.as_str()),
            ("code", code),
            ("redirect_uri", redirect_uri),
        ])
        .send()
        .await?;

    into_stored(response).await
}

async fn into_stored(response: reqwest::Response) -> Result<StoredToken, AuthError> {
    if !response.status().is_success() {
        return Err(AuthError::ExchangeRejected(response.status().as_u16()));
    }

    let token: TokenResponse = response.json().await?;
    Ok(StoredToken {
        access_token: token.access_token,
        refresh_token: token.refresh_token,
        expiry: token
            .expires_in
            .map(|secs| Utc::now() + Duration::seconds(secs)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_freshness_uses_a_margin() {
        let now = Utc::now();
        let fresh = StoredToken {
            access_token: "t".into(),
            refresh_token: None,
            expiry: Some(now + Duration::minutes(10)),
        };
        let nearly_expired = StoredToken {
            access_token: "t".into(),
            refresh_token: None,
            expiry: Some(now + Duration::seconds(30)),
        };
        let undated = StoredToken {
            access_token: "t".into(),
            refresh_token: None,
            expiry: None,
        };

        assert!(fresh.is_fresh(now));
        assert!(!nearly_expired.is_fresh(now));
        assert!(!undated.is_fresh(now));
    }

    #[test]
    fn stored_token_round_trips_without_refresh_token() {
        let token = StoredToken {
            access_token: "abc".into(),
            refresh_token: None,
            expiry: None,
        };

        let json = serde_json::to_string(&token).unwrap();
        assert!(!json.contains("refresh_token"));

        let back: StoredToken = serde_json::from_str(&json).unwrap();
        assert_eq!(back.access_token, "abc");
        assert!(back.refresh_token.is_none());
    }
}
