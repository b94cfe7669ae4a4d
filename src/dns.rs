use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::DnsError;

const CLOUDFLARE_API: &str = "https://api.cloudflare.com/client/v4";

/// A single DNS record as returned by the zone's record listing.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DnsRecord {
    pub id: String,
    pub name: String,
    pub content: String,
    #[serde(rename = "type")]
    pub record_type: String,
}

#[derive(Debug, Deserialize)]
struct ApiEnvelope<T> {
    success: bool,
    #[serde(default)]
    errors: Vec<ApiMessage>,
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    message: String,
}

#[derive(Debug, Serialize)]
struct RecordBody<'a> {
    #[serde(rename = "type")]
    record_type: &'a str,
    name: &'a str,
    content: &'a str,
    ttl: u32,
    proxied: bool,
}

/// Thin Cloudflare v4 client scoped to one zone; the console only ever
/// touches the single A record pointing players at this machine.
pub struct DnsClient {
    http: reqwest::Client,
    base_url: String,
    zone_id: String,
    api_token: String,
}

impl DnsClient {
    pub fn new(zone_id: impl Into<String>, api_token: impl Into<String>) -> Self {
        Self::with_base_url(zone_id, api_token, CLOUDFLARE_API)
    }

    pub fn with_base_url(
        zone_id: impl Into<String>,
        api_token: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            zone_id: zone_id.into(),
            api_token: api_token.into(),
        }
    }

    pub async fn find_a_record(&self, hostname: &str) -> Result<Option<DnsRecord>, DnsError> {
        let response = self
            .http
            .get(format!(
                "{}/zones/{}/dns_records",
                self.base_url, self.zone_id
            ))
            .query(&[("type", "A"), ("name", hostname)])
            .bearer_auth(&self.api_token)
            .send()
            .await?;

        let records: Vec<DnsRecord> = unwrap_envelope(response).await?;
        Ok(records.into_iter().next())
    }

    /// Point `hostname` at `address`, creating the A record if the zone has
    /// none and rewriting it if it drifted.
    pub async fn upsert_a_record(
        &self,
        hostname: &str,
        address: &str,
    ) -> Result<DnsRecord, DnsError> {
        let body = RecordBody {
            record_type: "A",
            name: hostname,
            content: address,
            ttl: 300,
            proxied: false,
        };

        match self.find_a_record(hostname).await? {
            Some(record) if record.content == address => Ok(record),
            Some(record) => {
                info!(hostname, old = %record.content, new = %address, "updating A record");
                let response = self
                    .http
                    .put(format!(
                        "{}/zones/{}/dns_records/{}",
                        self.base_url, self.zone_id, record.id
                    ))
                    .bearer_auth(&self.api_token)
                    .json(&body)
                    .send()
                    .await?;
                unwrap_envelope(response).await
            }
            None => {
                info!(hostname, %address, "creating A record");
                let response = self
                    .http
                    .post(format!(
                        "{}/zones/{}/dns_records",
                        self.base_url, self.zone_id
                    ))
                    .bearer_auth(&self.api_token)
                    .json(&body)
                    .send()
                    .await?;
                unwrap_envelope(response).await
            }
        }
    }
}

async fn unwrap_envelope<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, DnsError> {
    if !response.status().is_success() {
        return Err(DnsError::Rejected(response.status().as_u16()));
    }

    let envelope: ApiEnvelope<T> = response.json().await?;
    if !envelope.success {
        let detail = envelope
            .errors
            .into_iter()
            .map(|e| e.message)
            .collect::<Vec<_>>()
            .join("; ");
        return Err(DnsError::ApiFailure(detail));
    }

    envelope
        .result
        .ok_or_else(|| DnsError::ApiFailure("empty result".to_string()))
}
