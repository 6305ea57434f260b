//! People-API remote contact source.
//!
//! Pages through `GET {base_url}/v1/people/me/connections` with a bearer
//! token. A full listing omits `syncToken`; an incremental fetch passes the
//! stored one and receives only changed connections, deletions flagged with
//! `metadata.deleted = true`. Every request asks for a fresh sync token, which
//! the provider returns on the last page.
//!
//! # Status mapping
//!
//! | Response | Error |
//! |----------|-------|
//! | 410, or a body mentioning `EXPIRED_SYNC_TOKEN` | [`ProviderError::TokenExpired`] |
//! | 401, 403 | [`ProviderError::Auth`] |
//! | 429, 5xx, network failure, timeout | [`ProviderError::Transient`] |
//! | any other status, unparseable body | [`ProviderError::Malformed`] |
//!
//! A single connection that cannot be understood becomes a
//! [`MalformedRecord`]; the rest of the page is still delivered.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;

use contact_mirror_core::error::{AuthError, ProviderError};
use contact_mirror_core::remote::{
    AccessToken, ChangeMarker, MalformedRecord, PageRequest, RemoteContact, RemoteContactSource,
    RemoteEmail, RemotePage, RemotePhone, RemoteRecord,
};

use crate::config::{RemoteConfig, SyncConfig};

/// HTTP client for a People-API compatible provider.
pub struct PeopleApiSource {
    client: reqwest::Client,
    base_url: String,
    person_fields: String,
}

impl PeopleApiSource {
    pub fn new(remote: &RemoteConfig, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: remote.base_url.trim_end_matches('/').to_string(),
            person_fields: remote.person_fields.clone(),
        })
    }

    pub fn from_config(remote: &RemoteConfig, sync: &SyncConfig) -> anyhow::Result<Self> {
        Self::new(remote, sync.request_timeout())
    }

    fn connections_url(&self) -> String {
        format!("{}/v1/people/me/connections", self.base_url)
    }
}

#[async_trait]
impl RemoteContactSource for PeopleApiSource {
    fn name(&self) -> &str {
        "people"
    }

    async fn fetch_page(
        &self,
        token: &AccessToken,
        request: PageRequest<'_>,
    ) -> Result<RemotePage, ProviderError> {
        let mut query: Vec<(&str, String)> = vec![
            ("personFields", self.person_fields.clone()),
            ("pageSize", request.page_size.to_string()),
            ("requestSyncToken", "true".to_string()),
        ];
        if let Some(page_token) = request.page_token {
            query.push(("pageToken", page_token.to_string()));
        }
        if let Some(sync_token) = request.sync_token {
            query.push(("syncToken", sync_token.to_string()));
        }

        let response = self
            .client
            .get(self.connections_url())
            .bearer_auth(token.secret())
            .query(&query)
            .send()
            .await
            .map_err(|e| ProviderError::Transient(format!("request failed: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::Transient(format!("failed to read response: {}", e)))?;

        if !status.is_success() {
            return Err(classify_status(status, &body));
        }

        parse_page(&body, request.is_incremental())
    }
}

fn classify_status(status: StatusCode, body: &str) -> ProviderError {
    let snippet: String = body.chars().take(200).collect();
    if status == StatusCode::GONE || body.contains("EXPIRED_SYNC_TOKEN") {
        ProviderError::TokenExpired
    } else if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        ProviderError::Auth(AuthError(format!("provider returned {}: {}", status, snippet)))
    } else if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        ProviderError::Transient(format!("provider returned {}: {}", status, snippet))
    } else {
        ProviderError::Malformed(format!("unexpected status {}: {}", status, snippet))
    }
}

// ─── Wire format ─────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConnectionsResponse {
    #[serde(default)]
    connections: Vec<serde_json::Value>,
    next_page_token: Option<String>,
    next_sync_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Person {
    resource_name: Option<String>,
    etag: Option<String>,
    #[serde(default)]
    metadata: PersonMetadata,
    #[serde(default)]
    names: Vec<Name>,
    #[serde(default)]
    phone_numbers: Vec<Field>,
    #[serde(default)]
    email_addresses: Vec<Field>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PersonMetadata {
    #[serde(default)]
    deleted: bool,
    #[serde(default)]
    sources: Vec<SourceMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SourceMetadata {
    update_time: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct FieldMetadata {
    #[serde(default)]
    primary: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Name {
    display_name: Option<String>,
    given_name: Option<String>,
    family_name: Option<String>,
    #[serde(default)]
    metadata: FieldMetadata,
}

#[derive(Debug, Deserialize)]
struct Field {
    value: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    metadata: FieldMetadata,
}

/// Parse one connections page. Deletions only carry meaning in an
/// incremental fetch; in a full listing every entry is an add.
fn parse_page(body: &str, incremental: bool) -> Result<RemotePage, ProviderError> {
    let response: ConnectionsResponse = serde_json::from_str(body)
        .map_err(|e| ProviderError::Malformed(format!("invalid connections response: {}", e)))?;

    let records = response
        .connections
        .into_iter()
        .map(|value| parse_connection(value, incremental))
        .collect();

    Ok(RemotePage {
        records,
        next_page_token: response.next_page_token.filter(|t| !t.is_empty()),
        next_sync_token: response.next_sync_token.filter(|t| !t.is_empty()),
    })
}

fn parse_connection(
    value: serde_json::Value,
    incremental: bool,
) -> Result<RemoteRecord, MalformedRecord> {
    let person: Person = serde_json::from_value(value).map_err(|e| MalformedRecord {
        detail: format!("unreadable connection: {}", e),
    })?;

    let resource_name = match person.resource_name.filter(|r| !r.trim().is_empty()) {
        Some(r) => r,
        None => {
            return Err(MalformedRecord {
                detail: "connection without resourceName".to_string(),
            })
        }
    };

    if person.metadata.deleted {
        return Ok(RemoteRecord {
            marker: ChangeMarker::Delete,
            contact: RemoteContact::tombstone(resource_name),
        });
    }

    let name = person
        .names
        .iter()
        .find(|n| n.metadata.primary)
        .or_else(|| person.names.first());

    let updated_at = person
        .metadata
        .sources
        .iter()
        .filter_map(|s| s.update_time.as_deref())
        .filter_map(|t| t.parse::<DateTime<Utc>>().ok())
        .max();

    let phones = person
        .phone_numbers
        .into_iter()
        .filter_map(|f| {
            f.value.map(|value| RemotePhone {
                value,
                kind: f.kind,
                primary: f.metadata.primary,
            })
        })
        .collect();

    let emails = person
        .email_addresses
        .into_iter()
        .filter_map(|f| {
            f.value.map(|value| RemoteEmail {
                value,
                kind: f.kind,
                primary: f.metadata.primary,
            })
        })
        .collect();

    Ok(RemoteRecord {
        marker: if incremental {
            ChangeMarker::Modify
        } else {
            ChangeMarker::Add
        },
        contact: RemoteContact {
            resource_name,
            etag: person.etag,
            given_name: name.and_then(|n| n.given_name.clone()),
            family_name: name.and_then(|n| n.family_name.clone()),
            display_name: name.and_then(|n| n.display_name.clone()),
            phones,
            emails,
            updated_at,
        },
    })
}
