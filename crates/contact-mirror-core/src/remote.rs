//! Collaborator contracts consumed by the sync orchestrator.
//!
//! A [`RemoteContactSource`] serves pages of contact records, either a full
//! listing or the changes since a sync token. A [`CredentialProvider`]
//! supplies the bearer token for each request. Both are implemented by the
//! application crate (HTTP client, static token) and by test fakes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt;

use crate::error::{AuthError, ProviderError};

/// Bearer token for provider requests. Redacted in `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn secret(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken(***)")
    }
}

/// Source of valid access tokens.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Return a token usable right now, or an [`AuthError`] that the caller
    /// must not retry.
    async fn get_valid_token(&self) -> Result<AccessToken, AuthError>;
}

/// Parameters for one page request.
#[derive(Debug, Clone, Copy)]
pub struct PageRequest<'a> {
    /// Present for incremental fetches, absent for full listings.
    pub sync_token: Option<&'a str>,
    /// Continuation cursor from the previous page.
    pub page_token: Option<&'a str>,
    pub page_size: usize,
}

impl PageRequest<'_> {
    pub fn is_incremental(&self) -> bool {
        self.sync_token.is_some()
    }
}

/// Explicit change marker carried by every record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeMarker {
    Add,
    Modify,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemotePhone {
    pub value: String,
    /// Provider type string (`"mobile"`, `"work"`, ...).
    pub kind: Option<String>,
    pub primary: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEmail {
    pub value: String,
    pub kind: Option<String>,
    pub primary: bool,
}

/// A contact as delivered by the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteContact {
    pub resource_name: String,
    pub etag: Option<String>,
    pub given_name: Option<String>,
    pub family_name: Option<String>,
    pub display_name: Option<String>,
    pub phones: Vec<RemotePhone>,
    pub emails: Vec<RemoteEmail>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl RemoteContact {
    /// A contact carrying only its identifier, as seen in delete markers.
    pub fn tombstone(resource_name: impl Into<String>) -> Self {
        Self {
            resource_name: resource_name.into(),
            etag: None,
            given_name: None,
            family_name: None,
            display_name: None,
            phones: Vec::new(),
            emails: Vec::new(),
            updated_at: None,
        }
    }

    /// Display name, falling back to `given family` when the provider sent none.
    pub fn resolved_display_name(&self) -> String {
        if let Some(name) = self.display_name.as_deref().map(str::trim) {
            if !name.is_empty() {
                return name.to_string();
            }
        }
        [self.given_name.as_deref(), self.family_name.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteRecord {
    pub marker: ChangeMarker,
    pub contact: RemoteContact,
}

/// A record the provider sent but that could not be understood. Skipped by
/// the orchestrator and counted in the run report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MalformedRecord {
    pub detail: String,
}

/// One page of provider results.
#[derive(Debug, Clone, Default)]
pub struct RemotePage {
    pub records: Vec<Result<RemoteRecord, MalformedRecord>>,
    /// Continuation cursor; `None` on the last page.
    pub next_page_token: Option<String>,
    /// Sync token for the next incremental run, usually on the last page.
    pub next_sync_token: Option<String>,
}

impl RemotePage {
    pub fn is_last(&self) -> bool {
        self.next_page_token.is_none()
    }
}

/// Paginated provider of contact records.
///
/// Page requests for one credential must be issued strictly in order; the
/// orchestrator never fetches pages in parallel.
#[async_trait]
pub trait RemoteContactSource: Send + Sync {
    /// Short name for log lines.
    fn name(&self) -> &str {
        "remote"
    }

    /// Fetch one page.
    ///
    /// Must return [`ProviderError::TokenExpired`] when `sync_token` is no
    /// longer accepted, distinctly from any other failure.
    async fn fetch_page(
        &self,
        token: &AccessToken,
        request: PageRequest<'_>,
    ) -> Result<RemotePage, ProviderError>;
}
