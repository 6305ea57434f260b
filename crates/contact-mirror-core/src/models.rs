//! Core data models used throughout Contact Mirror.
//!
//! These types represent the mirrored contacts, their phone numbers and email
//! addresses, and the singleton sync state record.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A mirrored contact as stored locally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Contact {
    /// Local UUID.
    pub id: String,
    /// Remote resource identifier (e.g. `people/c123`). Unique.
    pub resource_name: String,
    /// Remote version token. Only used to detect no-op updates.
    pub etag: Option<String>,
    pub given_name: Option<String>,
    pub family_name: Option<String>,
    /// The field used for grouping and most search matching.
    pub display_name: String,
    /// Soft-delete flag. Deleted contacts are hidden from every view.
    pub deleted: bool,
    /// SHA-256 over the synced content.
    #[serde(skip)]
    pub fingerprint: String,
    /// Last modification (Unix seconds).
    pub updated_at: i64,
    /// Last time a sync run touched this contact (Unix seconds).
    pub synced_at: i64,
}

/// Type label attached to a phone number or email address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContactLabel {
    Mobile,
    Work,
    Home,
    Other,
}

impl ContactLabel {
    /// Map a provider type string (`"mobile"`, `"workMobile"`, `"homeFax"`, ...)
    /// to one of the four labels.
    pub fn from_remote(kind: Option<&str>) -> Self {
        let kind = match kind {
            Some(k) => k.trim().to_ascii_lowercase(),
            None => return ContactLabel::Other,
        };
        match kind.as_str() {
            "mobile" | "cell" | "iphone" => ContactLabel::Mobile,
            k if k.starts_with("work") => ContactLabel::Work,
            k if k.starts_with("home") => ContactLabel::Home,
            _ => ContactLabel::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ContactLabel::Mobile => "mobile",
            ContactLabel::Work => "work",
            ContactLabel::Home => "home",
            ContactLabel::Other => "other",
        }
    }

    /// Capitalized form shown on phone screens.
    pub fn title(&self) -> &'static str {
        match self {
            ContactLabel::Mobile => "Mobile",
            ContactLabel::Work => "Work",
            ContactLabel::Home => "Home",
            ContactLabel::Other => "Other",
        }
    }
}

impl fmt::Display for ContactLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContactLabel {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(ContactLabel::from_remote(Some(s)))
    }
}

/// A phone number owned by exactly one contact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PhoneNumber {
    pub raw: String,
    /// Digits with an optional leading `+`. Used for equality and search.
    pub normalized: String,
    /// Human-friendly grouped form.
    pub display: String,
    pub label: ContactLabel,
    pub primary: bool,
    /// Source order within the contact.
    pub position: i64,
}

/// An email address owned by exactly one contact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmailAddress {
    pub address: String,
    pub label: ContactLabel,
    pub primary: bool,
    pub position: i64,
}

/// A contact together with its child collections, as read from the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContactRecord {
    #[serde(flatten)]
    pub contact: Contact,
    pub phones: Vec<PhoneNumber>,
    pub emails: Vec<EmailAddress>,
}

impl ContactRecord {
    /// The phone flagged primary, falling back to the first stored one.
    pub fn primary_phone(&self) -> Option<&PhoneNumber> {
        self.phones
            .iter()
            .find(|p| p.primary)
            .or_else(|| self.phones.first())
    }
}

/// Lifecycle phase of the singleton sync state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPhase {
    NeverSynced,
    Idle,
    Syncing,
    Error,
}

impl SyncPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncPhase::NeverSynced => "never_synced",
            SyncPhase::Idle => "idle",
            SyncPhase::Syncing => "syncing",
            SyncPhase::Error => "error",
        }
    }
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncPhase {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "never_synced" => Ok(SyncPhase::NeverSynced),
            "idle" => Ok(SyncPhase::Idle),
            "syncing" => Ok(SyncPhase::Syncing),
            "error" => Ok(SyncPhase::Error),
            other => anyhow::bail!("unknown sync phase: '{}'", other),
        }
    }
}

/// Per-run reconciliation counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncCounts {
    pub added: u64,
    pub updated: u64,
    pub deleted: u64,
    pub unchanged: u64,
    /// Malformed records skipped.
    pub skipped: u64,
}

/// Singleton sync state record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncState {
    pub phase: SyncPhase,
    /// Opaque provider sync token for incremental fetches.
    #[serde(skip_serializing)]
    pub sync_token: Option<String>,
    pub last_success_at: Option<i64>,
    pub last_started_at: Option<i64>,
    pub last_finished_at: Option<i64>,
    pub last_error: Option<String>,
    pub last_counts: Option<SyncCounts>,
}

impl SyncState {
    pub fn has_token(&self) -> bool {
        self.sync_token.as_deref().is_some_and(|t| !t.is_empty())
    }
}

impl Default for SyncState {
    fn default() -> Self {
        Self {
            phase: SyncPhase::NeverSynced,
            sync_token: None,
            last_success_at: None,
            last_started_at: None,
            last_finished_at: None,
            last_error: None,
            last_counts: None,
        }
    }
}

/// Requested sync mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncMode {
    #[default]
    Auto,
    Full,
    Incremental,
}

impl SyncMode {
    /// Resolve `auto` (and a token-less `incremental`) to the pass that will
    /// actually run.
    pub fn resolve(self, has_token: bool) -> SyncMode {
        match (self, has_token) {
            (SyncMode::Full, _) => SyncMode::Full,
            (_, true) => SyncMode::Incremental,
            (_, false) => SyncMode::Full,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SyncMode::Auto => "auto",
            SyncMode::Full => "full",
            SyncMode::Incremental => "incremental",
        }
    }
}

impl fmt::Display for SyncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(SyncMode::Auto),
            "full" => Ok(SyncMode::Full),
            "incremental" => Ok(SyncMode::Incremental),
            other => anyhow::bail!(
                "Unknown sync mode: '{}'. Use auto, full, or incremental.",
                other
            ),
        }
    }
}
