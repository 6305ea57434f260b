//! Reconciliation planning.
//!
//! Turns provider records into store writes. Everything that does not need
//! the store happens here (display name resolution, phone normalization,
//! primary-flag selection, fingerprinting), so every [`ContactStore`]
//! backend applies identical semantics.
//!
//! Child collections are never merged: an upsert carries the complete phone
//! and email set and the store replaces whatever it had.
//!
//! [`ContactStore`]: crate::store::ContactStore

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::models::{ContactLabel, EmailAddress, PhoneNumber};
use crate::phone;
use crate::remote::{ChangeMarker, RemoteContact, RemoteRecord};

/// Full replacement of one contact's synced content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContactWrite {
    pub resource_name: String,
    pub etag: Option<String>,
    pub given_name: Option<String>,
    pub family_name: Option<String>,
    pub display_name: String,
    pub phones: Vec<PhoneNumber>,
    pub emails: Vec<EmailAddress>,
    pub fingerprint: String,
    /// Remote modification time, or the batch time when the provider has none.
    pub updated_at: i64,
}

impl ContactWrite {
    /// Lower-cased display name kept by stores as the search index key.
    pub fn search_name(&self) -> String {
        search_key(&self.display_name)
    }
}

/// One reconciled operation inside a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOp {
    Upsert(ContactWrite),
    Delete { resource_name: String },
}

impl BatchOp {
    pub fn resource_name(&self) -> &str {
        match self {
            BatchOp::Upsert(w) => &w.resource_name,
            BatchOp::Delete { resource_name } => resource_name,
        }
    }
}

/// What applying a single op did to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyResult {
    Added,
    Updated,
    Unchanged,
    Deleted,
    /// Delete marker for an unknown or already-deleted contact.
    Ignored,
}

/// Counters for one committed batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchOutcome {
    pub added: u64,
    pub updated: u64,
    pub deleted: u64,
    pub unchanged: u64,
}

impl BatchOutcome {
    pub fn record(&mut self, result: ApplyResult) {
        match result {
            ApplyResult::Added => self.added += 1,
            ApplyResult::Updated => self.updated += 1,
            ApplyResult::Deleted => self.deleted += 1,
            ApplyResult::Unchanged => self.unchanged += 1,
            ApplyResult::Ignored => {}
        }
    }
}

/// State of an existing row relevant to an upsert decision.
#[derive(Debug, Clone, Copy)]
pub struct ExistingRow<'a> {
    pub fingerprint: &'a str,
    pub deleted: bool,
}

/// Decide how an upsert lands on the existing row, if any.
///
/// A soft-deleted contact that reappears is revived in place and counts as
/// an update.
pub fn classify_upsert(existing: Option<ExistingRow<'_>>, write: &ContactWrite) -> ApplyResult {
    match existing {
        None => ApplyResult::Added,
        Some(row) if !row.deleted && row.fingerprint == write.fingerprint => {
            ApplyResult::Unchanged
        }
        Some(_) => ApplyResult::Updated,
    }
}

/// Decide how a delete marker lands on the existing row, if any.
pub fn classify_delete(existing: Option<ExistingRow<'_>>) -> ApplyResult {
    match existing {
        Some(row) if !row.deleted => ApplyResult::Deleted,
        _ => ApplyResult::Ignored,
    }
}

/// Plan the store operation for one provider record.
///
/// `batch_time` is used as the modification time when the provider does not
/// report one.
pub fn plan_record(record: RemoteRecord, batch_time: i64) -> BatchOp {
    match record.marker {
        ChangeMarker::Delete => BatchOp::Delete {
            resource_name: record.contact.resource_name,
        },
        ChangeMarker::Add | ChangeMarker::Modify => {
            BatchOp::Upsert(plan_write(record.contact, batch_time))
        }
    }
}

fn plan_write(contact: RemoteContact, batch_time: i64) -> ContactWrite {
    let display_name = contact.resolved_display_name();

    let phone_primary = resolve_primary(contact.phones.iter().map(|p| p.primary));
    let phones: Vec<PhoneNumber> = contact
        .phones
        .iter()
        .enumerate()
        .map(|(i, p)| {
            let n = phone::normalize(&p.value);
            PhoneNumber {
                raw: p.value.clone(),
                normalized: n.normalized,
                display: n.display,
                label: ContactLabel::from_remote(p.kind.as_deref()),
                primary: Some(i) == phone_primary,
                position: i as i64,
            }
        })
        .collect();

    let email_primary = resolve_primary(contact.emails.iter().map(|e| e.primary));
    let emails: Vec<EmailAddress> = contact
        .emails
        .iter()
        .enumerate()
        .map(|(i, e)| EmailAddress {
            address: e.value.trim().to_string(),
            label: ContactLabel::from_remote(e.kind.as_deref()),
            primary: Some(i) == email_primary,
            position: i as i64,
        })
        .collect();

    let mut write = ContactWrite {
        resource_name: contact.resource_name,
        etag: contact.etag,
        given_name: non_empty(contact.given_name),
        family_name: non_empty(contact.family_name),
        display_name,
        phones,
        emails,
        fingerprint: String::new(),
        updated_at: contact
            .updated_at
            .map(|t| t.timestamp())
            .unwrap_or(batch_time),
    };
    write.fingerprint = fingerprint(&write);
    write
}

/// Index of the item that gets the primary flag: the first one the source
/// marked, otherwise the first item. `None` for an empty collection.
pub fn resolve_primary(flags: impl IntoIterator<Item = bool>) -> Option<usize> {
    let mut any = false;
    for (i, flag) in flags.into_iter().enumerate() {
        if flag {
            return Some(i);
        }
        any = true;
    }
    any.then_some(0)
}

/// SHA-256 over everything a sync writes, excluding timestamps.
pub fn fingerprint(write: &ContactWrite) -> String {
    let mut hasher = Sha256::new();
    let mut field = |s: &str| {
        hasher.update((s.len() as u64).to_le_bytes());
        hasher.update(s.as_bytes());
    };
    field(write.etag.as_deref().unwrap_or(""));
    field(write.given_name.as_deref().unwrap_or(""));
    field(write.family_name.as_deref().unwrap_or(""));
    field(&write.display_name);
    for p in &write.phones {
        field(&p.raw);
        field(p.label.as_str());
        field(if p.primary { "1" } else { "0" });
    }
    field("--");
    for e in &write.emails {
        field(&e.address);
        field(e.label.as_str());
        field(if e.primary { "1" } else { "0" });
    }
    format!("{:x}", hasher.finalize())
}

/// Search index key for a display name.
pub fn search_key(display_name: &str) -> String {
    display_name.trim().to_lowercase()
}

fn non_empty(s: Option<String>) -> Option<String> {
    s.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}
