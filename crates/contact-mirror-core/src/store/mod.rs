//! Storage abstraction for Contact Mirror.
//!
//! The [`ContactStore`] trait defines every storage operation needed by the
//! sync orchestrator and the read paths, enabling pluggable backends (SQLite
//! in the application crate, [`memory::InMemoryStore`] here).
//!
//! # Consistency contract
//!
//! - [`apply_batch`](ContactStore::apply_batch) is all-or-nothing. Readers
//!   never observe a partially applied batch.
//! - [`try_begin_sync`](ContactStore::try_begin_sync) is a single atomic
//!   compare-and-set on the sync phase. It is the only mutual-exclusion
//!   mechanism for sync runs.
//! - Read operations never return soft-deleted contacts, except
//!   [`contact`](ContactStore::contact) and
//!   [`contact_by_resource`](ContactStore::contact_by_resource), which return
//!   the stored row and leave visibility to the caller.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;

use crate::models::{Contact, ContactRecord, SyncCounts, SyncState};
use crate::reconcile::{BatchOp, BatchOutcome};

/// How a sync run ended, as recorded in the sync state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncCompletion {
    /// Phase → `idle`. A `Some` token replaces the stored one; `None`
    /// leaves it as it is.
    Succeeded {
        sync_token: Option<String>,
        finished_at: i64,
        counts: SyncCounts,
    },
    /// Phase → `error`. The stored token is left untouched.
    Failed { error: String, finished_at: i64 },
}

/// Contact totals for status output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ContactCounts {
    pub active: u64,
    pub deleted: u64,
}

/// Abstract storage backend.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`sync_state`](ContactStore::sync_state) | Read the singleton sync state |
/// | [`try_begin_sync`](ContactStore::try_begin_sync) | Atomically enter `syncing` |
/// | [`complete_sync`](ContactStore::complete_sync) | Leave `syncing` with an outcome |
/// | [`clear_sync_token`](ContactStore::clear_sync_token) | Drop an expired token |
/// | [`apply_batch`](ContactStore::apply_batch) | Reconcile one batch transactionally |
/// | [`active_contacts`](ContactStore::active_contacts) | All live contacts |
/// | [`contact`](ContactStore::contact) | One contact with children, by local id |
/// | [`contact_by_resource`](ContactStore::contact_by_resource) | One contact by remote id |
/// | [`search_candidates`](ContactStore::search_candidates) | Index-backed candidate set for search |
/// | [`contact_counts`](ContactStore::contact_counts) | Live/deleted totals |
#[async_trait]
pub trait ContactStore: Send + Sync {
    async fn sync_state(&self) -> Result<SyncState>;

    /// Move the phase to `syncing` unless it already is.
    ///
    /// Returns the updated state, or `None` if another run holds the phase,
    /// in which case nothing was modified.
    async fn try_begin_sync(&self, started_at: i64) -> Result<Option<SyncState>>;

    async fn complete_sync(&self, completion: SyncCompletion) -> Result<()>;

    async fn clear_sync_token(&self) -> Result<()>;

    /// Apply every op in one transaction and stamp touched contacts with
    /// `synced_at`.
    async fn apply_batch(&self, ops: &[BatchOp], synced_at: i64) -> Result<BatchOutcome>;

    /// All non-deleted contacts, ordered by lower-cased display name.
    async fn active_contacts(&self) -> Result<Vec<Contact>>;

    async fn contact(&self, id: &str) -> Result<Option<ContactRecord>>;

    async fn contact_by_resource(&self, resource_name: &str) -> Result<Option<ContactRecord>>;

    /// Live contacts whose lower-cased display name or an email contains
    /// `needle`, or (when `digits` is non-empty) whose normalized phone
    /// contains `digits`. A superset of what the matcher will rank.
    async fn search_candidates(&self, needle: &str, digits: &str) -> Result<Vec<ContactRecord>>;

    async fn contact_counts(&self) -> Result<ContactCounts>;
}
