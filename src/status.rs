//! Sync status overview.
//!
//! Shared by `cmirror status` and `GET /api/sync/status`. Timestamps are
//! rendered as ISO-8601 here; the store keeps Unix seconds.

use anyhow::Result;
use serde::Serialize;

use contact_mirror_core::models::{SyncCounts, SyncPhase, SyncState};
use contact_mirror_core::store::{ContactCounts, ContactStore};

use crate::config::Config;
use crate::db;
use crate::sqlite_store::SqliteStore;

#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub phase: SyncPhase,
    pub has_sync_token: bool,
    pub last_success_at: Option<String>,
    pub last_started_at: Option<String>,
    pub last_finished_at: Option<String>,
    pub last_error: Option<String>,
    pub last_counts: Option<SyncCounts>,
    pub contacts: ContactCounts,
}

impl StatusResponse {
    pub fn new(state: SyncState, contacts: ContactCounts) -> Self {
        Self {
            phase: state.phase,
            has_sync_token: state.has_token(),
            last_success_at: state.last_success_at.map(format_ts_iso),
            last_started_at: state.last_started_at.map(format_ts_iso),
            last_finished_at: state.last_finished_at.map(format_ts_iso),
            last_error: state.last_error,
            last_counts: state.last_counts,
            contacts,
        }
    }
}

pub fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%dT%H:%M:%SZ").to_string())
        .unwrap_or_else(|| ts.to_string())
}

pub async fn load_status(store: &dyn ContactStore) -> Result<StatusResponse> {
    let state = store.sync_state().await?;
    let contacts = store.contact_counts().await?;
    Ok(StatusResponse::new(state, contacts))
}

/// `cmirror status`.
pub async fn run_status(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool.clone());
    let status = load_status(&store).await;
    pool.close().await;
    let status = status?;

    let none = || "-".to_string();
    println!("Contact Mirror Sync Status");
    println!("=========================");
    println!();
    println!("  Database:      {}", config.db.path.display());
    println!("  Phase:         {}", status.phase);
    println!(
        "  Sync token:    {}",
        if status.has_sync_token { "stored" } else { "none" }
    );
    println!(
        "  Last success:  {}",
        status.last_success_at.clone().unwrap_or_else(none)
    );
    println!(
        "  Last started:  {}",
        status.last_started_at.clone().unwrap_or_else(none)
    );
    println!(
        "  Last finished: {}",
        status.last_finished_at.clone().unwrap_or_else(none)
    );
    if let Some(ref err) = status.last_error {
        println!("  Last error:    {}", err);
    }
    if let Some(counts) = status.last_counts {
        println!(
            "  Last run:      added={} updated={} deleted={} unchanged={} skipped={}",
            counts.added, counts.updated, counts.deleted, counts.unchanged, counts.skipped
        );
    }
    println!();
    println!("  Contacts:      {} active, {} deleted", status.contacts.active, status.contacts.deleted);

    Ok(())
}
