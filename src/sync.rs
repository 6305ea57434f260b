//! Sync orchestrator.
//!
//! Drives one sync run end to end:
//!
//! ```text
//! try_begin_sync ──▶ resolve mode ──▶ pass (pages ─▶ batches) ──▶ complete_sync
//!                                        │
//!                                        └─ TokenExpired on incremental ─▶ clear token, full pass once
//! ```
//!
//! The `syncing` phase in the store is the only lock; a second caller gets
//! [`SyncError::InProgress`] without touching the state. Pages are fetched
//! strictly one after another, and each batch is committed before the next
//! page is requested, so an aborted run leaves the store at its last
//! committed batch.
//!
//! Transient provider failures (and timed-out fetches or commits) are retried
//! with exponential backoff: `backoff_base * 2^(attempt-1)`, capped at
//! `backoff_max`. Authentication failures are never retried.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use contact_mirror_core::error::{ProviderError, SyncError};
use contact_mirror_core::models::{SyncCounts, SyncMode, SyncPhase, SyncState};
use contact_mirror_core::reconcile::{plan_record, BatchOp, BatchOutcome};
use contact_mirror_core::remote::{
    ChangeMarker, CredentialProvider, PageRequest, RemoteContactSource, RemotePage,
};
use contact_mirror_core::store::{ContactStore, SyncCompletion};

use crate::config::{Config, SyncConfig};
use crate::connector_people::PeopleApiSource;
use crate::credentials::StaticTokenProvider;
use crate::db;
use crate::sqlite_store::SqliteStore;

/// Detail recorded for a run whose process died mid-sync.
pub const INTERRUPTED: &str = "interrupted";

/// Tunables for one engine, derived from `[sync]`.
#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub batch_size: usize,
    pub page_size: usize,
    pub max_retries: u32,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
    pub request_timeout: Duration,
}

impl From<&SyncConfig> for SyncSettings {
    fn from(c: &SyncConfig) -> Self {
        Self {
            batch_size: c.batch_size.max(1),
            page_size: c.page_size,
            max_retries: c.max_retries,
            backoff_base: Duration::from_millis(c.backoff_base_ms),
            backoff_max: Duration::from_millis(c.backoff_max_ms),
            request_timeout: c.request_timeout(),
        }
    }
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self::from(&SyncConfig::default())
    }
}

impl SyncSettings {
    /// Delay before retry number `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.backoff_base
            .checked_mul(factor)
            .unwrap_or(self.backoff_max)
            .min(self.backoff_max)
    }
}

/// Statistics for one successful run.
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub requested_mode: SyncMode,
    /// Mode of the pass that finished the run.
    pub mode: SyncMode,
    /// True when an expired token forced a fallback to a full pass.
    pub fell_back_to_full: bool,
    #[serde(flatten)]
    pub counts: SyncCounts,
    pub pages: u64,
    pub batches: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
}

#[derive(Debug, Default)]
struct RunTotals {
    counts: SyncCounts,
    pages: u64,
    batches: u64,
}

impl RunTotals {
    fn add_batch(&mut self, outcome: BatchOutcome) {
        self.counts.added += outcome.added;
        self.counts.updated += outcome.updated;
        self.counts.deleted += outcome.deleted;
        self.counts.unchanged += outcome.unchanged;
        self.batches += 1;
    }
}

struct RunOutcome {
    mode: SyncMode,
    fell_back: bool,
    sync_token: Option<String>,
}

/// Owns the collaborators for sync runs.
pub struct SyncEngine {
    store: Arc<dyn ContactStore>,
    source: Arc<dyn RemoteContactSource>,
    credentials: Arc<dyn CredentialProvider>,
    settings: SyncSettings,
}

impl SyncEngine {
    pub fn new(
        store: Arc<dyn ContactStore>,
        source: Arc<dyn RemoteContactSource>,
        credentials: Arc<dyn CredentialProvider>,
        settings: SyncSettings,
    ) -> Self {
        Self {
            store,
            source,
            credentials,
            settings,
        }
    }

    pub fn store(&self) -> &Arc<dyn ContactStore> {
        &self.store
    }

    /// Current sync state. Read-only.
    pub async fn status(&self) -> anyhow::Result<SyncState> {
        self.store.sync_state().await
    }

    /// Move a phase left at `syncing` by a dead process to `error`.
    ///
    /// Must only be called before this process starts any run. Returns
    /// whether a stale run was found.
    pub async fn recover_interrupted(&self) -> anyhow::Result<bool> {
        let state = self.store.sync_state().await?;
        if state.phase != SyncPhase::Syncing {
            return Ok(false);
        }
        self.mark_interrupted(&state).await?;
        Ok(true)
    }

    /// Like [`recover_interrupted`](Self::recover_interrupted), but only for
    /// a run that started at least `lease` ago.
    ///
    /// Safe to call while another live process may be syncing, as long as
    /// `lease` exceeds the longest legitimate run.
    pub async fn recover_expired_lease(&self, lease: Duration) -> anyhow::Result<bool> {
        let state = self.store.sync_state().await?;
        if state.phase != SyncPhase::Syncing {
            return Ok(false);
        }
        let cutoff = Utc::now().timestamp() - lease.as_secs() as i64;
        if state.last_started_at.is_some_and(|t| t > cutoff) {
            return Ok(false);
        }
        self.mark_interrupted(&state).await?;
        Ok(true)
    }

    async fn mark_interrupted(&self, state: &SyncState) -> anyhow::Result<()> {
        warn!(
            started_at = ?state.last_started_at,
            "previous sync run did not finish; marking it as interrupted"
        );
        self.store
            .complete_sync(SyncCompletion::Failed {
                error: INTERRUPTED.to_string(),
                finished_at: Utc::now().timestamp(),
            })
            .await?;
        Ok(())
    }

    /// Run one sync.
    pub async fn run_sync(&self, mode: SyncMode) -> Result<SyncReport, SyncError> {
        let started_at = Utc::now();
        let clock = Instant::now();

        let state = match self.store.try_begin_sync(started_at.timestamp()).await? {
            Some(state) => state,
            None => {
                info!(requested = %mode, "sync rejected: another run is in progress");
                return Err(SyncError::InProgress);
            }
        };

        info!(requested = %mode, source = self.source.name(), "sync started");
        let mut totals = RunTotals::default();
        let result = self.execute(mode, &state, &mut totals).await;
        let finished_at = Utc::now();

        match result {
            Ok(outcome) => {
                let completion = SyncCompletion::Succeeded {
                    sync_token: outcome.sync_token,
                    finished_at: finished_at.timestamp(),
                    counts: totals.counts,
                };
                if let Err(e) = self.store.complete_sync(completion).await {
                    return Err(self.record_failure(SyncError::Store(e), finished_at).await);
                }

                let report = SyncReport {
                    requested_mode: mode,
                    mode: outcome.mode,
                    fell_back_to_full: outcome.fell_back,
                    counts: totals.counts,
                    pages: totals.pages,
                    batches: totals.batches,
                    started_at,
                    finished_at,
                    duration_ms: clock.elapsed().as_millis() as u64,
                };
                info!(
                    mode = %report.mode,
                    added = report.counts.added,
                    updated = report.counts.updated,
                    deleted = report.counts.deleted,
                    unchanged = report.counts.unchanged,
                    skipped = report.counts.skipped,
                    pages = report.pages,
                    duration_ms = report.duration_ms,
                    "sync finished"
                );
                Ok(report)
            }
            Err(err) => Err(self.record_failure(err, finished_at).await),
        }
    }

    async fn record_failure(&self, err: SyncError, finished_at: DateTime<Utc>) -> SyncError {
        error!(code = err.code(), error = %err, "sync failed");
        let completion = SyncCompletion::Failed {
            error: format!("{}: {}", err.code(), err),
            finished_at: finished_at.timestamp(),
        };
        if let Err(e) = self.store.complete_sync(completion).await {
            error!(error = %e, "failed to record sync failure");
        }
        err
    }

    async fn execute(
        &self,
        requested: SyncMode,
        state: &SyncState,
        totals: &mut RunTotals,
    ) -> Result<RunOutcome, SyncError> {
        let mode = requested.resolve(state.has_token());
        if requested == SyncMode::Incremental && mode == SyncMode::Full {
            warn!("no sync token stored; running a full sync instead");
        }

        if mode == SyncMode::Full {
            let sync_token = self.pass(None, totals).await?;
            return Ok(RunOutcome {
                mode,
                fell_back: false,
                sync_token,
            });
        }

        match self.pass(state.sync_token.as_deref(), totals).await {
            Ok(sync_token) => Ok(RunOutcome {
                mode,
                fell_back: false,
                sync_token,
            }),
            Err(SyncError::TokenExpired) => {
                warn!("sync token expired; clearing it and running a full sync");
                self.store.clear_sync_token().await?;
                let sync_token = self.pass(None, totals).await?;
                Ok(RunOutcome {
                    mode: SyncMode::Full,
                    fell_back: true,
                    sync_token,
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Page through the source and commit every page. Returns the last sync
    /// token the provider handed out, if any.
    ///
    /// A full pass (`sync_token == None`) never deletes: delete markers are
    /// dropped and contacts missing from the listing stay as they are.
    async fn pass(
        &self,
        sync_token: Option<&str>,
        totals: &mut RunTotals,
    ) -> Result<Option<String>, SyncError> {
        let full = sync_token.is_none();
        let mut page_token: Option<String> = None;
        let mut seen_page_tokens: HashSet<String> = HashSet::new();
        let mut next_sync_token: Option<String> = None;

        loop {
            let request = PageRequest {
                sync_token,
                page_token: page_token.as_deref(),
                page_size: self.settings.page_size,
            };
            let page = self.fetch_with_retry(request).await?;
            totals.pages += 1;

            let RemotePage {
                records,
                next_page_token,
                next_sync_token: page_sync_token,
            } = page;
            debug!(page = totals.pages, records = records.len(), full, "fetched page");

            let batch_time = Utc::now().timestamp();
            let mut ops: Vec<BatchOp> = Vec::with_capacity(records.len());
            for record in records {
                match record {
                    Ok(r) if full && r.marker == ChangeMarker::Delete => {
                        debug!(resource = %r.contact.resource_name, "ignoring delete marker in full listing");
                    }
                    Ok(r) => ops.push(plan_record(r, batch_time)),
                    Err(m) => {
                        warn!(detail = %m.detail, "skipping malformed record");
                        totals.counts.skipped += 1;
                    }
                }
            }

            for chunk in ops.chunks(self.settings.batch_size) {
                let outcome = self.commit_with_retry(chunk, batch_time).await?;
                totals.add_batch(outcome);
                debug!(batch = totals.batches, ops = chunk.len(), "committed batch");
            }

            if page_sync_token.is_some() {
                next_sync_token = page_sync_token;
            }

            match next_page_token {
                Some(next) if !seen_page_tokens.insert(next.clone()) => {
                    return Err(SyncError::Malformed(format!(
                        "provider repeated page token '{}'",
                        next
                    )));
                }
                Some(next) => page_token = Some(next),
                None => break,
            }
        }

        Ok(next_sync_token)
    }

    async fn fetch_with_retry(&self, request: PageRequest<'_>) -> Result<RemotePage, SyncError> {
        let mut last_err = String::new();

        for attempt in 0..=self.settings.max_retries {
            if attempt > 0 {
                let delay = self.settings.backoff(attempt);
                warn!(
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %last_err,
                    "retrying page fetch"
                );
                tokio::time::sleep(delay).await;
            }

            let token = self.credentials.get_valid_token().await?;
            let fetched = tokio::time::timeout(
                self.settings.request_timeout,
                self.source.fetch_page(&token, request),
            )
            .await;

            match fetched {
                Ok(Ok(page)) => return Ok(page),
                Ok(Err(ProviderError::Transient(msg))) => last_err = msg,
                Ok(Err(ProviderError::TokenExpired)) => return Err(SyncError::TokenExpired),
                Ok(Err(ProviderError::Auth(e))) => return Err(SyncError::Auth(e)),
                Ok(Err(ProviderError::Malformed(msg))) => return Err(SyncError::Malformed(msg)),
                Err(_) => {
                    last_err = format!(
                        "page fetch timed out after {}s",
                        self.settings.request_timeout.as_secs()
                    )
                }
            }
        }

        Err(SyncError::RetriesExhausted {
            attempts: self.settings.max_retries + 1,
            last: last_err,
        })
    }

    async fn commit_with_retry(
        &self,
        ops: &[BatchOp],
        batch_time: i64,
    ) -> Result<BatchOutcome, SyncError> {
        let mut last_err = String::new();

        for attempt in 0..=self.settings.max_retries {
            if attempt > 0 {
                let delay = self.settings.backoff(attempt);
                warn!(attempt, error = %last_err, "retrying batch commit");
                tokio::time::sleep(delay).await;
            }

            match tokio::time::timeout(
                self.settings.request_timeout,
                self.store.apply_batch(ops, batch_time),
            )
            .await
            {
                Ok(result) => return Ok(result?),
                Err(_) => {
                    last_err = format!(
                        "batch commit timed out after {}s",
                        self.settings.request_timeout.as_secs()
                    )
                }
            }
        }

        Err(SyncError::RetriesExhausted {
            attempts: self.settings.max_retries + 1,
            last: last_err,
        })
    }
}

/// Trigger `auto` syncs every `interval`. The first run happens one
/// interval after startup.
pub fn spawn_polling(engine: Arc<SyncEngine>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            // Failures are logged and recorded by run_sync itself.
            if let Err(SyncError::InProgress) = engine.run_sync(SyncMode::Auto).await {
                debug!("poll skipped: sync already running");
            }
        }
    })
}

/// Build an engine over `store`, wired to the People-API source and the
/// static token provider.
pub fn build_engine(config: &Config, store: Arc<dyn ContactStore>) -> anyhow::Result<SyncEngine> {
    let source = Arc::new(PeopleApiSource::from_config(&config.remote, &config.sync)?);
    let credentials = Arc::new(StaticTokenProvider::from_config(&config.remote));
    Ok(SyncEngine::new(
        store,
        source,
        credentials,
        SyncSettings::from(&config.sync),
    ))
}

/// `cmirror sync`.
pub async fn run_sync_command(config: &Config, mode: SyncMode) -> anyhow::Result<()> {
    let pool = db::connect(config).await?;
    let engine = build_engine(config, Arc::new(SqliteStore::new(pool.clone())))?;
    if let Err(e) = engine.recover_expired_lease(config.sync.stale_after()).await {
        pool.close().await;
        return Err(e);
    }
    let result = engine.run_sync(mode).await;
    pool.close().await;
    let report = result?;

    println!(
        "sync {} ok: added={} updated={} deleted={} unchanged={} skipped={}",
        report.mode,
        report.counts.added,
        report.counts.updated,
        report.counts.deleted,
        report.counts.unchanged,
        report.counts.skipped,
    );
    if report.fell_back_to_full {
        println!("  (sync token had expired; ran a full sync)");
    }
    println!(
        "  pages={} batches={} duration={}ms",
        report.pages, report.batches, report.duration_ms
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_and_caps() {
        let settings = SyncSettings {
            backoff_base: Duration::from_millis(100),
            backoff_max: Duration::from_millis(1000),
            ..SyncSettings::default()
        };
        assert_eq!(settings.backoff(1), Duration::from_millis(100));
        assert_eq!(settings.backoff(2), Duration::from_millis(200));
        assert_eq!(settings.backoff(4), Duration::from_millis(800));
        assert_eq!(settings.backoff(5), Duration::from_millis(1000));
        assert_eq!(settings.backoff(40), Duration::from_millis(1000));
    }

    #[test]
    fn test_settings_from_config() {
        let settings = SyncSettings::from(&SyncConfig::default());
        assert_eq!(settings.batch_size, 100);
        assert_eq!(settings.request_timeout, Duration::from_secs(30));
    }
}
