//! In-memory [`ContactStore`] implementation for tests and embedding.
//!
//! All state lives behind one `std::sync::Mutex`, so every batch is applied
//! under a single lock acquisition and is atomic with respect to readers.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use uuid::Uuid;

use crate::models::{Contact, ContactRecord, SyncPhase, SyncState};
use crate::reconcile::{
    classify_delete, classify_upsert, search_key, ApplyResult, BatchOp, BatchOutcome, ExistingRow,
};

use super::{ContactCounts, ContactStore, SyncCompletion};

#[derive(Default)]
struct Inner {
    contacts: HashMap<String, ContactRecord>,
    by_resource: HashMap<String, String>,
    state: SyncState,
}

/// In-memory store.
#[derive(Default)]
pub struct InMemoryStore {
    inner: Mutex<Inner>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| anyhow!("in-memory store lock poisoned"))
    }
}

impl Inner {
    fn apply(&mut self, op: &BatchOp, synced_at: i64) -> ApplyResult {
        let existing_id = self.by_resource.get(op.resource_name()).cloned();
        let existing = existing_id.as_ref().and_then(|id| self.contacts.get(id));
        let row = existing.map(|r| ExistingRow {
            fingerprint: &r.contact.fingerprint,
            deleted: r.contact.deleted,
        });

        match op {
            BatchOp::Upsert(write) => {
                let result = classify_upsert(row, write);
                match result {
                    ApplyResult::Unchanged => {
                        if let Some(r) = existing_id.and_then(|id| self.contacts.get_mut(&id)) {
                            r.contact.synced_at = synced_at;
                        }
                    }
                    _ => {
                        let id = existing_id.unwrap_or_else(|| Uuid::new_v4().to_string());
                        let record = ContactRecord {
                            contact: Contact {
                                id: id.clone(),
                                resource_name: write.resource_name.clone(),
                                etag: write.etag.clone(),
                                given_name: write.given_name.clone(),
                                family_name: write.family_name.clone(),
                                display_name: write.display_name.clone(),
                                deleted: false,
                                fingerprint: write.fingerprint.clone(),
                                updated_at: write.updated_at,
                                synced_at,
                            },
                            phones: write.phones.clone(),
                            emails: write.emails.clone(),
                        };
                        self.by_resource.insert(write.resource_name.clone(), id.clone());
                        self.contacts.insert(id, record);
                    }
                }
                result
            }
            BatchOp::Delete { .. } => {
                let result = classify_delete(row);
                if result == ApplyResult::Deleted {
                    if let Some(r) = existing_id.and_then(|id| self.contacts.get_mut(&id)) {
                        r.contact.deleted = true;
                        r.contact.updated_at = synced_at;
                        r.contact.synced_at = synced_at;
                    }
                }
                result
            }
        }
    }
}

#[async_trait]
impl ContactStore for InMemoryStore {
    async fn sync_state(&self) -> Result<SyncState> {
        Ok(self.lock()?.state.clone())
    }

    async fn try_begin_sync(&self, started_at: i64) -> Result<Option<SyncState>> {
        let mut inner = self.lock()?;
        if inner.state.phase == SyncPhase::Syncing {
            return Ok(None);
        }
        inner.state.phase = SyncPhase::Syncing;
        inner.state.last_started_at = Some(started_at);
        Ok(Some(inner.state.clone()))
    }

    async fn complete_sync(&self, completion: SyncCompletion) -> Result<()> {
        let mut inner = self.lock()?;
        let state = &mut inner.state;
        match completion {
            SyncCompletion::Succeeded {
                sync_token,
                finished_at,
                counts,
            } => {
                state.phase = SyncPhase::Idle;
                if sync_token.is_some() {
                    state.sync_token = sync_token;
                }
                state.last_success_at = Some(finished_at);
                state.last_finished_at = Some(finished_at);
                state.last_error = None;
                state.last_counts = Some(counts);
            }
            SyncCompletion::Failed { error, finished_at } => {
                state.phase = SyncPhase::Error;
                state.last_finished_at = Some(finished_at);
                state.last_error = Some(error);
            }
        }
        Ok(())
    }

    async fn clear_sync_token(&self) -> Result<()> {
        self.lock()?.state.sync_token = None;
        Ok(())
    }

    async fn apply_batch(&self, ops: &[BatchOp], synced_at: i64) -> Result<BatchOutcome> {
        let mut inner = self.lock()?;
        let mut outcome = BatchOutcome::default();
        for op in ops {
            outcome.record(inner.apply(op, synced_at));
        }
        Ok(outcome)
    }

    async fn active_contacts(&self) -> Result<Vec<Contact>> {
        let inner = self.lock()?;
        let mut contacts: Vec<Contact> = inner
            .contacts
            .values()
            .filter(|r| !r.contact.deleted)
            .map(|r| r.contact.clone())
            .collect();
        contacts.sort_by_cached_key(|c| (search_key(&c.display_name), c.id.clone()));
        Ok(contacts)
    }

    async fn contact(&self, id: &str) -> Result<Option<ContactRecord>> {
        Ok(self.lock()?.contacts.get(id).cloned())
    }

    async fn contact_by_resource(&self, resource_name: &str) -> Result<Option<ContactRecord>> {
        let inner = self.lock()?;
        Ok(inner
            .by_resource
            .get(resource_name)
            .and_then(|id| inner.contacts.get(id))
            .cloned())
    }

    async fn search_candidates(&self, needle: &str, digits: &str) -> Result<Vec<ContactRecord>> {
        let inner = self.lock()?;
        Ok(inner
            .contacts
            .values()
            .filter(|r| !r.contact.deleted)
            .filter(|r| {
                search_key(&r.contact.display_name).contains(needle)
                    || r
                        .emails
                        .iter()
                        .any(|e| e.address.to_lowercase().contains(needle))
                    || (!digits.is_empty()
                        && r.phones.iter().any(|p| p.normalized.contains(digits)))
            })
            .cloned()
            .collect())
    }

    async fn contact_counts(&self) -> Result<ContactCounts> {
        let inner = self.lock()?;
        let deleted = inner.contacts.values().filter(|r| r.contact.deleted).count() as u64;
        Ok(ContactCounts {
            active: inner.contacts.len() as u64 - deleted,
            deleted,
        })
    }
}
