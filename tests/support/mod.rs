//! Shared fakes for integration tests.
//!
//! [`FakeRemote`] behaves like a small provider: it keeps a versioned
//! contact list, serves full listings and change feeds in pages, hands out
//! `v{version}` sync tokens, and can be told to expire tokens or fail the
//! next few requests.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use contact_mirror::sync::{SyncEngine, SyncSettings};
use contact_mirror_core::error::{AuthError, ProviderError};
use contact_mirror_core::remote::{
    AccessToken, ChangeMarker, CredentialProvider, MalformedRecord, PageRequest, RemoteContact,
    RemoteContactSource, RemotePage, RemotePhone, RemoteRecord,
};
use contact_mirror_core::store::ContactStore;

#[derive(Default)]
struct RemoteState {
    contacts: BTreeMap<String, RemoteContact>,
    /// (version, resource_name, deleted)
    log: Vec<(u64, String, bool)>,
    version: u64,
    /// Tokens older than this version are rejected as expired.
    expired_before: u64,
    failures: VecDeque<ProviderError>,
    malformed_per_page: usize,
    fetches: u32,
    incremental_fetches: u32,
}

#[derive(Default)]
pub struct FakeRemote {
    state: Mutex<RemoteState>,
}

impl FakeRemote {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn put(&self, resource: &str, name: &str, phones: &[&str]) {
        let mut s = self.state.lock().unwrap();
        s.version += 1;
        let version = s.version;
        let mut contact = RemoteContact::tombstone(resource);
        contact.display_name = Some(name.to_string());
        contact.etag = Some(format!("etag-{}", version));
        contact.phones = phones
            .iter()
            .map(|p| RemotePhone {
                value: p.to_string(),
                kind: Some("mobile".to_string()),
                primary: false,
            })
            .collect();
        s.contacts.insert(resource.to_string(), contact);
        s.log.push((version, resource.to_string(), false));
    }

    pub fn remove(&self, resource: &str) {
        let mut s = self.state.lock().unwrap();
        s.version += 1;
        let version = s.version;
        s.contacts.remove(resource);
        s.log.push((version, resource.to_string(), true));
    }

    /// Reject every token handed out so far.
    pub fn expire_tokens(&self) {
        let mut s = self.state.lock().unwrap();
        s.expired_before = s.version + 1;
    }

    pub fn fail_next(&self, errors: Vec<ProviderError>) {
        self.state.lock().unwrap().failures.extend(errors);
    }

    pub fn append_malformed(&self, per_page: usize) {
        self.state.lock().unwrap().malformed_per_page = per_page;
    }

    pub fn fetches(&self) -> u32 {
        self.state.lock().unwrap().fetches
    }

    pub fn incremental_fetches(&self) -> u32 {
        self.state.lock().unwrap().incremental_fetches
    }

    pub fn current_token(&self) -> String {
        format!("v{}", self.state.lock().unwrap().version)
    }
}

#[async_trait]
impl RemoteContactSource for FakeRemote {
    fn name(&self) -> &str {
        "fake"
    }

    async fn fetch_page(
        &self,
        _token: &AccessToken,
        request: PageRequest<'_>,
    ) -> Result<RemotePage, ProviderError> {
        let mut s = self.state.lock().unwrap();
        s.fetches += 1;
        if let Some(err) = s.failures.pop_front() {
            return Err(err);
        }

        let records: Vec<RemoteRecord> = match request.sync_token {
            Some(token) => {
                s.incremental_fetches += 1;
                let since: u64 = token
                    .trim_start_matches('v')
                    .parse()
                    .map_err(|_| ProviderError::Malformed(format!("bad token {}", token)))?;
                if since < s.expired_before {
                    return Err(ProviderError::TokenExpired);
                }
                let mut latest: BTreeMap<String, bool> = BTreeMap::new();
                for (version, resource, deleted) in &s.log {
                    if *version > since {
                        latest.insert(resource.clone(), *deleted);
                    }
                }
                latest
                    .into_iter()
                    .map(|(resource, deleted)| {
                        if deleted {
                            RemoteRecord {
                                marker: ChangeMarker::Delete,
                                contact: RemoteContact::tombstone(resource),
                            }
                        } else {
                            RemoteRecord {
                                marker: ChangeMarker::Modify,
                                contact: s.contacts[&resource].clone(),
                            }
                        }
                    })
                    .collect()
            }
            None => s
                .contacts
                .values()
                .cloned()
                .map(|contact| RemoteRecord {
                    marker: ChangeMarker::Add,
                    contact,
                })
                .collect(),
        };

        let offset: usize = request
            .page_token
            .map(|t| t.parse().unwrap())
            .unwrap_or(0);
        let end = (offset + request.page_size).min(records.len());
        let mut page_records: Vec<Result<RemoteRecord, MalformedRecord>> = records
            [offset.min(records.len())..end]
            .iter()
            .cloned()
            .map(Ok)
            .collect();
        for i in 0..s.malformed_per_page {
            page_records.push(Err(MalformedRecord {
                detail: format!("broken #{}", i),
            }));
        }

        let last = end >= records.len();
        Ok(RemotePage {
            records: page_records,
            next_page_token: if last { None } else { Some(end.to_string()) },
            next_sync_token: if last {
                Some(format!("v{}", s.version))
            } else {
                None
            },
        })
    }
}

pub struct FixedToken;

#[async_trait]
impl CredentialProvider for FixedToken {
    async fn get_valid_token(&self) -> Result<AccessToken, AuthError> {
        Ok(AccessToken::new("test-token"))
    }
}

pub struct RevokedToken;

#[async_trait]
impl CredentialProvider for RevokedToken {
    async fn get_valid_token(&self) -> Result<AccessToken, AuthError> {
        Err(AuthError("refresh token revoked".to_string()))
    }
}

/// Source that parks every fetch until released, to hold a run in `syncing`.
pub struct GatedSource {
    pub inner: Arc<FakeRemote>,
    pub gate: Arc<tokio::sync::Semaphore>,
}

#[async_trait]
impl RemoteContactSource for GatedSource {
    async fn fetch_page(
        &self,
        token: &AccessToken,
        request: PageRequest<'_>,
    ) -> Result<RemotePage, ProviderError> {
        let _permit = self
            .gate
            .acquire()
            .await
            .map_err(|e| ProviderError::Transient(e.to_string()))?;
        self.inner.fetch_page(token, request).await
    }
}

/// Source whose page tokens alternate `A`, `B`, `A`, ... and never end.
#[derive(Default)]
pub struct CyclingSource {
    pub fetches: std::sync::atomic::AtomicUsize,
}

#[async_trait]
impl RemoteContactSource for CyclingSource {
    async fn fetch_page(
        &self,
        _token: &AccessToken,
        request: PageRequest<'_>,
    ) -> Result<RemotePage, ProviderError> {
        self.fetches.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        let next = match request.page_token {
            Some("A") => "B",
            _ => "A",
        };
        Ok(RemotePage {
            records: Vec::new(),
            next_page_token: Some(next.to_string()),
            next_sync_token: None,
        })
    }
}

pub fn fast_settings() -> SyncSettings {
    SyncSettings {
        batch_size: 2,
        page_size: 2,
        max_retries: 3,
        backoff_base: Duration::from_millis(1),
        backoff_max: Duration::from_millis(5),
        request_timeout: Duration::from_secs(5),
    }
}

pub fn engine(
    store: Arc<dyn ContactStore>,
    source: Arc<dyn RemoteContactSource>,
) -> SyncEngine {
    SyncEngine::new(store, source, Arc::new(FixedToken), fast_settings())
}
