//! SQLite store tests on a temporary database file.

mod support;

use std::sync::Arc;
use tempfile::TempDir;

use contact_mirror::config::Config;
use contact_mirror::db;
use contact_mirror::migrate::migrate_pool;
use contact_mirror::sqlite_store::SqliteStore;
use contact_mirror_core::models::{SyncCounts, SyncMode, SyncPhase};
use contact_mirror_core::reconcile::{plan_record, BatchOp};
use contact_mirror_core::remote::{ChangeMarker, RemoteContact, RemoteEmail, RemotePhone, RemoteRecord};
use contact_mirror_core::search::search;
use contact_mirror_core::store::{ContactStore, SyncCompletion};

use support::{engine, FakeRemote};

async fn open_store() -> (TempDir, SqliteStore) {
    let tmp = TempDir::new().unwrap();
    let config: Config = toml::from_str(&format!(
        "[db]\npath = \"{}\"\n",
        tmp.path().join("data").join("contacts.sqlite").display()
    ))
    .unwrap();
    let pool = db::connect(&config).await.unwrap();
    migrate_pool(&pool).await.unwrap();
    (tmp, SqliteStore::new(pool))
}

fn upsert(resource: &str, name: &str, phones: &[&str], emails: &[&str]) -> BatchOp {
    let mut c = RemoteContact::tombstone(resource);
    c.display_name = Some(name.to_string());
    c.phones = phones
        .iter()
        .map(|p| RemotePhone {
            value: p.to_string(),
            kind: Some("work".into()),
            primary: false,
        })
        .collect();
    c.emails = emails
        .iter()
        .map(|e| RemoteEmail {
            value: e.to_string(),
            kind: Some("home".into()),
            primary: false,
        })
        .collect();
    plan_record(
        RemoteRecord {
            marker: ChangeMarker::Modify,
            contact: c,
        },
        1_700_000_000,
    )
}

fn delete(resource: &str) -> BatchOp {
    BatchOp::Delete {
        resource_name: resource.to_string(),
    }
}

#[tokio::test]
async fn test_fresh_database_has_never_synced_state() {
    let (_tmp, store) = open_store().await;
    let state = store.sync_state().await.unwrap();
    assert_eq!(state.phase, SyncPhase::NeverSynced);
    assert!(state.sync_token.is_none());
    assert!(state.last_counts.is_none());
    let counts = store.contact_counts().await.unwrap();
    assert_eq!((counts.active, counts.deleted), (0, 0));
}

#[tokio::test]
async fn test_apply_batch_add_update_unchanged_delete() {
    let (_tmp, store) = open_store().await;

    let outcome = store
        .apply_batch(
            &[
                upsert("people/1", "Ann Archer", &["555-123-4567"], &["Ann@Example.com"]),
                upsert("people/2", "Bob Baker", &["+44 20 7946 0958"], &[]),
            ],
            10,
        )
        .await
        .unwrap();
    assert_eq!(outcome.added, 2);

    let ann = store.contact_by_resource("people/1").await.unwrap().unwrap();
    assert_eq!(ann.contact.display_name, "Ann Archer");
    assert_eq!(ann.contact.synced_at, 10);
    assert_eq!(ann.contact.updated_at, 1_700_000_000);
    assert_eq!(ann.phones.len(), 1);
    assert_eq!(ann.phones[0].normalized, "5551234567");
    assert_eq!(ann.phones[0].display, "(555) 123-4567");
    assert!(ann.phones[0].primary);
    assert_eq!(ann.emails[0].address, "Ann@Example.com");

    let outcome = store
        .apply_batch(
            &[
                upsert("people/1", "Ann Archer", &["555-123-4567"], &["Ann@Example.com"]),
                upsert("people/2", "Bob Baker", &["+44 20 7946 0958", "555-0000"], &[]),
                delete("people/unknown"),
            ],
            20,
        )
        .await
        .unwrap();
    assert_eq!(outcome.unchanged, 1);
    assert_eq!(outcome.updated, 1);
    assert_eq!(outcome.deleted, 0);

    // Unchanged rows are still stamped with the new sync time.
    let ann = store.contact(&ann.contact.id).await.unwrap().unwrap();
    assert_eq!(ann.contact.synced_at, 20);

    let bob = store.contact_by_resource("people/2").await.unwrap().unwrap();
    assert_eq!(bob.phones.len(), 2);
    assert_eq!(bob.phones[0].normalized, "+442079460958");
    assert_eq!(bob.phones[1].position, 1);

    let outcome = store.apply_batch(&[delete("people/2")], 30).await.unwrap();
    assert_eq!(outcome.deleted, 1);
    let bob = store.contact(&bob.contact.id).await.unwrap().unwrap();
    assert!(bob.contact.deleted);

    // Deleting twice is a no-op.
    let outcome = store.apply_batch(&[delete("people/2")], 40).await.unwrap();
    assert_eq!(outcome.deleted, 0);

    let active: Vec<String> = store
        .active_contacts()
        .await
        .unwrap()
        .into_iter()
        .map(|c| c.display_name)
        .collect();
    assert_eq!(active, vec!["Ann Archer"]);
    let counts = store.contact_counts().await.unwrap();
    assert_eq!((counts.active, counts.deleted), (1, 1));
}

#[tokio::test]
async fn test_revived_contact_keeps_local_id() {
    let (_tmp, store) = open_store().await;
    store
        .apply_batch(&[upsert("people/1", "Ann", &["555-0001"], &[])], 1)
        .await
        .unwrap();
    let id = store
        .contact_by_resource("people/1")
        .await
        .unwrap()
        .unwrap()
        .contact
        .id;

    store.apply_batch(&[delete("people/1")], 2).await.unwrap();
    let outcome = store
        .apply_batch(&[upsert("people/1", "Ann", &["555-0001"], &[])], 3)
        .await
        .unwrap();
    assert_eq!(outcome.updated, 1);

    let revived = store.contact(&id).await.unwrap().unwrap();
    assert!(!revived.contact.deleted);
    assert_eq!(revived.phones.len(), 1);
}

#[tokio::test]
async fn test_failed_batch_rolls_back_entirely() {
    let (_tmp, store) = open_store().await;

    // Two phones at the same position violate the child primary key.
    let mut broken = match upsert("people/bad", "Broken", &["555-0001", "555-0002"], &[]) {
        BatchOp::Upsert(w) => w,
        _ => unreachable!(),
    };
    broken.phones[1].position = 0;

    let result = store
        .apply_batch(
            &[
                upsert("people/good", "Good", &["555-0003"], &[]),
                BatchOp::Upsert(broken),
            ],
            1,
        )
        .await;
    assert!(result.is_err());

    assert!(store.contact_by_resource("people/good").await.unwrap().is_none());
    assert!(store.contact_by_resource("people/bad").await.unwrap().is_none());
    assert_eq!(store.contact_counts().await.unwrap().active, 0);
}

#[tokio::test]
async fn test_try_begin_sync_is_exclusive() {
    let (_tmp, store) = open_store().await;

    let state = store.try_begin_sync(100).await.unwrap().unwrap();
    assert_eq!(state.phase, SyncPhase::Syncing);
    assert_eq!(state.last_started_at, Some(100));

    assert!(store.try_begin_sync(200).await.unwrap().is_none());
    assert_eq!(store.sync_state().await.unwrap().last_started_at, Some(100));

    store
        .complete_sync(SyncCompletion::Failed {
            error: "retries_exhausted: boom".into(),
            finished_at: 150,
        })
        .await
        .unwrap();
    let state = store.sync_state().await.unwrap();
    assert_eq!(state.phase, SyncPhase::Error);
    assert_eq!(state.last_error.as_deref(), Some("retries_exhausted: boom"));

    // An errored run does not block the next one.
    assert!(store.try_begin_sync(300).await.unwrap().is_some());
}

#[tokio::test]
async fn test_complete_sync_keeps_token_when_none_is_returned() {
    let (_tmp, store) = open_store().await;
    let counts = SyncCounts {
        added: 3,
        skipped: 1,
        ..SyncCounts::default()
    };

    store.try_begin_sync(1).await.unwrap().unwrap();
    store
        .complete_sync(SyncCompletion::Succeeded {
            sync_token: Some("tok-1".into()),
            finished_at: 2,
            counts,
        })
        .await
        .unwrap();

    store.try_begin_sync(3).await.unwrap().unwrap();
    store
        .complete_sync(SyncCompletion::Succeeded {
            sync_token: None,
            finished_at: 4,
            counts: SyncCounts::default(),
        })
        .await
        .unwrap();

    let state = store.sync_state().await.unwrap();
    assert_eq!(state.phase, SyncPhase::Idle);
    assert_eq!(state.sync_token.as_deref(), Some("tok-1"));
    assert_eq!(state.last_success_at, Some(4));
    assert_eq!(state.last_counts, Some(SyncCounts::default()));
    assert!(state.last_error.is_none());

    store.clear_sync_token().await.unwrap();
    assert!(!store.sync_state().await.unwrap().has_token());
}

#[tokio::test]
async fn test_search_candidates_and_ranking() {
    let (_tmp, store) = open_store().await;
    store
        .apply_batch(
            &[
                upsert("people/1", "Al", &["555-0100"], &[]),
                upsert("people/2", "Albert", &[], &[]),
                upsert("people/3", "Ralph", &[], &["ralph@example.com"]),
                upsert("people/4", "Zed", &[], &["AL.ops@example.com"]),
                upsert("people/5", "Gone Al", &[], &[]),
            ],
            1,
        )
        .await
        .unwrap();
    store.apply_batch(&[delete("people/5")], 2).await.unwrap();

    let hits = search(&store, "al", 10).await.unwrap();
    let names: Vec<&str> = hits.iter().map(|h| h.contact.display_name.as_str()).collect();
    assert_eq!(names, vec!["Al", "Albert", "Ralph", "Zed"]);

    let hits = search(&store, "(555) 0100", 10).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].contact.display_name, "Al");

    assert!(search(&store, "nobody", 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_engine_over_sqlite() {
    let (_tmp, store) = open_store().await;
    let store = Arc::new(store);
    let remote = FakeRemote::new();
    remote.put("people/a", "Ada", &["555-0001"]);
    remote.put("people/b", "Bea", &["555-0002"]);
    remote.put("people/c", "Cy", &["555-0003"]);
    let engine = engine(store.clone(), remote.clone());

    let report = engine.run_sync(SyncMode::Auto).await.unwrap();
    assert_eq!(report.counts.added, 3);
    assert_eq!(report.pages, 2);

    remote.remove("people/b");
    remote.put("people/c", "Cyrus", &["555-0003"]);
    let report = engine.run_sync(SyncMode::Auto).await.unwrap();
    assert_eq!(report.mode, SyncMode::Incremental);
    assert_eq!(report.counts.deleted, 1);
    assert_eq!(report.counts.updated, 1);

    let state = store.sync_state().await.unwrap();
    assert_eq!(state.phase, SyncPhase::Idle);
    assert_eq!(state.sync_token.as_deref(), Some(remote.current_token().as_str()));
    assert_eq!(state.last_counts.unwrap().deleted, 1);

    let counts = store.contact_counts().await.unwrap();
    assert_eq!((counts.active, counts.deleted), (2, 1));
}
