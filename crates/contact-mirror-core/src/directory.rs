//! Directory view builder.
//!
//! Produces the three-level browse structure consumed by phone hardware:
//!
//! ```text
//! Root (11 keypad groups) ──▶ Group (contacts, sorted) ──▶ ContactDetail (phones)
//! ```
//!
//! Views are plain data; rendering them into a wire format (Cisco IP-phone
//! XML in the application crate) is the caller's concern. Every request is
//! stateless and re-reads the store.

use serde::Serialize;

use crate::error::QueryError;
use crate::keypad::{group_of, GroupKey};
use crate::models::ContactRecord;
use crate::reconcile::search_key;
use crate::store::ContactStore;

/// Navigation target of a menu entry or soft key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "target", rename_all = "lowercase")]
pub enum Link {
    Root,
    Group(GroupKey),
    Contact(String),
}

/// Navigation actions offered alongside a view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NavAction {
    Select,
    Dial,
    Back(Link),
    Exit,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MenuEntry {
    pub label: String,
    pub link: Link,
}

/// Root or group menu.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DirectoryMenu {
    pub title: String,
    pub prompt: String,
    pub entries: Vec<MenuEntry>,
    pub actions: Vec<NavAction>,
    /// True when entries were cut at the per-page maximum.
    pub truncated: bool,
}

/// One dialable number in a contact detail view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PhoneEntry {
    /// Type label (`Mobile`, `Work`, ...).
    pub label: String,
    /// Dialable (normalized) form.
    pub number: String,
    pub display: String,
    pub primary: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContactDetailView {
    pub contact_id: String,
    pub title: String,
    pub entries: Vec<PhoneEntry>,
    pub actions: Vec<NavAction>,
}

/// Presentation settings for directory views.
#[derive(Debug, Clone)]
pub struct DirectoryOptions {
    /// Title of the root menu.
    pub title: String,
    /// Maximum entries returned for a group; the rest are dropped.
    pub max_entries: usize,
}

impl Default for DirectoryOptions {
    fn default() -> Self {
        Self {
            title: "Contacts".to_string(),
            max_entries: 32,
        }
    }
}

/// The fixed root menu: one entry per keypad group.
pub fn build_root(options: &DirectoryOptions) -> DirectoryMenu {
    DirectoryMenu {
        title: options.title.clone(),
        prompt: "Select a group".to_string(),
        entries: GroupKey::ALL
            .iter()
            .map(|key| MenuEntry {
                label: key.as_str().to_string(),
                link: Link::Group(*key),
            })
            .collect(),
        actions: vec![NavAction::Select, NavAction::Exit],
        truncated: false,
    }
}

/// Live contacts in `key`, sorted case-insensitively by display name and
/// cut at `options.max_entries`. An empty group is a valid, empty menu.
pub async fn build_group<S: ContactStore + ?Sized>(
    store: &S,
    key: GroupKey,
    options: &DirectoryOptions,
) -> Result<DirectoryMenu, QueryError> {
    let mut members: Vec<(String, String, String)> = store
        .active_contacts()
        .await?
        .into_iter()
        .filter(|c| group_of(&c.display_name) == key)
        .map(|c| (search_key(&c.display_name), c.id, c.display_name))
        .collect();
    members.sort();

    let truncated = members.len() > options.max_entries;
    members.truncate(options.max_entries);

    Ok(DirectoryMenu {
        title: key.as_str().to_string(),
        prompt: if members.is_empty() {
            "No contacts".to_string()
        } else {
            "Select a contact".to_string()
        },
        entries: members
            .into_iter()
            .map(|(_, id, name)| MenuEntry {
                label: entry_label(&name),
                link: Link::Contact(id),
            })
            .collect(),
        actions: vec![NavAction::Select, NavAction::Back(Link::Root), NavAction::Exit],
        truncated,
    })
}

/// Phone numbers of one live contact, primary first, then stored order.
pub async fn build_contact_detail<S: ContactStore + ?Sized>(
    store: &S,
    id: &str,
) -> Result<ContactDetailView, QueryError> {
    let record = match store.contact(id).await? {
        Some(r) if !r.contact.deleted => r,
        _ => return Err(QueryError::NotFound(id.to_string())),
    };
    Ok(detail_view(record))
}

fn detail_view(record: ContactRecord) -> ContactDetailView {
    let back = Link::Group(group_of(&record.contact.display_name));
    let primary_pos = record.primary_phone().map(|p| p.position);

    let mut phones = record.phones;
    phones.sort_by_key(|p| (Some(p.position) != primary_pos, p.position));

    ContactDetailView {
        title: entry_label(&record.contact.display_name),
        contact_id: record.contact.id,
        entries: phones
            .into_iter()
            .map(|p| PhoneEntry {
                label: p.label.title().to_string(),
                number: if p.normalized.is_empty() {
                    p.display.clone()
                } else {
                    p.normalized
                },
                display: p.display,
                primary: Some(p.position) == primary_pos,
            })
            .collect(),
        actions: vec![NavAction::Dial, NavAction::Back(back), NavAction::Exit],
    }
}

fn entry_label(display_name: &str) -> String {
    let name = display_name.trim();
    if name.is_empty() {
        "(no name)".to_string()
    } else {
        name.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconcile::{plan_record, BatchOp};
    use crate::remote::{ChangeMarker, RemoteContact, RemotePhone, RemoteRecord};
    use crate::store::memory::InMemoryStore;

    fn op(resource: &str, name: &str, phones: &[(&str, &str, bool)]) -> BatchOp {
        let mut c = RemoteContact::tombstone(resource);
        c.display_name = Some(name.to_string());
        c.phones = phones
            .iter()
            .map(|(v, kind, primary)| RemotePhone {
                value: v.to_string(),
                kind: Some(kind.to_string()),
                primary: *primary,
            })
            .collect();
        plan_record(
            RemoteRecord {
                marker: ChangeMarker::Add,
                contact: c,
            },
            0,
        )
    }

    async fn seeded(ops: &[BatchOp]) -> InMemoryStore {
        let store = InMemoryStore::new();
        store.apply_batch(ops, 1).await.unwrap();
        store
    }

    #[test]
    fn test_root_lists_eleven_groups_in_keypad_order() {
        let root = build_root(&DirectoryOptions::default());
        let labels: Vec<&str> = root.entries.iter().map(|e| e.label.as_str()).collect();
        assert_eq!(
            labels,
            vec!["1", "2ABC", "3DEF", "4GHI", "5JKL", "6MNO", "7PQRS", "8TUV", "9WXYZ", "0", "#"]
        );
        assert_eq!(root.actions, vec![NavAction::Select, NavAction::Exit]);
    }

    #[tokio::test]
    async fn test_group_sorted_case_insensitively() {
        let store = seeded(&[
            op("p/1", "carl", &[]),
            op("p/2", "Bea", &[]),
            op("p/3", "alice", &[]),
            op("p/4", "Zed", &[]),
        ])
        .await;
        let menu = build_group(&store, GroupKey::Abc, &DirectoryOptions::default())
            .await
            .unwrap();
        let labels: Vec<&str> = menu.entries.iter().map(|e| e.label.as_str()).collect();
        assert_eq!(labels, vec!["alice", "Bea", "carl"]);
        assert!(!menu.truncated);
        assert_eq!(menu.actions.len(), 3);
    }

    #[tokio::test]
    async fn test_empty_group_is_valid() {
        let store = seeded(&[op("p/1", "Ann", &[])]).await;
        let menu = build_group(&store, GroupKey::Jkl, &DirectoryOptions::default())
            .await
            .unwrap();
        assert!(menu.entries.is_empty());
        assert_eq!(menu.title, "5JKL");
    }

    #[tokio::test]
    async fn test_group_truncates_at_max_entries() {
        let ops: Vec<BatchOp> = (0..5)
            .map(|i| op(&format!("p/{}", i), &format!("Name {}", i), &[]))
            .collect();
        let store = seeded(&ops).await;
        let options = DirectoryOptions {
            max_entries: 3,
            ..Default::default()
        };
        let menu = build_group(&store, GroupKey::Mno, &options).await.unwrap();
        assert_eq!(menu.entries.len(), 3);
        assert!(menu.truncated);
        assert_eq!(menu.entries[0].label, "Name 0");
        assert_eq!(menu.entries[2].label, "Name 2");
    }

    #[tokio::test]
    async fn test_detail_primary_first() {
        let store = seeded(&[op(
            "p/1",
            "Ann",
            &[
                ("555-0100", "home", false),
                ("555-0101", "work", false),
                ("(555) 123-4567", "mobile", true),
            ],
        )])
        .await;
        let id = store.contact_by_resource("p/1").await.unwrap().unwrap().contact.id;
        let view = build_contact_detail(&store, &id).await.unwrap();
        let labels: Vec<&str> = view.entries.iter().map(|e| e.label.as_str()).collect();
        assert_eq!(labels, vec!["Mobile", "Home", "Work"]);
        assert_eq!(view.entries[0].number, "5551234567");
        assert_eq!(view.entries[0].display, "(555) 123-4567");
        assert!(view.entries[0].primary);
        assert_eq!(
            view.actions[1],
            NavAction::Back(Link::Group(GroupKey::Abc))
        );
    }

    #[tokio::test]
    async fn test_detail_not_found_for_unknown_and_deleted() {
        let store = seeded(&[op("p/1", "Ann", &[])]).await;
        let err = build_contact_detail(&store, "nope").await.unwrap_err();
        assert!(matches!(err, QueryError::NotFound(_)));

        let id = store.contact_by_resource("p/1").await.unwrap().unwrap().contact.id;
        store
            .apply_batch(
                &[BatchOp::Delete {
                    resource_name: "p/1".into(),
                }],
                2,
            )
            .await
            .unwrap();
        let err = build_contact_detail(&store, &id).await.unwrap_err();
        assert!(matches!(err, QueryError::NotFound(_)));
        let menu = build_group(&store, GroupKey::Abc, &DirectoryOptions::default())
            .await
            .unwrap();
        assert!(menu.entries.is_empty());
    }

    #[tokio::test]
    async fn test_unnamed_contact_lands_in_catch_all() {
        let store = seeded(&[op("p/1", "", &[])]).await;
        let menu = build_group(&store, GroupKey::Other, &DirectoryOptions::default())
            .await
            .unwrap();
        assert_eq!(menu.entries.len(), 1);
        assert_eq!(menu.entries[0].label, "(no name)");
    }
}
