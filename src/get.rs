//! Contact retrieval by local id.
//!
//! Used by `cmirror get` and `GET /api/contacts/{id}`. Soft-deleted contacts
//! are reported as not found, like everywhere else on the read path.

use anyhow::Result;
use serde::Serialize;

use contact_mirror_core::error::QueryError;
use contact_mirror_core::keypad::{group_of, GroupKey};
use contact_mirror_core::models::{EmailAddress, PhoneNumber};
use contact_mirror_core::store::ContactStore;

use crate::config::Config;
use crate::db;
use crate::sqlite_store::SqliteStore;
use crate::status::format_ts_iso;

#[derive(Debug, Clone, Serialize)]
pub struct ContactResponse {
    pub id: String,
    pub resource_name: String,
    pub display_name: String,
    pub given_name: Option<String>,
    pub family_name: Option<String>,
    pub group: GroupKey,
    pub phones: Vec<PhoneNumber>,
    pub emails: Vec<EmailAddress>,
    pub updated_at: String, // ISO8601
    pub synced_at: String,  // ISO8601
}

pub async fn get_contact(store: &dyn ContactStore, id: &str) -> Result<ContactResponse, QueryError> {
    let record = match store.contact(id).await? {
        Some(r) if !r.contact.deleted => r,
        _ => return Err(QueryError::NotFound(id.to_string())),
    };
    let c = record.contact;
    Ok(ContactResponse {
        group: group_of(&c.display_name),
        id: c.id,
        resource_name: c.resource_name,
        display_name: c.display_name,
        given_name: c.given_name,
        family_name: c.family_name,
        phones: record.phones,
        emails: record.emails,
        updated_at: format_ts_iso(c.updated_at),
        synced_at: format_ts_iso(c.synced_at),
    })
}

/// `cmirror get`.
pub async fn run_get(config: &Config, id: &str) -> Result<()> {
    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool.clone());
    let contact = get_contact(&store, id).await;
    pool.close().await;
    let contact = contact?;

    println!("--- Contact ---");
    println!("id:            {}", contact.id);
    println!("name:          {}", contact.display_name);
    if let Some(ref given) = contact.given_name {
        println!("given_name:    {}", given);
    }
    if let Some(ref family) = contact.family_name {
        println!("family_name:   {}", family);
    }
    println!("group:         {}", contact.group.as_str());
    println!("resource_name: {}", contact.resource_name);
    println!("updated_at:    {}", contact.updated_at);
    println!("synced_at:     {}", contact.synced_at);
    println!();

    println!("--- Phones ({}) ---", contact.phones.len());
    for phone in &contact.phones {
        println!(
            "{:<7} {}{}",
            phone.label.title(),
            phone.display,
            if phone.primary { "  (primary)" } else { "" }
        );
    }
    println!();

    println!("--- Emails ({}) ---", contact.emails.len());
    for email in &contact.emails {
        println!(
            "{:<7} {}{}",
            email.label.title(),
            email.address,
            if email.primary { "  (primary)" } else { "" }
        );
    }

    Ok(())
}
