//! SQLite-backed [`ContactStore`] implementation.
//!
//! Batches are applied inside one `BEGIN … COMMIT` transaction, and the sync
//! phase guard is a single conditional `UPDATE`, so two processes sharing the
//! database file still cannot run overlapping syncs.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, SqlitePool, Transaction};
use uuid::Uuid;

use contact_mirror_core::models::{
    Contact, ContactLabel, ContactRecord, EmailAddress, PhoneNumber, SyncCounts, SyncPhase,
    SyncState,
};
use contact_mirror_core::reconcile::{
    classify_delete, classify_upsert, ApplyResult, BatchOp, BatchOutcome, ContactWrite,
    ExistingRow,
};
use contact_mirror_core::store::{ContactCounts, ContactStore, SyncCompletion};

const CONTACT_COLUMNS: &str = "id, resource_name, etag, given_name, family_name, display_name, \
     deleted, fingerprint, updated_at, synced_at";

/// SQLite implementation of the [`ContactStore`] trait.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn load_record(&self, row: &SqliteRow) -> Result<ContactRecord> {
        let contact = contact_from_row(row);

        let phones = sqlx::query(
            "SELECT raw, normalized, display, label, is_primary, position \
             FROM phone_numbers WHERE contact_id = ? ORDER BY position ASC",
        )
        .bind(&contact.id)
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(|r| PhoneNumber {
            raw: r.get("raw"),
            normalized: r.get("normalized"),
            display: r.get("display"),
            label: label_from_str(r.get("label")),
            primary: r.get("is_primary"),
            position: r.get("position"),
        })
        .collect();

        let emails = sqlx::query(
            "SELECT address, label, is_primary, position \
             FROM email_addresses WHERE contact_id = ? ORDER BY position ASC",
        )
        .bind(&contact.id)
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(|r| EmailAddress {
            address: r.get("address"),
            label: label_from_str(r.get("label")),
            primary: r.get("is_primary"),
            position: r.get("position"),
        })
        .collect();

        Ok(ContactRecord {
            contact,
            phones,
            emails,
        })
    }
}

fn contact_from_row(row: &SqliteRow) -> Contact {
    Contact {
        id: row.get("id"),
        resource_name: row.get("resource_name"),
        etag: row.get("etag"),
        given_name: row.get("given_name"),
        family_name: row.get("family_name"),
        display_name: row.get("display_name"),
        deleted: row.get("deleted"),
        fingerprint: row.get("fingerprint"),
        updated_at: row.get("updated_at"),
        synced_at: row.get("synced_at"),
    }
}

fn label_from_str(s: &str) -> ContactLabel {
    ContactLabel::from_remote(Some(s))
}

async fn apply_op(
    tx: &mut Transaction<'_, Sqlite>,
    op: &BatchOp,
    synced_at: i64,
) -> Result<ApplyResult> {
    let existing = sqlx::query("SELECT id, fingerprint, deleted FROM contacts WHERE resource_name = ?")
        .bind(op.resource_name())
        .fetch_optional(&mut **tx)
        .await?;

    let existing = existing.map(|row| {
        let id: String = row.get("id");
        let fingerprint: String = row.get("fingerprint");
        let deleted: bool = row.get("deleted");
        (id, fingerprint, deleted)
    });
    let row = existing.as_ref().map(|(_, fingerprint, deleted)| ExistingRow {
        fingerprint,
        deleted: *deleted,
    });

    let result = match op {
        BatchOp::Upsert(write) => classify_upsert(row, write),
        BatchOp::Delete { .. } => classify_delete(row),
    };
    let existing_id = existing.map(|(id, _, _)| id);

    match (op, result, existing_id) {
        (BatchOp::Upsert(write), ApplyResult::Added, _) => {
            let id = Uuid::new_v4().to_string();
            sqlx::query(
                r#"
                INSERT INTO contacts (id, resource_name, etag, given_name, family_name,
                                      display_name, search_name, deleted, fingerprint,
                                      updated_at, synced_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, 0, ?, ?, ?)
                "#,
            )
            .bind(&id)
            .bind(&write.resource_name)
            .bind(&write.etag)
            .bind(&write.given_name)
            .bind(&write.family_name)
            .bind(&write.display_name)
            .bind(write.search_name())
            .bind(&write.fingerprint)
            .bind(write.updated_at)
            .bind(synced_at)
            .execute(&mut **tx)
            .await?;
            insert_children(tx, &id, write).await?;
        }
        (BatchOp::Upsert(write), ApplyResult::Updated, Some(id)) => {
            sqlx::query(
                r#"
                UPDATE contacts SET
                    etag = ?,
                    given_name = ?,
                    family_name = ?,
                    display_name = ?,
                    search_name = ?,
                    deleted = 0,
                    fingerprint = ?,
                    updated_at = ?,
                    synced_at = ?
                WHERE id = ?
                "#,
            )
            .bind(&write.etag)
            .bind(&write.given_name)
            .bind(&write.family_name)
            .bind(&write.display_name)
            .bind(write.search_name())
            .bind(&write.fingerprint)
            .bind(write.updated_at)
            .bind(synced_at)
            .bind(&id)
            .execute(&mut **tx)
            .await?;

            sqlx::query("DELETE FROM phone_numbers WHERE contact_id = ?")
                .bind(&id)
                .execute(&mut **tx)
                .await?;
            sqlx::query("DELETE FROM email_addresses WHERE contact_id = ?")
                .bind(&id)
                .execute(&mut **tx)
                .await?;
            insert_children(tx, &id, write).await?;
        }
        (BatchOp::Upsert(_), ApplyResult::Unchanged, Some(id)) => {
            sqlx::query("UPDATE contacts SET synced_at = ? WHERE id = ?")
                .bind(synced_at)
                .bind(&id)
                .execute(&mut **tx)
                .await?;
        }
        (BatchOp::Delete { .. }, ApplyResult::Deleted, Some(id)) => {
            sqlx::query(
                "UPDATE contacts SET deleted = 1, updated_at = ?, synced_at = ? WHERE id = ?",
            )
            .bind(synced_at)
            .bind(synced_at)
            .bind(&id)
            .execute(&mut **tx)
            .await?;
        }
        _ => {}
    }

    Ok(result)
}

async fn insert_children(
    tx: &mut Transaction<'_, Sqlite>,
    contact_id: &str,
    write: &ContactWrite,
) -> Result<()> {
    for phone in &write.phones {
        sqlx::query(
            r#"
            INSERT INTO phone_numbers (contact_id, position, raw, normalized, display, label, is_primary)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(contact_id)
        .bind(phone.position)
        .bind(&phone.raw)
        .bind(&phone.normalized)
        .bind(&phone.display)
        .bind(phone.label.as_str())
        .bind(phone.primary)
        .execute(&mut **tx)
        .await?;
    }
    for email in &write.emails {
        sqlx::query(
            r#"
            INSERT INTO email_addresses (contact_id, position, address, search_address, label, is_primary)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(contact_id)
        .bind(email.position)
        .bind(&email.address)
        .bind(email.address.to_lowercase())
        .bind(email.label.as_str())
        .bind(email.primary)
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

#[async_trait]
impl ContactStore for SqliteStore {
    async fn sync_state(&self) -> Result<SyncState> {
        let row = sqlx::query(
            r#"
            SELECT phase, sync_token, last_success_at, last_started_at,
                   last_finished_at, last_error, last_counts_json
            FROM sync_state WHERE id = 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await?
        .context("sync_state row missing; run `cmirror init`")?;

        let phase: String = row.get("phase");
        let counts_json: Option<String> = row.get("last_counts_json");
        let last_counts = match counts_json {
            Some(json) => Some(
                serde_json::from_str::<SyncCounts>(&json)
                    .context("Failed to parse stored sync counts")?,
            ),
            None => None,
        };

        Ok(SyncState {
            phase: phase.parse::<SyncPhase>()?,
            sync_token: row.get("sync_token"),
            last_success_at: row.get("last_success_at"),
            last_started_at: row.get("last_started_at"),
            last_finished_at: row.get("last_finished_at"),
            last_error: row.get("last_error"),
            last_counts,
        })
    }

    async fn try_begin_sync(&self, started_at: i64) -> Result<Option<SyncState>> {
        let result = sqlx::query(
            "UPDATE sync_state SET phase = 'syncing', last_started_at = ? \
             WHERE id = 1 AND phase <> 'syncing'",
        )
        .bind(started_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        Ok(Some(self.sync_state().await?))
    }

    async fn complete_sync(&self, completion: SyncCompletion) -> Result<()> {
        match completion {
            SyncCompletion::Succeeded {
                sync_token,
                finished_at,
                counts,
            } => {
                sqlx::query(
                    r#"
                    UPDATE sync_state SET
                        phase = 'idle',
                        sync_token = COALESCE(?, sync_token),
                        last_success_at = ?,
                        last_finished_at = ?,
                        last_error = NULL,
                        last_counts_json = ?
                    WHERE id = 1
                    "#,
                )
                .bind(sync_token)
                .bind(finished_at)
                .bind(finished_at)
                .bind(serde_json::to_string(&counts)?)
                .execute(&self.pool)
                .await?;
            }
            SyncCompletion::Failed { error, finished_at } => {
                sqlx::query(
                    "UPDATE sync_state SET phase = 'error', last_finished_at = ?, last_error = ? \
                     WHERE id = 1",
                )
                .bind(finished_at)
                .bind(error)
                .execute(&self.pool)
                .await?;
            }
        }
        Ok(())
    }

    async fn clear_sync_token(&self) -> Result<()> {
        sqlx::query("UPDATE sync_state SET sync_token = NULL WHERE id = 1")
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn apply_batch(&self, ops: &[BatchOp], synced_at: i64) -> Result<BatchOutcome> {
        let mut tx = self.pool.begin().await?;
        let mut outcome = BatchOutcome::default();
        for op in ops {
            let result = apply_op(&mut tx, op, synced_at)
                .await
                .with_context(|| format!("Failed to apply change for {}", op.resource_name()))?;
            outcome.record(result);
        }
        tx.commit().await?;
        Ok(outcome)
    }

    async fn active_contacts(&self) -> Result<Vec<Contact>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM contacts WHERE deleted = 0 ORDER BY search_name ASC, id ASC",
            CONTACT_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(contact_from_row).collect())
    }

    async fn contact(&self, id: &str) -> Result<Option<ContactRecord>> {
        let row = sqlx::query(&format!("SELECT {} FROM contacts WHERE id = ?", CONTACT_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => Ok(Some(self.load_record(&row).await?)),
            None => Ok(None),
        }
    }

    async fn contact_by_resource(&self, resource_name: &str) -> Result<Option<ContactRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM contacts WHERE resource_name = ?",
            CONTACT_COLUMNS
        ))
        .bind(resource_name)
        .fetch_optional(&self.pool)
        .await?;
        match row {
            Some(row) => Ok(Some(self.load_record(&row).await?)),
            None => Ok(None),
        }
    }

    async fn search_candidates(&self, needle: &str, digits: &str) -> Result<Vec<ContactRecord>> {
        // instr() instead of LIKE: no wildcard escaping, and both sides are
        // already lower-cased in Rust (SQLite's lower() is ASCII-only).
        let rows = sqlx::query(&format!(
            r#"
            SELECT {} FROM contacts c
            WHERE c.deleted = 0 AND (
                instr(c.search_name, ?) > 0
                OR EXISTS (
                    SELECT 1 FROM email_addresses e
                    WHERE e.contact_id = c.id AND instr(e.search_address, ?) > 0
                )
                OR (? <> '' AND EXISTS (
                    SELECT 1 FROM phone_numbers p
                    WHERE p.contact_id = c.id AND instr(p.normalized, ?) > 0
                ))
            )
            "#,
            CONTACT_COLUMNS
        ))
        .bind(needle)
        .bind(needle)
        .bind(digits)
        .bind(digits)
        .fetch_all(&self.pool)
        .await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in &rows {
            records.push(self.load_record(row).await?);
        }
        Ok(records)
    }

    async fn contact_counts(&self) -> Result<ContactCounts> {
        let row = sqlx::query(
            r#"
            SELECT
                COALESCE(SUM(CASE WHEN deleted = 0 THEN 1 ELSE 0 END), 0) AS active,
                COALESCE(SUM(CASE WHEN deleted = 1 THEN 1 ELSE 0 END), 0) AS deleted
            FROM contacts
            "#,
        )
        .fetch_one(&self.pool)
        .await?;
        let active: i64 = row.get("active");
        let deleted: i64 = row.get("deleted");
        Ok(ContactCounts {
            active: active as u64,
            deleted: deleted as u64,
        })
    }
}
