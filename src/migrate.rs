//! Schema creation.
//!
//! Every statement is idempotent, so `cmirror init` and server startup can
//! both run it against an existing database.
//!
//! | Table | Contents |
//! |-------|----------|
//! | `contacts` | one row per remote resource, soft-deleted rows kept |
//! | `phone_numbers` | child rows keyed by `(contact_id, position)` |
//! | `email_addresses` | child rows keyed by `(contact_id, position)` |
//! | `sync_state` | singleton row (`id = 1`) |

use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    migrate_pool(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Apply the schema to an open pool.
pub async fn migrate_pool(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS contacts (
            id TEXT PRIMARY KEY,
            resource_name TEXT NOT NULL UNIQUE,
            etag TEXT,
            given_name TEXT,
            family_name TEXT,
            display_name TEXT NOT NULL,
            search_name TEXT NOT NULL,
            deleted INTEGER NOT NULL DEFAULT 0,
            fingerprint TEXT NOT NULL,
            updated_at INTEGER NOT NULL,
            synced_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS phone_numbers (
            contact_id TEXT NOT NULL,
            position INTEGER NOT NULL,
            raw TEXT NOT NULL,
            normalized TEXT NOT NULL,
            display TEXT NOT NULL,
            label TEXT NOT NULL,
            is_primary INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (contact_id, position),
            FOREIGN KEY (contact_id) REFERENCES contacts(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS email_addresses (
            contact_id TEXT NOT NULL,
            position INTEGER NOT NULL,
            address TEXT NOT NULL,
            search_address TEXT NOT NULL,
            label TEXT NOT NULL,
            is_primary INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (contact_id, position),
            FOREIGN KEY (contact_id) REFERENCES contacts(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sync_state (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            phase TEXT NOT NULL,
            sync_token TEXT,
            last_success_at INTEGER,
            last_started_at INTEGER,
            last_finished_at INTEGER,
            last_error TEXT,
            last_counts_json TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("INSERT OR IGNORE INTO sync_state (id, phase) VALUES (1, 'never_synced')")
        .execute(pool)
        .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_contacts_search_name ON contacts(deleted, search_name)")
        .execute(pool)
        .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_phone_numbers_normalized ON phone_numbers(normalized)")
        .execute(pool)
        .await?;

    Ok(())
}
