//! Search entry points for the CLI and `GET /api/search`.

use anyhow::Result;
use serde::Serialize;
use std::time::Instant;

use contact_mirror_core::error::QueryError;
use contact_mirror_core::search::{search, SearchHit};
use contact_mirror_core::store::ContactStore;

use crate::config::{Config, SearchConfig};
use crate::db;
use crate::sqlite_store::SqliteStore;

#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub limit: usize,
    pub results: Vec<SearchHit>,
    pub elapsed_ms: u64,
}

/// Clamp a requested limit into `[1, max_limit]`, defaulting when absent.
pub fn effective_limit(config: &SearchConfig, requested: Option<usize>) -> usize {
    requested
        .unwrap_or(config.default_limit)
        .clamp(1, config.max_limit.max(1))
}

pub async fn search_contacts(
    store: &dyn ContactStore,
    config: &SearchConfig,
    query: &str,
    limit: Option<usize>,
) -> Result<SearchResponse, QueryError> {
    let started = Instant::now();
    let limit = effective_limit(config, limit);
    let results = search(store, query, limit).await?;
    Ok(SearchResponse {
        query: query.trim().to_string(),
        limit,
        results,
        elapsed_ms: started.elapsed().as_millis() as u64,
    })
}

/// `cmirror search`.
pub async fn run_search(config: &Config, query: &str, limit: Option<usize>) -> Result<()> {
    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool.clone());
    let response = search_contacts(&store, &config.search, query, limit).await;
    pool.close().await;
    let response = response?;

    if response.results.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, hit) in response.results.iter().enumerate() {
        println!(
            "{}. {}  [{:?} via {:?}]",
            i + 1,
            hit.contact.display_name,
            hit.match_type,
            hit.field
        );
        if let Some(ref phone) = hit.contact.primary_phone {
            println!("    phone: {}", phone);
        }
        if let Some(ref email) = hit.contact.primary_email {
            println!("    email: {}", email);
        }
        println!("    id:    {}  group: {}", hit.contact.id, hit.contact.group.as_str());
    }
    println!();
    println!("{} result(s) in {}ms", response.results.len(), response.elapsed_ms);

    Ok(())
}
