//! Search matcher.
//!
//! Ranks live contacts against a free-text query. The store supplies a
//! candidate superset from its index; this module decides each candidate's
//! best match and orders the results.
//!
//! # Precedence
//!
//! | Rank | Match | Rule |
//! |------|-------|------|
//! | 1 | `exact` | query equals the display name (case-insensitive), or its normalized phone form equals a stored number |
//! | 2 | `prefix` | display name starts with the query |
//! | 3 | `substring` | display name (or an email address) contains the query |
//! | 4 | `phone` | a stored number contains the query's digits |
//!
//! Results are ordered by rank, then display name (case-insensitive), then id.

use serde::Serialize;

use crate::error::QueryError;
use crate::keypad::{group_of, GroupKey};
use crate::models::ContactRecord;
use crate::phone;
use crate::reconcile::search_key;
use crate::store::ContactStore;

/// Shortest accepted query, in characters after trimming.
pub const MIN_QUERY_CHARS: usize = 2;

/// Match strategy, in precedence order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchType {
    Exact,
    Prefix,
    Substring,
    Phone,
}

/// Field that produced the hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchField {
    DisplayName,
    Phone,
    Email,
}

/// Contact summary returned with each hit.
#[derive(Debug, Clone, Serialize)]
pub struct ContactSummary {
    pub id: String,
    pub display_name: String,
    pub given_name: Option<String>,
    pub family_name: Option<String>,
    pub group: GroupKey,
    /// Display form of the primary phone number.
    pub primary_phone: Option<String>,
    pub primary_email: Option<String>,
}

impl From<&ContactRecord> for ContactSummary {
    fn from(r: &ContactRecord) -> Self {
        Self {
            id: r.contact.id.clone(),
            display_name: r.contact.display_name.clone(),
            given_name: r.contact.given_name.clone(),
            family_name: r.contact.family_name.clone(),
            group: group_of(&r.contact.display_name),
            primary_phone: r.primary_phone().map(|p| p.display.clone()),
            primary_email: r
                .emails
                .iter()
                .find(|e| e.primary)
                .or_else(|| r.emails.first())
                .map(|e| e.address.clone()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub contact: ContactSummary,
    pub match_type: MatchType,
    pub field: MatchField,
}

/// Pre-processed query forms.
#[derive(Debug, Clone)]
pub struct QueryTerms {
    /// Trimmed, lower-cased query.
    pub needle: String,
    /// Normalized phone form (digits with optional `+`), possibly empty.
    pub phone: String,
    /// Digits only, possibly empty.
    pub digits: String,
}

impl QueryTerms {
    /// Validate and pre-process a raw query.
    pub fn parse(query: &str) -> Result<Self, QueryError> {
        let trimmed = query.trim();
        if trimmed.chars().count() < MIN_QUERY_CHARS {
            return Err(QueryError::InvalidQuery(format!(
                "query must be at least {} characters",
                MIN_QUERY_CHARS
            )));
        }
        Ok(Self {
            needle: trimmed.to_lowercase(),
            phone: phone::normalize(trimmed).normalized,
            digits: phone::digits_of(trimmed),
        })
    }
}

/// Best match of one contact, or `None` if it does not match at all.
pub fn best_match(record: &ContactRecord, terms: &QueryTerms) -> Option<(MatchType, MatchField)> {
    let name = search_key(&record.contact.display_name);

    if name == terms.needle {
        return Some((MatchType::Exact, MatchField::DisplayName));
    }
    if !terms.phone.is_empty() && record.phones.iter().any(|p| p.normalized == terms.phone) {
        return Some((MatchType::Exact, MatchField::Phone));
    }
    if name.starts_with(&terms.needle) {
        return Some((MatchType::Prefix, MatchField::DisplayName));
    }
    if name.contains(&terms.needle) {
        return Some((MatchType::Substring, MatchField::DisplayName));
    }
    if record
        .emails
        .iter()
        .any(|e| e.address.to_lowercase().contains(&terms.needle))
    {
        return Some((MatchType::Substring, MatchField::Email));
    }
    if !terms.digits.is_empty()
        && record
            .phones
            .iter()
            .any(|p| p.normalized.contains(&terms.digits))
    {
        return Some((MatchType::Phone, MatchField::Phone));
    }
    None
}

/// Rank candidates and keep the first `limit`.
pub fn rank(candidates: &[ContactRecord], terms: &QueryTerms, limit: usize) -> Vec<SearchHit> {
    let mut hits: Vec<(MatchType, String, SearchHit)> = candidates
        .iter()
        .filter(|r| !r.contact.deleted)
        .filter_map(|r| {
            best_match(r, terms).map(|(match_type, field)| {
                (
                    match_type,
                    search_key(&r.contact.display_name),
                    SearchHit {
                        contact: ContactSummary::from(r),
                        match_type,
                        field,
                    },
                )
            })
        })
        .collect();

    hits.sort_by(|a, b| {
        a.0.cmp(&b.0)
            .then_with(|| a.1.cmp(&b.1))
            .then_with(|| a.2.contact.id.cmp(&b.2.contact.id))
    });
    hits.truncate(limit);
    hits.into_iter().map(|(_, _, hit)| hit).collect()
}

/// Search live contacts.
///
/// Fails with [`QueryError::InvalidQuery`] for queries shorter than
/// [`MIN_QUERY_CHARS`]. No matches is an empty list, not an error.
pub async fn search<S: ContactStore + ?Sized>(
    store: &S,
    query: &str,
    limit: usize,
) -> Result<Vec<SearchHit>, QueryError> {
    let terms = QueryTerms::parse(query)?;
    let candidates = store.search_candidates(&terms.needle, &terms.digits).await?;
    Ok(rank(&candidates, &terms, limit))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconcile::{plan_record, BatchOp};
    use crate::remote::{ChangeMarker, RemoteContact, RemoteEmail, RemotePhone, RemoteRecord};
    use crate::store::memory::InMemoryStore;

    fn op(resource: &str, name: &str, phone: Option<&str>, email: Option<&str>) -> BatchOp {
        let mut c = RemoteContact::tombstone(resource);
        c.display_name = Some(name.to_string());
        if let Some(p) = phone {
            c.phones.push(RemotePhone {
                value: p.to_string(),
                kind: None,
                primary: false,
            });
        }
        if let Some(e) = email {
            c.emails.push(RemoteEmail {
                value: e.to_string(),
                kind: None,
                primary: false,
            });
        }
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

    #[tokio::test]
    async fn test_precedence_exact_prefix_substring() {
        let store = seeded(&[
            op("p/1", "Ralph", None, None),
            op("p/2", "Albert", None, None),
            op("p/3", "Al", None, None),
            op("p/4", "Bob", None, None),
        ])
        .await;
        let hits = search(&store, "al", 10).await.unwrap();
        let got: Vec<(&str, MatchType)> = hits
            .iter()
            .map(|h| (h.contact.display_name.as_str(), h.match_type))
            .collect();
        assert_eq!(
            got,
            vec![
                ("Al", MatchType::Exact),
                ("Albert", MatchType::Prefix),
                ("Ralph", MatchType::Substring),
            ]
        );
    }

    #[tokio::test]
    async fn test_short_query_is_invalid() {
        let store = InMemoryStore::new();
        for q in ["", " ", "a", " b "] {
            let err = search(&store, q, 10).await.unwrap_err();
            assert!(matches!(err, QueryError::InvalidQuery(_)), "query {:?}", q);
        }
        assert!(search(&store, "ab", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_phone_matches() {
        let store = seeded(&[
            op("p/1", "Ann", Some("+1 (555) 123-4567"), None),
            op("p/2", "Bob", Some("555 999 0000"), None),
        ])
        .await;

        let hits = search(&store, "123-45", 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].match_type, MatchType::Phone);
        assert_eq!(hits[0].field, MatchField::Phone);

        let hits = search(&store, "+1 555 123 4567", 10).await.unwrap();
        assert_eq!(hits[0].contact.display_name, "Ann");
        assert_eq!(hits[0].match_type, MatchType::Exact);
        assert_eq!(hits[0].field, MatchField::Phone);
    }

    #[tokio::test]
    async fn test_best_match_wins_per_contact() {
        let store = seeded(&[op("p/1", "Al 555", Some("555-0100"), None)]).await;
        let hits = search(&store, "al 555", 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].match_type, MatchType::Exact);
    }

    #[tokio::test]
    async fn test_email_substring() {
        let store = seeded(&[
            op("p/1", "Zed", None, Some("zed@Widgets.example")),
            op("p/2", "Widget Corp", None, None),
        ])
        .await;
        let hits = search(&store, "widget", 10).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].contact.display_name, "Widget Corp");
        assert_eq!(hits[0].match_type, MatchType::Prefix);
        assert_eq!(hits[1].field, MatchField::Email);
        assert_eq!(hits[1].match_type, MatchType::Substring);
    }

    #[tokio::test]
    async fn test_ties_ordered_by_name_and_limit() {
        let store = seeded(&[
            op("p/1", "Carla", None, None),
            op("p/2", "carl", None, None),
            op("p/3", "Carlos", None, None),
        ])
        .await;
        let hits = search(&store, "car", 2).await.unwrap();
        let names: Vec<&str> = hits.iter().map(|h| h.contact.display_name.as_str()).collect();
        assert_eq!(names, vec!["carl", "Carla"]);
    }

    #[test]
    fn test_query_terms() {
        let t = QueryTerms::parse("  Bob 555 ").unwrap();
        assert_eq!(t.needle, "bob 555");
        assert_eq!(t.digits, "555");
        assert_eq!(t.phone, "555");
    }
}
