//! Error taxonomy shared by the sync and read paths.
//!
//! Provider-level errors ([`ProviderError`], [`AuthError`]) never leave the
//! sync orchestrator; it folds them into a terminal [`SyncError`]. Read paths
//! (directory, search) return [`QueryError`] directly to the caller.

use thiserror::Error;

/// The credential provider could not produce a usable access token.
///
/// Never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("authentication failed: {0}")]
pub struct AuthError(pub String);

/// Failure of a single page request against the remote contact source.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    /// The stored sync token is no longer accepted (HTTP 410 equivalent).
    #[error("sync token expired")]
    TokenExpired,

    /// Rate limiting, network failure, timeout, or server error.
    #[error("transient provider error: {0}")]
    Transient(String),

    #[error(transparent)]
    Auth(#[from] AuthError),

    /// The response as a whole could not be understood.
    #[error("malformed provider response: {0}")]
    Malformed(String),
}

impl ProviderError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ProviderError::Transient(_))
    }
}

/// Terminal outcome of a failed sync run.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Another run holds the `syncing` phase. Rejected immediately.
    #[error("a sync is already in progress")]
    InProgress,

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("provider still failing after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: String },

    #[error("malformed provider response: {0}")]
    Malformed(String),

    /// The provider rejected a token during a full sync, where no further
    /// fallback exists.
    #[error("sync token expired during full sync")]
    TokenExpired,

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

impl SyncError {
    /// Stable machine-readable code used in API errors and the recorded
    /// sync state.
    pub fn code(&self) -> &'static str {
        match self {
            SyncError::InProgress => "sync_in_progress",
            SyncError::Auth(_) => "auth",
            SyncError::RetriesExhausted { .. } => "retries_exhausted",
            SyncError::Malformed(_) => "malformed_response",
            SyncError::TokenExpired => "token_expired",
            SyncError::Store(_) => "store",
        }
    }
}

/// Read-path failure from the directory builder or search matcher.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("contact not found: {0}")]
    NotFound(String),

    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

impl QueryError {
    pub fn code(&self) -> &'static str {
        match self {
            QueryError::NotFound(_) => "not_found",
            QueryError::InvalidQuery(_) => "invalid_query",
            QueryError::Store(_) => "internal",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_transient_is_retryable() {
        assert!(ProviderError::Transient("429".into()).is_retryable());
        assert!(!ProviderError::TokenExpired.is_retryable());
        assert!(!ProviderError::Auth(AuthError("bad".into())).is_retryable());
        assert!(!ProviderError::Malformed("x".into()).is_retryable());
    }

    #[test]
    fn test_auth_error_display_passes_through() {
        let err = SyncError::from(AuthError("token revoked".into()));
        assert_eq!(err.to_string(), "authentication failed: token revoked");
        assert_eq!(err.code(), "auth");
    }
}
