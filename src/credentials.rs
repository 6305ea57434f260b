//! Credential providers.
//!
//! Token acquisition and refresh happen outside this process; the mirror only
//! reads a bearer token that something else keeps current.

use async_trait::async_trait;

use contact_mirror_core::error::AuthError;
use contact_mirror_core::remote::{AccessToken, CredentialProvider};

use crate::config::RemoteConfig;

/// Serves a token from the config file or, failing that, from an
/// environment variable read on every call so an external refresher can
/// rotate it without a restart.
pub struct StaticTokenProvider {
    token: Option<String>,
    env_var: String,
}

impl StaticTokenProvider {
    pub fn new(token: Option<String>, env_var: impl Into<String>) -> Self {
        Self {
            token,
            env_var: env_var.into(),
        }
    }

    pub fn from_config(remote: &RemoteConfig) -> Self {
        Self::new(remote.access_token.clone(), remote.access_token_env.clone())
    }
}

#[async_trait]
impl CredentialProvider for StaticTokenProvider {
    async fn get_valid_token(&self) -> Result<AccessToken, AuthError> {
        if let Some(token) = self.token.as_deref().map(str::trim) {
            if !token.is_empty() {
                return Ok(AccessToken::new(token));
            }
        }
        match std::env::var(&self.env_var) {
            Ok(value) if !value.trim().is_empty() => Ok(AccessToken::new(value.trim())),
            _ => Err(AuthError(format!(
                "no access token configured (set remote.access_token or {})",
                self.env_var
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_configured_token_wins() {
        let provider = StaticTokenProvider::new(Some(" abc ".into()), "CMIRROR_TEST_UNUSED_VAR");
        let token = provider.get_valid_token().await.unwrap();
        assert_eq!(token.secret(), "abc");
    }

    #[tokio::test]
    async fn test_missing_token_is_auth_error() {
        let provider = StaticTokenProvider::new(None, "CMIRROR_TEST_DEFINITELY_UNSET_VAR");
        let err = provider.get_valid_token().await.unwrap_err();
        assert!(err.0.contains("CMIRROR_TEST_DEFINITELY_UNSET_VAR"));
    }

    #[tokio::test]
    async fn test_blank_config_token_falls_through() {
        let provider = StaticTokenProvider::new(Some("   ".into()), "CMIRROR_TEST_ALSO_UNSET_VAR");
        assert!(provider.get_valid_token().await.is_err());
    }
}
