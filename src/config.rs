//! TOML configuration.
//!
//! ```toml
//! [db]
//! path = "./data/contacts.sqlite"
//!
//! [sync]
//! batch_size = 100
//! max_retries = 5
//! interval_secs = 900
//!
//! [remote]
//! base_url = "https://people.googleapis.com"
//! access_token_env = "CONTACT_MIRROR_ACCESS_TOKEN"
//!
//! [directory]
//! max_entries = 32
//!
//! [search]
//! default_limit = 20
//!
//! [server]
//! bind = "127.0.0.1:7380"
//! public_url = "http://192.168.1.10:7380"
//! ```
//!
//! Only `[db]` is required; every other section falls back to defaults.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use contact_mirror_core::directory::DirectoryOptions;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub remote: RemoteConfig,
    #[serde(default)]
    pub directory: DirectoryConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SyncConfig {
    /// Records committed per transaction.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Records requested per provider page.
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    /// Retries after the first attempt for transient failures.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,
    /// Upper bound for one page fetch or one batch commit.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Polling interval for `serve`. Polling is off when absent.
    #[serde(default)]
    pub interval_secs: Option<u64>,
    /// Age after which a run still marked `syncing` is treated as
    /// abandoned by `cmirror sync`.
    #[serde(default = "default_stale_after_secs")]
    pub stale_after_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            page_size: default_page_size(),
            max_retries: default_max_retries(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_ms: default_backoff_max_ms(),
            request_timeout_secs: default_request_timeout_secs(),
            interval_secs: None,
            stale_after_secs: default_stale_after_secs(),
        }
    }
}

impl SyncConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_secs)
    }
}

fn default_batch_size() -> usize {
    100
}
fn default_page_size() -> usize {
    200
}
fn default_max_retries() -> u32 {
    5
}
fn default_backoff_base_ms() -> u64 {
    500
}
fn default_backoff_max_ms() -> u64 {
    30_000
}
fn default_request_timeout_secs() -> u64 {
    30
}
fn default_stale_after_secs() -> u64 {
    3600
}

#[derive(Debug, Deserialize, Clone)]
pub struct RemoteConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_person_fields")]
    pub person_fields: String,
    /// Literal token. Prefer `access_token_env` outside of tests.
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default = "default_access_token_env")]
    pub access_token_env: String,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            person_fields: default_person_fields(),
            access_token: None,
            access_token_env: default_access_token_env(),
        }
    }
}

fn default_base_url() -> String {
    "https://people.googleapis.com".to_string()
}
fn default_person_fields() -> String {
    "names,phoneNumbers,emailAddresses,metadata".to_string()
}
fn default_access_token_env() -> String {
    "CONTACT_MIRROR_ACCESS_TOKEN".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct DirectoryConfig {
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
    #[serde(default = "default_title")]
    pub title: String,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            max_entries: default_max_entries(),
            title: default_title(),
        }
    }
}

impl DirectoryConfig {
    pub fn options(&self) -> DirectoryOptions {
        DirectoryOptions {
            title: self.title.clone(),
            max_entries: self.max_entries,
        }
    }
}

fn default_max_entries() -> usize {
    32
}
fn default_title() -> String {
    "Contacts".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    #[serde(default = "default_limit")]
    pub default_limit: usize,
    #[serde(default = "default_max_limit")]
    pub max_limit: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_limit: default_limit(),
            max_limit: default_max_limit(),
        }
    }
}

fn default_limit() -> usize {
    20
}
fn default_max_limit() -> usize {
    200
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Base URL phones use to reach this server. Directory links are built
    /// from it; defaults to `http://{bind}`.
    #[serde(default)]
    pub public_url: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            public_url: None,
        }
    }
}

impl ServerConfig {
    pub fn base_url(&self) -> String {
        match &self.public_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("http://{}", self.bind),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7380".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.sync.batch_size == 0 {
        anyhow::bail!("sync.batch_size must be >= 1");
    }
    if !(1..=1000).contains(&config.sync.page_size) {
        anyhow::bail!("sync.page_size must be in [1, 1000]");
    }
    if config.sync.backoff_max_ms < config.sync.backoff_base_ms {
        anyhow::bail!("sync.backoff_max_ms must be >= sync.backoff_base_ms");
    }
    if config.sync.request_timeout_secs == 0 {
        anyhow::bail!("sync.request_timeout_secs must be > 0");
    }
    if config.sync.interval_secs == Some(0) {
        anyhow::bail!("sync.interval_secs must be > 0 when set");
    }
    if config.sync.stale_after_secs == 0 {
        anyhow::bail!("sync.stale_after_secs must be > 0");
    }

    if config.directory.max_entries == 0 {
        anyhow::bail!("directory.max_entries must be >= 1");
    }

    if config.search.max_limit == 0 {
        anyhow::bail!("search.max_limit must be >= 1");
    }
    if !(1..=config.search.max_limit).contains(&config.search.default_limit) {
        anyhow::bail!(
            "search.default_limit must be in [1, {}]",
            config.search.max_limit
        );
    }

    if !config.remote.base_url.starts_with("http://")
        && !config.remote.base_url.starts_with("https://")
    {
        anyhow::bail!(
            "remote.base_url must be an http(s) URL, got '{}'",
            config.remote.base_url
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_str: &str) -> Result<Config> {
        let config: Config = toml::from_str(toml_str)?;
        validate(&config)?;
        Ok(config)
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = parse("[db]\npath = \"./data/c.sqlite\"\n").unwrap();
        assert_eq!(config.sync.batch_size, 100);
        assert_eq!(config.sync.max_retries, 5);
        assert_eq!(config.sync.interval_secs, None);
        assert_eq!(config.sync.stale_after(), Duration::from_secs(3600));
        assert_eq!(config.directory.max_entries, 32);
        assert_eq!(config.search.default_limit, 20);
        assert_eq!(config.server.base_url(), "http://127.0.0.1:7380");
        assert_eq!(config.remote.access_token_env, "CONTACT_MIRROR_ACCESS_TOKEN");
    }

    #[test]
    fn test_public_url_trailing_slash_trimmed() {
        let config = parse(
            "[db]\npath = \"c.sqlite\"\n[server]\nbind = \"0.0.0.0:80\"\npublic_url = \"http://10.0.0.5/\"\n",
        )
        .unwrap();
        assert_eq!(config.server.base_url(), "http://10.0.0.5");
    }

    #[test]
    fn test_rejects_zero_batch_size() {
        let err = parse("[db]\npath = \"c.sqlite\"\n[sync]\nbatch_size = 0\n").unwrap_err();
        assert!(err.to_string().contains("batch_size"));
    }

    #[test]
    fn test_rejects_default_limit_above_max() {
        let err = parse(
            "[db]\npath = \"c.sqlite\"\n[search]\ndefault_limit = 50\nmax_limit = 10\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("default_limit"));
    }

    #[test]
    fn test_rejects_page_size_out_of_range() {
        assert!(parse("[db]\npath = \"c.sqlite\"\n[sync]\npage_size = 5000\n").is_err());
    }

    #[test]
    fn test_load_config_reports_missing_file() {
        let err = load_config(Path::new("/nonexistent/cmirror.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
