//! Application configuration for the lineage crawler.
//!
//! User config lives at `~/.lineage/lineage.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{LineageError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "lineage.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".lineage";

/// Default database file name inside the config directory.
const DB_FILE_NAME: &str = "lineage.db";

/// Placeholder replaced by the external identifier in profile URL templates.
pub const ID_PLACEHOLDER: &str = "{id}";

// ---------------------------------------------------------------------------
// Config structs (matching lineage.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Crawl bounds and pacing.
    #[serde(default)]
    pub crawl: CrawlSettings,

    /// Upstream genealogy site.
    #[serde(default)]
    pub source: SourceConfig,

    /// Database location.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Output privacy.
    #[serde(default)]
    pub privacy: PrivacyConfig,
}

/// `[crawl]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlSettings {
    /// Deepest generation to crawl (root's children are generation 1).
    #[serde(default = "default_max_depth")]
    pub max_depth: u32,

    /// Optional cap on the number of descendants discovered per run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_nodes: Option<usize>,

    /// Minimum ms between consecutive profile fetches.
    #[serde(default = "default_rate_limit")]
    pub rate_limit_ms: u64,

    /// Retries for transient fetch failures (0 disables retrying).
    #[serde(default)]
    pub transient_retries: u32,

    /// Initial backoff between retries; doubles on each attempt.
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff_ms: u64,
}

impl Default for CrawlSettings {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
            max_nodes: None,
            rate_limit_ms: default_rate_limit(),
            transient_retries: 0,
            retry_backoff_ms: default_retry_backoff(),
        }
    }
}

fn default_max_depth() -> u32 {
    4
}
fn default_rate_limit() -> u64 {
    2000
}
fn default_retry_backoff() -> u64 {
    1000
}

/// `[source]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Profile URL with an `{id}` placeholder.
    #[serde(default = "default_profile_url_template")]
    pub profile_url_template: String,

    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Override for the HTTP User-Agent header.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            profile_url_template: default_profile_url_template(),
            timeout_secs: default_timeout_secs(),
            user_agent: None,
        }
    }
}

fn default_profile_url_template() -> String {
    "https://www.wikitree.com/wiki/{id}".into()
}
fn default_timeout_secs() -> u64 {
    30
}

/// `[storage]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Database file path (defaults to `~/.lineage/lineage.db`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_path: Option<String>,
}

/// `[privacy]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrivacyConfig {
    /// Hide names of descendants estimated to be living in command output.
    #[serde(default = "default_true")]
    pub redact_living: bool,
}

impl Default for PrivacyConfig {
    fn default() -> Self {
        Self {
            redact_living: true,
        }
    }
}

fn default_true() -> bool {
    true
}

// ---------------------------------------------------------------------------
// Crawl config (runtime, merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime crawl configuration, merged from config file + CLI flags.
#[derive(Debug, Clone)]
pub struct CrawlConfig {
    /// Deepest generation to emit.
    pub max_depth: u32,
    /// Optional cap on emitted descendants.
    pub max_nodes: Option<usize>,
    /// Minimum ms between consecutive profile fetches.
    pub rate_limit_ms: u64,
    /// Retries for transient fetch failures.
    pub transient_retries: u32,
    /// Initial retry backoff in ms.
    pub retry_backoff_ms: u64,
    /// Profile URL template containing `{id}`.
    pub profile_url_template: String,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// User-Agent override.
    pub user_agent: Option<String>,
}

impl From<&AppConfig> for CrawlConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            max_depth: config.crawl.max_depth,
            max_nodes: config.crawl.max_nodes,
            rate_limit_ms: config.crawl.rate_limit_ms,
            transient_retries: config.crawl.transient_retries,
            retry_backoff_ms: config.crawl.retry_backoff_ms,
            profile_url_template: config.source.profile_url_template.clone(),
            timeout_secs: config.source.timeout_secs,
            user_agent: config.source.user_agent.clone(),
        }
    }
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl CrawlConfig {
    /// Reject settings that would make a crawl meaningless or unbounded.
    pub fn validate(&self) -> Result<()> {
        if self.max_depth == 0 {
            return Err(LineageError::config("max_depth must be at least 1"));
        }
        if self.max_nodes == Some(0) {
            return Err(LineageError::config("max_nodes must be at least 1 when set"));
        }
        if !self.profile_url_template.contains(ID_PLACEHOLDER) {
            return Err(LineageError::config(format!(
                "profile_url_template must contain {ID_PLACEHOLDER}"
            )));
        }
        if self.timeout_secs == 0 {
            return Err(LineageError::config("timeout_secs must be at least 1"));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.lineage/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| LineageError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.lineage/lineage.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Resolve the database path: configured value, or `~/.lineage/lineage.db`.
pub fn db_path(config: &AppConfig) -> Result<PathBuf> {
    match &config.storage.db_path {
        Some(p) => Ok(PathBuf::from(p)),
        None => Ok(config_dir()?.join(DB_FILE_NAME)),
    }
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| LineageError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| LineageError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| LineageError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| LineageError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| LineageError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("max_depth"));
        assert!(toml_str.contains("profile_url_template"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.crawl.max_depth, 4);
        assert_eq!(parsed.crawl.rate_limit_ms, 2000);
        assert!(parsed.privacy.redact_living);
    }

    #[test]
    fn partial_config_fills_defaults() {
        let toml_str = r#"
[crawl]
max_depth = 2
max_nodes = 500

[storage]
db_path = "/tmp/lineage.db"
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.crawl.max_depth, 2);
        assert_eq!(config.crawl.max_nodes, Some(500));
        assert_eq!(config.crawl.transient_retries, 0);
        assert_eq!(config.source.timeout_secs, 30);
        assert_eq!(db_path(&config).unwrap(), PathBuf::from("/tmp/lineage.db"));
    }

    #[test]
    fn crawl_config_from_app_config() {
        let app = AppConfig::default();
        let crawl = CrawlConfig::from(&app);
        assert_eq!(crawl.max_depth, 4);
        assert_eq!(crawl.rate_limit_ms, 2000);
        assert!(crawl.profile_url_template.contains(ID_PLACEHOLDER));
        assert!(crawl.validate().is_ok());
    }

    #[test]
    fn zero_depth_is_rejected() {
        let crawl = CrawlConfig {
            max_depth: 0,
            ..CrawlConfig::default()
        };
        let err = crawl.validate().unwrap_err();
        assert!(matches!(err, LineageError::Config { .. }));
        assert!(err.to_string().contains("max_depth"));
    }

    #[test]
    fn template_without_placeholder_is_rejected() {
        let crawl = CrawlConfig {
            profile_url_template: "https://example.com/wiki/".into(),
            ..CrawlConfig::default()
        };
        assert!(crawl.validate().is_err());
    }
}
