//! Configuration loader and validator for the drawer backup tool.
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema exactly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    pub app: App,
    pub api: Api,
}

/// App-level settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct App {
    /// Root destination; one subfolder per backup vertical is created below it.
    pub backup_dir: String,
    /// Directory holding the exported cookie file.
    pub cookie_dir: String,
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_page_delay_ms")]
    pub page_delay_ms: u64,
}

/// Drawer API settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Api {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_fetch_count")]
    pub fetch_count: u32,
}

fn default_workers() -> usize {
    5
}

fn default_page_delay_ms() -> u64 {
    1000
}

fn default_base_url() -> String {
    "https://drawer-api.kakao.com".to_string()
}

fn default_fetch_count() -> u32 {
    100
}

impl Config {
    /// Ensure required directories exist (creates `app.backup_dir` if missing).
    pub fn ensure_dirs(&self) -> Result<(), std::io::Error> {
        if self.app.backup_dir.trim().is_empty() {
            return Ok(());
        }
        fs::create_dir_all(&self.app.backup_dir)
    }
}

/// Load configuration from a YAML file and validate it.
/// - If `path` is None, uses `config.yaml` in the current working directory.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    let cfg: Config = serde_yaml::from_str(&content)?;
    validate(&cfg)?;
    Ok(cfg)
}

/// Validate a configuration instance.
fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.app.backup_dir.trim().is_empty() {
        return Err(ConfigError::Invalid("app.backup_dir must be non-empty"));
    }
    if cfg.app.cookie_dir.trim().is_empty() {
        return Err(ConfigError::Invalid("app.cookie_dir must be non-empty"));
    }
    if cfg.app.workers == 0 {
        return Err(ConfigError::Invalid("app.workers must be > 0"));
    }

    if cfg.api.base_url.trim().is_empty() {
        return Err(ConfigError::Invalid("api.base_url must be non-empty"));
    }
    if cfg.api.fetch_count == 0 {
        return Err(ConfigError::Invalid("api.fetch_count must be > 0"));
    }

    Ok(())
}

/// Example YAML content, also used by the config tests.
pub fn example() -> &'static str {
    r#"app:
  backup_dir: "./backup"
  cookie_dir: "."
  workers: 5
  page_delay_ms: 1000

api:
  base_url: "https://drawer-api.kakao.com"
  fetch_count: 100
"#
}
