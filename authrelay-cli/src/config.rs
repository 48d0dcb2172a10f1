//! CLI configuration handling.
//!
//! ```toml
//! store = "file"
//! log_level = "info"
//!
//! [api]
//! base_url = "https://api.example.com/v1"
//! refresh_path = "/auth/refresh"
//! ```

use anyhow::{Context, Result};
use authrelay_core::{ClientConfig, StoreKind};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable that overrides `api.base_url`.
pub const BASE_URL_ENV: &str = "AUTHRELAY_BASE_URL";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CliConfig {
    /// API endpoint settings. Only needed by `request`.
    #[serde(default)]
    pub api: Option<ClientConfig>,

    /// Credential storage backend.
    #[serde(default)]
    pub store: StoreKind,

    /// Session file for the `file` backend. Defaults to the data directory.
    #[serde(default)]
    pub credentials_path: Option<PathBuf>,

    /// Logging level.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Path to the configuration file that was loaded.
    #[serde(skip)]
    pub config_path: PathBuf,
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl CliConfig {
    /// Point the API at `base_url`, keeping any other `[api]` settings.
    pub fn override_base_url(&mut self, base_url: String) {
        match &mut self.api {
            Some(api) => api.base_url = base_url,
            None => self.api = Some(ClientConfig::new(base_url)),
        }
    }

    /// The API settings, or an error explaining how to provide them.
    pub fn client_config(&self) -> Result<&ClientConfig> {
        self.api.as_ref().with_context(|| {
            format!(
                "No API configured: set [api].base_url in {:?} or {}",
                self.config_path, BASE_URL_ENV
            )
        })
    }
}

/// Load configuration from `path`, or from the default location.
///
/// A missing file yields defaults; `AUTHRELAY_BASE_URL` is applied last.
pub fn load_config(path: Option<PathBuf>) -> Result<CliConfig> {
    let config_path = path.unwrap_or_else(default_config_path);

    let mut config = read_config(&config_path)?;
    config.config_path = config_path;

    if let Ok(base_url) = std::env::var(BASE_URL_ENV) {
        config.override_base_url(base_url);
    }

    Ok(config)
}

fn read_config(path: &Path) -> Result<CliConfig> {
    if !path.exists() {
        return Ok(CliConfig {
            log_level: default_log_level(),
            ..CliConfig::default()
        });
    }

    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config from {:?}", path))?;
    toml::from_str(&contents).with_context(|| format!("Failed to parse config from {:?}", path))
}

fn default_config_path() -> PathBuf {
    ProjectDirs::from("com", "raibid-labs", "authrelay")
        .map(|d| d.config_dir().join("config.toml"))
        .unwrap_or_else(|| PathBuf::from("authrelay.toml"))
}
