//! Client configuration.
//!
//! ```toml
//! base_url = "https://api.example.com/v1"
//! refresh_path = "/auth/refresh"
//! refresh_field = "refreshToken"
//! refresh_timeout_secs = 10
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::ApiError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Root that relative request paths are resolved against.
    pub base_url: String,

    /// Refresh endpoint, relative to `base_url` or absolute.
    #[serde(default = "default_refresh_path")]
    pub refresh_path: String,

    /// JSON field carrying the refresh credential in the refresh request.
    #[serde(default = "default_refresh_field")]
    pub refresh_field: String,

    /// Upper bound on one refresh exchange.
    #[serde(default = "default_refresh_timeout_secs")]
    pub refresh_timeout_secs: u64,

    /// Upper bound on each ordinary request.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_refresh_path() -> String {
    "/auth/refresh".to_string()
}

fn default_refresh_field() -> String {
    crate::authority::HttpAuthority::DEFAULT_REFRESH_FIELD.to_string()
}

fn default_refresh_timeout_secs() -> u64 {
    crate::coordinator::DEFAULT_REFRESH_TIMEOUT.as_secs()
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_user_agent() -> String {
    format!("authrelay/{}", env!("CARGO_PKG_VERSION"))
}

impl ClientConfig {
    /// Create a configuration with defaults for everything but the base URL.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            refresh_path: default_refresh_path(),
            refresh_field: default_refresh_field(),
            refresh_timeout_secs: default_refresh_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }

    /// Parse `base_url`.
    pub fn base_url(&self) -> Result<Url, ApiError> {
        Url::parse(&self.base_url)
            .map_err(|e| ApiError::config(format!("invalid base_url {:?}: {}", self.base_url, e)))
    }

    /// Resolve `refresh_path` to the refresh endpoint.
    pub fn refresh_url(&self) -> Result<Url, ApiError> {
        if let Ok(absolute) = Url::parse(&self.refresh_path) {
            return Ok(absolute);
        }

        let mut base = self.base_url()?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        base.join(self.refresh_path.trim_start_matches('/'))
            .map_err(|e| {
                ApiError::config(format!("invalid refresh_path {:?}: {}", self.refresh_path, e))
            })
    }

    pub fn refresh_timeout(&self) -> Duration {
        Duration::from_secs(self.refresh_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_minimal_config() {
        let config: ClientConfig =
            serde_json::from_value(serde_json::json!({ "base_url": "https://api.example.com" }))
                .unwrap();

        assert_eq!(config, ClientConfig::new("https://api.example.com"));
        assert_eq!(config.refresh_timeout(), Duration::from_secs(10));
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
        assert!(config.user_agent.starts_with("authrelay/"));
    }

    #[test]
    fn test_refresh_url_relative_to_base() {
        let config = ClientConfig::new("https://api.example.com/v1");
        assert_eq!(
            config.refresh_url().unwrap().as_str(),
            "https://api.example.com/v1/auth/refresh"
        );
    }

    #[test]
    fn test_refresh_url_absolute() {
        let mut config = ClientConfig::new("https://api.example.com/v1");
        config.refresh_path = "https://auth.example.com/token".to_string();
        assert_eq!(
            config.refresh_url().unwrap().as_str(),
            "https://auth.example.com/token"
        );
    }

    #[test]
    fn test_invalid_base_url() {
        let config = ClientConfig::new("not a url");
        assert!(matches!(config.base_url(), Err(ApiError::Config { .. })));
        assert!(matches!(config.refresh_url(), Err(ApiError::Config { .. })));
    }
}
