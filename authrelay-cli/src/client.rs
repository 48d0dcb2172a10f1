//! Builds the credential store and API client from CLI configuration.

use anyhow::{Context, Result};
use authrelay_core::{ApiClient, CredentialStore, RefreshError, create_store};
use tracing::{debug, warn};

use crate::config::CliConfig;

/// Open the configured credential store.
pub async fn open_store(config: &CliConfig) -> Result<Box<dyn CredentialStore>> {
    debug!("Opening {:?} credential store", config.store);
    create_store(config.store, config.credentials_path.clone())
        .await
        .context("Failed to open credential store")
}

/// Build an API client over the configured store.
///
/// If a refresh fails the session is cleared and a notice is printed to
/// stderr telling the user to sign in again.
pub async fn connect(config: &CliConfig) -> Result<ApiClient> {
    let api = config.client_config()?;
    let store = open_store(config).await?;

    ApiClient::from_config(api, store, notify_logout)
        .with_context(|| format!("Failed to configure client for {}", api.base_url))
}

fn notify_logout(reason: &RefreshError) {
    warn!("Session ended: {}", reason);
    eprintln!("Session expired ({}). Run `authrelay login` to sign in again.", reason);
}
