//! OS keyring-backed credential storage implementation.

use async_trait::async_trait;
use keyring::Entry;

use super::{CredentialStore, StoreError};
use crate::credential::CredentialPair;

/// Keyring user under which the session entry is filed.
const SESSION_ENTRY: &str = "session";

/// Scratch entry written and read back by [`KeyringStore::try_new`].
const CHECK_ENTRY: &str = "availability-check";

/// OS keyring-backed credential store.
///
/// This store uses the platform's native keyring service:
/// - macOS: Keychain
/// - Linux: Secret Service API (via libsecret)
/// - Windows: Credential Manager
///
/// The whole pair is serialized into a single entry, so access and refresh
/// credentials are always replaced together.
pub struct KeyringStore {
    service_name: String,
}

impl KeyringStore {
    /// Try to create a new keyring store.
    ///
    /// Returns an error if the keyring backend is not available on this
    /// platform, or if it accepts writes without keeping them (the mock
    /// backend keyring uses when no platform store is compiled in).
    pub fn try_new(service_name: &str) -> Result<Self, StoreError> {
        Entry::new(service_name, SESSION_ENTRY).map_err(|e| StoreError::KeyringUnavailable {
            message: format!("keyring backend not available: {}", e),
        })?;

        check_persistence(service_name)
            .map_err(|message| StoreError::KeyringUnavailable { message })?;

        Ok(Self {
            service_name: service_name.to_string(),
        })
    }

    fn entry(&self) -> Result<Entry, StoreError> {
        Entry::new(&self.service_name, SESSION_ENTRY).map_err(|e| StoreError::BackendError {
            message: format!("failed to create keyring entry: {}", e),
        })
    }
}

/// Write a scratch value through one entry and read it back through another.
fn check_persistence(service_name: &str) -> Result<(), String> {
    const EXPECTED: &str = "ok";

    let writer = Entry::new(service_name, CHECK_ENTRY).map_err(|e| e.to_string())?;
    writer
        .set_password(EXPECTED)
        .map_err(|e| format!("keyring rejected a write: {}", e))?;

    let read = Entry::new(service_name, CHECK_ENTRY)
        .map_err(|e| e.to_string())?
        .get_password();
    let _ = writer.delete_credential();

    match read {
        Ok(value) if value == EXPECTED => Ok(()),
        Ok(_) => Err("keyring returned a different value than was written".to_string()),
        Err(keyring::Error::NoEntry) => {
            Err("keyring accepted a write but did not keep it".to_string())
        }
        Err(e) => Err(format!("keyring read failed: {}", e)),
    }
}

impl std::fmt::Debug for KeyringStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyringStore")
            .field("service_name", &self.service_name)
            .finish()
    }
}

#[async_trait]
impl CredentialStore for KeyringStore {
    async fn get(&self) -> Result<Option<CredentialPair>, StoreError> {
        match self.entry()?.get_password() {
            Ok(json) => Ok(Some(serde_json::from_str(&json)?)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(keyring::Error::PlatformFailure(e)) => Err(StoreError::BackendError {
                message: format!("platform keyring failure: {}", e),
            }),
            Err(e) => Err(StoreError::BackendError {
                message: format!("keyring error: {}", e),
            }),
        }
    }

    async fn set(&self, pair: &CredentialPair) -> Result<(), StoreError> {
        let json = serde_json::to_string(pair)?;

        self.entry()?
            .set_password(&json)
            .map_err(|e| StoreError::BackendError {
                message: format!("failed to set keyring password: {}", e),
            })
    }

    async fn clear(&self) -> Result<(), StoreError> {
        match self.entry()?.delete_credential() {
            Ok(()) => Ok(()),
            Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(StoreError::BackendError {
                message: format!("failed to delete keyring entry: {}", e),
            }),
        }
    }
}
