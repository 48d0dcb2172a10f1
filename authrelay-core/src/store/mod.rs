//! Credential storage abstraction.
//!
//! This module provides:
//! - [`CredentialStore`] - Trait for credential storage backends
//! - [`MemoryStore`] - In-memory implementation for tests and short-lived processes
//! - [`FileStore`] - JSON file implementation
//! - [`KeyringStore`] - OS keyring implementation (with `keyring-store` feature)
//! - [`create_store`] - Helper to select a backend by [`StoreKind`]
//!
//! Every backend stores the [`CredentialPair`] as one unit, so a reader sees
//! either the pair written before a refresh or the one written after it.
//!
//! # Example
//!
//! ```rust,ignore
//! use authrelay_core::{CredentialPair, CredentialStore, MemoryStore};
//!
//! let store = MemoryStore::new();
//! store.set(&CredentialPair::new("access").with_refresh("refresh")).await?;
//!
//! let pair = store.get().await?.unwrap();
//! assert_eq!(pair.access.expose(), "access");
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::credential::CredentialPair;

mod file;
mod memory;
#[cfg(feature = "keyring-store")]
mod keyring;

pub use file::FileStore;
pub use memory::MemoryStore;
#[cfg(feature = "keyring-store")]
pub use keyring::KeyringStore;

/// Error type for credential store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The storage backend encountered an error.
    #[error("backend error: {message}")]
    BackendError { message: String },

    /// Serialization or deserialization failed.
    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// I/O error reading or writing a store file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The keyring backend is not available.
    #[error("keyring not available: {message}")]
    KeyringUnavailable { message: String },

    /// No platform data directory could be determined.
    #[error("data directory not available")]
    DataDirUnavailable,
}

/// Abstraction over credential storage backends.
///
/// Implementations must offer read-after-write consistency within one
/// process: a `get` that follows a completed `set` or `clear` observes it.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Retrieve the current credential pair.
    ///
    /// Returns `Ok(None)` when no session is stored.
    async fn get(&self) -> Result<Option<CredentialPair>, StoreError>;

    /// Replace the stored pair.
    async fn set(&self, pair: &CredentialPair) -> Result<(), StoreError>;

    /// Remove the stored pair.
    ///
    /// Returns `Ok(())` even if nothing was stored.
    async fn clear(&self) -> Result<(), StoreError>;

    /// Check whether a session is stored without handing out the secrets.
    async fn has_session(&self) -> Result<bool, StoreError> {
        Ok(self.get().await?.is_some())
    }
}

#[async_trait]
impl<S: CredentialStore + ?Sized> CredentialStore for Arc<S> {
    async fn get(&self) -> Result<Option<CredentialPair>, StoreError> {
        (**self).get().await
    }

    async fn set(&self, pair: &CredentialPair) -> Result<(), StoreError> {
        (**self).set(pair).await
    }

    async fn clear(&self) -> Result<(), StoreError> {
        (**self).clear().await
    }
}

#[async_trait]
impl<S: CredentialStore + ?Sized> CredentialStore for Box<S> {
    async fn get(&self) -> Result<Option<CredentialPair>, StoreError> {
        (**self).get().await
    }

    async fn set(&self, pair: &CredentialPair) -> Result<(), StoreError> {
        (**self).set(pair).await
    }

    async fn clear(&self) -> Result<(), StoreError> {
        (**self).clear().await
    }
}

/// Which backend [`create_store`] should build.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    /// OS keyring, falling back to memory when unavailable.
    Keyring,
    /// JSON file in the data directory.
    #[default]
    File,
    /// Process memory only.
    Memory,
}

/// Keyring service the session is filed under.
pub const KEYRING_SERVICE: &str = "authrelay";

fn keyring_or_memory(service_name: &str) -> Box<dyn CredentialStore> {
    #[cfg(feature = "keyring-store")]
    match KeyringStore::try_new(service_name) {
        Ok(store) => {
            tracing::info!("Using OS keyring for credential storage");
            return Box::new(store);
        }
        Err(e) => {
            tracing::warn!(
                "Keyring unavailable ({}), falling back to memory store. \
                 Credentials will not persist across restarts.",
                e
            );
        }
    }

    #[cfg(not(feature = "keyring-store"))]
    tracing::warn!(
        "Keyring storage requested for {:?} but keyring-store feature not enabled. \
         Using memory store. Credentials will not persist across restarts.",
        service_name
    );

    Box::new(MemoryStore::new())
}

/// Create a credential store for the requested backend.
///
/// # Backend Selection Logic
///
/// - [`StoreKind::Keyring`] with the `keyring-store` feature enabled:
///   attempts a [`KeyringStore`] and falls back to [`MemoryStore`] with a
///   warning if the keyring is unavailable or does not keep what is written
/// - [`StoreKind::File`]: opens a [`FileStore`] at `path`, or at
///   [`FileStore::default_path`] when no path is given
/// - [`StoreKind::Memory`]: returns a [`MemoryStore`]
pub async fn create_store(
    kind: StoreKind,
    path: Option<PathBuf>,
) -> Result<Box<dyn CredentialStore>, StoreError> {
    match kind {
        StoreKind::Keyring => Ok(keyring_or_memory(KEYRING_SERVICE)),
        StoreKind::File => {
            let path = match path {
                Some(path) => path,
                None => FileStore::default_path()?,
            };
            tracing::debug!("Using credential file {:?}", path);
            Ok(Box::new(FileStore::open(path).await?))
        }
        StoreKind::Memory => {
            tracing::debug!("Using in-memory credential storage");
            Ok(Box::new(MemoryStore::new()))
        }
    }
}
