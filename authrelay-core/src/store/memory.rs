//! In-memory credential storage implementation.

use async_trait::async_trait;
use parking_lot::RwLock;

use super::{CredentialStore, StoreError};
use crate::credential::CredentialPair;

/// In-memory credential store.
///
/// This store is not persistent; the session is lost when the process exits.
pub struct MemoryStore {
    pair: RwLock<Option<CredentialPair>>,
}

impl MemoryStore {
    /// Create a new empty memory store.
    pub fn new() -> Self {
        Self {
            pair: RwLock::new(None),
        }
    }

    /// Create a memory store holding an initial session.
    pub fn with_pair(pair: CredentialPair) -> Self {
        Self {
            pair: RwLock::new(Some(pair)),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("has_session", &self.pair.read().is_some())
            .finish()
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn get(&self) -> Result<Option<CredentialPair>, StoreError> {
        Ok(self.pair.read().clone())
    }

    async fn set(&self, pair: &CredentialPair) -> Result<(), StoreError> {
        *self.pair.write() = Some(pair.clone());
        Ok(())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        self.pair.write().take();
        Ok(())
    }
}
