//! File-backed credential storage.
//!
//! The session is kept as JSON at `~/.local/share/authrelay/session.json` on
//! Linux (platform equivalents elsewhere). Writes go to a sibling temporary
//! file which is then renamed over the original, so a crash mid-write never
//! leaves a half-written pair behind.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::sync::Mutex;

use super::{CredentialStore, StoreError};
use crate::credential::CredentialPair;

/// On-disk format.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SessionFile {
    /// Version of the file format (for future migrations).
    version: u32,

    /// The stored session, if any.
    #[serde(default)]
    credentials: Option<CredentialPair>,
}

impl SessionFile {
    fn new(credentials: Option<CredentialPair>) -> Self {
        Self {
            version: 1,
            credentials,
        }
    }
}

/// Disk-backed credential store.
///
/// The file is read once on [`open`](FileStore::open) and cached; every
/// write updates the file before the cache.
pub struct FileStore {
    path: PathBuf,
    cache: Mutex<Option<CredentialPair>>,
}

impl FileStore {
    /// Get the default location of the session file.
    pub fn default_path() -> Result<PathBuf, StoreError> {
        let dirs = directories::ProjectDirs::from("com", "raibid-labs", "authrelay")
            .ok_or(StoreError::DataDirUnavailable)?;

        Ok(dirs.data_dir().join("session.json"))
    }

    /// Open the store at `path`.
    ///
    /// Creates parent directories if they don't exist. A missing file means
    /// no session is stored.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let credentials = match fs::read_to_string(&path).await {
            Ok(contents) => serde_json::from_str::<SessionFile>(&contents)?.credentials,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            path,
            cache: Mutex::new(credentials),
        })
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn write(&self, credentials: Option<&CredentialPair>) -> Result<(), StoreError> {
        let contents = serde_json::to_string_pretty(&SessionFile::new(credentials.cloned()))?;
        let staging = self.path.with_extension("json.tmp");

        fs::write(&staging, contents).await?;
        restrict_permissions(&staging).await?;
        fs::rename(&staging, &self.path).await?;

        Ok(())
    }
}

#[cfg(unix)]
async fn restrict_permissions(path: &Path) -> Result<(), StoreError> {
    use std::os::unix::fs::PermissionsExt;

    fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)).await?;
    Ok(())
}

#[cfg(not(unix))]
async fn restrict_permissions(_path: &Path) -> Result<(), StoreError> {
    Ok(())
}

impl std::fmt::Debug for FileStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileStore").field("path", &self.path).finish()
    }
}

#[async_trait]
impl CredentialStore for FileStore {
    async fn get(&self) -> Result<Option<CredentialPair>, StoreError> {
        Ok(self.cache.lock().await.clone())
    }

    async fn set(&self, pair: &CredentialPair) -> Result<(), StoreError> {
        let mut cache = self.cache.lock().await;
        self.write(Some(pair)).await?;
        *cache = Some(pair.clone());
        Ok(())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        let mut cache = self.cache.lock().await;
        if cache.is_none() && !fs::try_exists(&self.path).await? {
            return Ok(());
        }
        self.write(None).await?;
        *cache = None;
        Ok(())
    }
}
