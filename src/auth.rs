//! Proxy identity and credential storage.
//!
//! The sign-in handshake with the identity provider happens elsewhere; this
//! module only consumes the resulting credential. A credential is cached on
//! disk as JSON and turned into an [`Identity`] whenever a session is created.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::BroadcastError;
use crate::Result;

/// File name of the cached credential inside the cache directory.
pub const CREDENTIAL_FILE: &str = "credential.json";

/// A cached sign-in result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Credential {
    /// XSTS token.
    pub token: String,
    /// User hash paired with the token.
    pub user_hash: String,
    /// Account id.
    pub xuid: String,
    /// Account display name.
    pub gamertag: String,
    /// Moment the token stops being accepted.
    pub expires_at: DateTime<Utc>,
}

impl Credential {
    /// Check whether the token has expired at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// The authenticated proxy identity sessions are published under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub xuid: String,
    pub gamertag: String,
    /// Value of the `Authorization` header for directory calls.
    pub authorization: String,
}

impl From<&Credential> for Identity {
    fn from(credential: &Credential) -> Self {
        Self {
            xuid: credential.xuid.clone(),
            gamertag: credential.gamertag.clone(),
            authorization: format!("XBL3.0 x={};{}", credential.user_hash, credential.token),
        }
    }
}

/// Persistent credential cache.
pub trait CredentialStorage: Send + Sync {
    /// Load the cached credential, if one exists.
    fn load_credential(&self) -> Result<Option<Credential>>;

    /// Replace the cached credential.
    fn save_credential(&self, credential: &Credential) -> Result<()>;
}

/// Credential cache backed by a JSON file.
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    /// Create storage rooted at `dir`. The directory is created on first save.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Path of the credential file.
    pub fn credential_path(&self) -> PathBuf {
        self.dir.join(CREDENTIAL_FILE)
    }

    /// Read a credential from an arbitrary JSON file.
    pub fn read_credential_file(path: &Path) -> Result<Credential> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

impl CredentialStorage for FileStorage {
    fn load_credential(&self) -> Result<Option<Credential>> {
        let path = self.credential_path();
        if !path.exists() {
            return Ok(None);
        }
        let credential = Self::read_credential_file(&path)
            .map_err(|e| BroadcastError::Storage(format!("{}: {}", path.display(), e)))?;
        Ok(Some(credential))
    }

    fn save_credential(&self, credential: &Credential) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        let json = serde_json::to_string_pretty(credential)?;
        fs::write(self.credential_path(), json)?;
        debug!(path = %self.credential_path().display(), "saved credential");
        Ok(())
    }
}

/// Produces the identity a session is created under.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Authenticate and return the current identity.
    async fn authenticate(&self) -> Result<Identity>;
}

/// Authenticator that trusts a previously cached credential.
pub struct StoredCredentialAuthenticator {
    storage: Arc<dyn CredentialStorage>,
}

impl StoredCredentialAuthenticator {
    /// Create an authenticator reading from `storage`.
    pub fn new(storage: Arc<dyn CredentialStorage>) -> Self {
        Self { storage }
    }
}

#[async_trait]
impl Authenticator for StoredCredentialAuthenticator {
    async fn authenticate(&self) -> Result<Identity> {
        let credential = self
            .storage
            .load_credential()?
            .ok_or_else(|| BroadcastError::Auth("no cached credential; import one with --import".into()))?;

        if credential.is_expired_at(Utc::now()) {
            return Err(BroadcastError::Auth(format!(
                "credential for {} expired at {}",
                credential.gamertag, credential.expires_at
            )));
        }

        Ok(Identity::from(&credential))
    }
}
