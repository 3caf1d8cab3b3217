use async_trait::async_trait;
use kvcrypt_core::storage::{KeystoreError, SecureKeystore};
use tracing::{debug, instrument};

/// Service name used for keyring entries when none is configured.
pub const DEFAULT_SERVICE: &str = "kvcrypt";

/// OS keyring-backed keystore. Each alias is stored as a separate account under
/// one service name.
pub struct KeyringKeystore {
    service: String,
}

impl KeyringKeystore {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    fn entry(&self, alias: &str) -> Result<keyring::Entry, KeystoreError> {
        keyring::Entry::new(&self.service, alias).map_err(|e| map_keyring_error(alias, e))
    }
}

impl Default for KeyringKeystore {
    fn default() -> Self {
        Self::new(DEFAULT_SERVICE)
    }
}

#[async_trait]
impl SecureKeystore for KeyringKeystore {
    #[instrument(skip_all, fields(alias = %alias))]
    async fn store(
        &self,
        alias: &str,
        key: &str,
        accessible_mode: &str,
    ) -> Result<(), KeystoreError> {
        // Desktop keyrings have no accessibility classes.
        debug!(accessible_mode, "accessibility mode not enforced by this keyring");
        self.entry(alias)?
            .set_password(key)
            .map_err(|e| map_keyring_error(alias, e))
    }

    #[instrument(skip_all, fields(alias = %alias))]
    async fn fetch(&self, alias: &str) -> Result<Option<String>, KeystoreError> {
        match self.entry(alias)?.get_password() {
            Ok(secret) => Ok(Some(secret)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(err) => Err(map_keyring_error(alias, err)),
        }
    }

    #[instrument(skip_all, fields(alias = %alias))]
    async fn remove(&self, alias: &str) -> Result<(), KeystoreError> {
        match self.entry(alias)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(err) => Err(map_keyring_error(alias, err)),
        }
    }
}

fn map_keyring_error(alias: &str, err: keyring::Error) -> KeystoreError {
    match err {
        keyring::Error::NoStorageAccess(inner) => KeystoreError::Denied {
            alias: alias.to_string(),
            reason: inner.to_string(),
        },
        other => KeystoreError::Backend {
            reason: other.to_string(),
        },
    }
}
