use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use thiserror::Error;

/// Accessibility policy applied when the caller does not choose one.
pub const DEFAULT_ACCESSIBLE_MODE: &str = "AccessibleWhenUnlocked";

/// Errors produced by secure keystore implementations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum KeystoreError {
    /// The platform refused the operation (locked device, missing permission).
    #[error("keystore denied access for alias {alias}: {reason}")]
    Denied { alias: String, reason: String },
    /// Underlying keystore failure.
    #[error("keystore failure: {reason}")]
    Backend { reason: String },
}

/// OS-level secret storage addressed by alias.
#[async_trait]
pub trait SecureKeystore: Send + Sync {
    /// Store `key` under `alias`, overwriting any existing entry.
    async fn store(&self, alias: &str, key: &str, accessible_mode: &str)
        -> Result<(), KeystoreError>;

    /// Read the key stored under `alias`, if any.
    async fn fetch(&self, alias: &str) -> Result<Option<String>, KeystoreError>;

    /// Remove the entry for `alias` (idempotent).
    async fn remove(&self, alias: &str) -> Result<(), KeystoreError>;
}

#[derive(Debug, Clone)]
struct StoredSecret {
    masked: Vec<u8>,
    accessible_mode: String,
}

#[derive(Debug, Default)]
struct KeystoreState {
    entries: HashMap<String, StoredSecret>,
    writes: usize,
    unavailable: bool,
}

/// In-memory keystore for tests and smoke runs. Not cryptographically secure.
#[derive(Debug, Default, Clone)]
pub struct InMemoryKeystore {
    inner: Arc<Mutex<KeystoreState>>,
}

impl InMemoryKeystore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate a platform denial for every subsequent call.
    pub fn set_unavailable(&self, unavailable: bool) -> Result<(), KeystoreError> {
        self.lock()?.unavailable = unavailable;
        Ok(())
    }

    /// Number of distinct aliases currently stored.
    pub fn len(&self) -> Result<usize, KeystoreError> {
        Ok(self.lock()?.entries.len())
    }

    pub fn is_empty(&self) -> Result<bool, KeystoreError> {
        Ok(self.len()? == 0)
    }

    /// Total number of successful `store` calls.
    pub fn write_count(&self) -> Result<usize, KeystoreError> {
        Ok(self.lock()?.writes)
    }

    /// Accessibility policy recorded for `alias`.
    pub fn accessible_mode(&self, alias: &str) -> Result<Option<String>, KeystoreError> {
        Ok(self
            .lock()?
            .entries
            .get(alias)
            .map(|e| e.accessible_mode.clone()))
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, KeystoreState>, KeystoreError> {
        self.inner.lock().map_err(|err| KeystoreError::Backend {
            reason: format!("lock poisoned: {err}"),
        })
    }
}

fn check_available(state: &KeystoreState, alias: &str) -> Result<(), KeystoreError> {
    if state.unavailable {
        return Err(KeystoreError::Denied {
            alias: alias.to_string(),
            reason: "keystore unavailable".to_string(),
        });
    }
    Ok(())
}

#[async_trait]
impl SecureKeystore for InMemoryKeystore {
    async fn store(
        &self,
        alias: &str,
        key: &str,
        accessible_mode: &str,
    ) -> Result<(), KeystoreError> {
        let mut state = self.lock()?;
        check_available(&state, alias)?;

        // XOR is a placeholder to avoid holding plaintext in tests.
        state.entries.insert(
            alias.to_string(),
            StoredSecret {
                masked: mask(key.as_bytes()),
                accessible_mode: accessible_mode.to_string(),
            },
        );
        state.writes += 1;
        Ok(())
    }

    async fn fetch(&self, alias: &str) -> Result<Option<String>, KeystoreError> {
        let state = self.lock()?;
        check_available(&state, alias)?;

        state
            .entries
            .get(alias)
            .map(|secret| {
                String::from_utf8(mask(&secret.masked)).map_err(|e| KeystoreError::Backend {
                    reason: format!("stored key is not utf-8: {e}"),
                })
            })
            .transpose()
    }

    async fn remove(&self, alias: &str) -> Result<(), KeystoreError> {
        let mut state = self.lock()?;
        check_available(&state, alias)?;
        state.entries.remove(alias);
        Ok(())
    }
}

const MASK_BYTE: u8 = 0xA5;

fn mask(input: &[u8]) -> Vec<u8> {
    input.iter().map(|b| b ^ MASK_BYTE).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn store_then_fetch_returns_key() {
        let keystore = InMemoryKeystore::new();
        keystore
            .store("616c696173", "secret-key", DEFAULT_ACCESSIBLE_MODE)
            .await
            .expect("store should succeed");

        let fetched = keystore.fetch("616c696173").await.expect("fetch");
        assert_eq!(fetched.as_deref(), Some("secret-key"));
        assert_eq!(
            keystore
                .accessible_mode("616c696173")
                .expect("mode")
                .as_deref(),
            Some(DEFAULT_ACCESSIBLE_MODE)
        );

        let inner = keystore.inner.lock().expect("lock");
        assert_ne!(inner.entries["616c696173"].masked, b"secret-key".to_vec());
    }

    #[tokio::test]
    async fn store_overwrites_existing_alias() {
        let keystore = InMemoryKeystore::new();
        keystore.store("a", "one", "m").await.expect("first store");
        keystore.store("a", "two", "m").await.expect("second store");

        assert_eq!(keystore.len().expect("len"), 1);
        assert_eq!(keystore.write_count().expect("writes"), 2);
        assert_eq!(
            keystore.fetch("a").await.expect("fetch").as_deref(),
            Some("two")
        );
    }

    #[tokio::test]
    async fn unavailable_keystore_denies_writes() {
        let keystore = InMemoryKeystore::new();
        keystore.set_unavailable(true).expect("toggle");

        let err = keystore
            .store("a", "k", "m")
            .await
            .expect_err("store should be denied");
        assert!(matches!(err, KeystoreError::Denied { .. }));
        assert!(keystore.is_empty().expect("is_empty"));
    }

    #[tokio::test]
    async fn remove_is_idempotent() {
        let keystore = InMemoryKeystore::new();
        keystore.store("a", "k", "m").await.expect("store");
        keystore.remove("a").await.expect("remove");
        keystore.remove("a").await.expect("remove again");
        assert_eq!(keystore.fetch("a").await.expect("fetch"), None);
    }

    #[test]
    fn poisoned_lock_is_reported_by_accessors() {
        let keystore = InMemoryKeystore::new();
        let poisoner = keystore.clone();
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.inner.lock().expect("lock");
            panic!("panic while holding the keystore lock");
        })
        .join();

        assert!(matches!(keystore.len(), Err(KeystoreError::Backend { .. })));
        assert!(keystore.set_unavailable(true).is_err());
    }
}
