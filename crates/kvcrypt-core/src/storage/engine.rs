use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use thiserror::Error;

/// Errors surfaced by the native encryption layer.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EngineError {
    /// The engine holds no key for the instance.
    #[error("no encryption key applied to instance {instance_id}")]
    NoKey { instance_id: String },
    /// Native-layer failure.
    #[error("engine failure: {reason}")]
    Native { reason: String },
}

/// Native encrypt/decrypt primitives of the storage engine, per instance.
///
/// The engine reports success or failure only; there is no partial-success
/// signaling.
#[async_trait]
pub trait EncryptionEngine: Send + Sync {
    /// Re-key `instance_id` with `key`, replacing any previous key.
    async fn apply_key(&self, key: &str, instance_id: &str) -> Result<(), EngineError>;

    /// Decrypt `instance_id` and discard its key material.
    async fn remove_key(&self, instance_id: &str) -> Result<(), EngineError>;

    /// Write the per-instance boolean flag the engine keeps under `scope_id`.
    async fn set_encrypted_flag(
        &self,
        instance_id: &str,
        value: bool,
        scope_id: &str,
    ) -> Result<(), EngineError>;
}

#[derive(Debug, Default)]
struct EngineState {
    keys: HashMap<String, String>,
    flags: HashMap<(String, String), bool>,
    failing: bool,
}

/// In-memory engine for tests. Tracks the applied key and flag per instance.
#[derive(Debug, Default, Clone)]
pub struct InMemoryEngine {
    inner: Arc<Mutex<EngineState>>,
}

impl InMemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail with [`EngineError::Native`].
    pub fn set_failing(&self, failing: bool) -> Result<(), EngineError> {
        self.lock()?.failing = failing;
        Ok(())
    }

    /// Key currently applied to `instance_id`.
    pub fn applied_key(&self, instance_id: &str) -> Result<String, EngineError> {
        let state = self.lock()?;
        state
            .keys
            .get(instance_id)
            .cloned()
            .ok_or_else(|| EngineError::NoKey {
                instance_id: instance_id.to_string(),
            })
    }

    /// Flag value for `instance_id` under its own scope.
    pub fn encrypted_flag(&self, instance_id: &str) -> Result<Option<bool>, EngineError> {
        let scope = (instance_id.to_string(), instance_id.to_string());
        Ok(self.lock()?.flags.get(&scope).copied())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, EngineState>, EngineError> {
        self.inner.lock().map_err(|err| EngineError::Native {
            reason: format!("lock poisoned: {err}"),
        })
    }
}

fn check_failing(state: &EngineState) -> Result<(), EngineError> {
    if state.failing {
        return Err(EngineError::Native {
            reason: "simulated native failure".to_string(),
        });
    }
    Ok(())
}

#[async_trait]
impl EncryptionEngine for InMemoryEngine {
    async fn apply_key(&self, key: &str, instance_id: &str) -> Result<(), EngineError> {
        let mut state = self.lock()?;
        check_failing(&state)?;
        state.keys.insert(instance_id.to_string(), key.to_string());
        Ok(())
    }

    async fn remove_key(&self, instance_id: &str) -> Result<(), EngineError> {
        let mut state = self.lock()?;
        check_failing(&state)?;
        state.keys.remove(instance_id);
        Ok(())
    }

    async fn set_encrypted_flag(
        &self,
        instance_id: &str,
        value: bool,
        scope_id: &str,
    ) -> Result<(), EngineError> {
        let mut state = self.lock()?;
        check_failing(&state)?;
        state
            .flags
            .insert((instance_id.to_string(), scope_id.to_string()), value);
        Ok(())
    }
}
