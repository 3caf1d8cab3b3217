use std::{
    collections::HashMap,
    fmt,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex, MutexGuard,
    },
};

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::{
    alias::DEFAULT_ALIAS_PREFIX,
    storage::{EngineError, DEFAULT_ACCESSIBLE_MODE},
};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// No configuration was registered for the instance.
    #[error("unknown storage instance: {instance_id}")]
    UnknownInstance { instance_id: String },
    /// The instance initializer hook failed.
    #[error("instance initialization failed: {0}")]
    Initialize(#[from] EngineError),
    /// A thread panicked while holding the registry lock.
    #[error("instance registry lock poisoned: {reason}")]
    LockPoisoned { reason: String },
}

/// Per-instance encryption configuration.
#[derive(Clone, PartialEq, Eq)]
pub struct InstanceConfig {
    pub instance_id: String,
    /// Present only while encryption is active and known to this process.
    pub key: Option<String>,
    /// Hex-encoded keystore alias.
    pub alias: Option<String>,
    pub alias_prefix: String,
    pub accessible_mode: String,
    pub initialized: bool,
}

impl InstanceConfig {
    pub fn new(instance_id: impl Into<String>) -> Self {
        Self {
            instance_id: instance_id.into(),
            key: None,
            alias: None,
            alias_prefix: DEFAULT_ALIAS_PREFIX.to_string(),
            accessible_mode: DEFAULT_ACCESSIBLE_MODE.to_string(),
            initialized: false,
        }
    }

    pub fn with_alias_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.alias_prefix = prefix.into();
        self
    }

    pub fn with_accessible_mode(mut self, mode: impl Into<String>) -> Self {
        self.accessible_mode = mode.into();
        self
    }

    /// Mark the instance as already bootstrapped by its creator.
    pub fn initialized(mut self) -> Self {
        self.initialized = true;
        self
    }
}

// Key material must never reach logs.
impl fmt::Debug for InstanceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstanceConfig")
            .field("instance_id", &self.instance_id)
            .field("key", &self.key.as_ref().map(|_| "<redacted>"))
            .field("alias", &self.alias)
            .field("alias_prefix", &self.alias_prefix)
            .field("accessible_mode", &self.accessible_mode)
            .field("initialized", &self.initialized)
            .finish()
    }
}

/// Bootstrap hook of the underlying storage engine, run once per instance
/// before any encryption call.
#[async_trait]
pub trait InstanceInitializer: Send + Sync {
    async fn initialize(&self, instance_id: &str) -> Result<(), EngineError>;
}

/// Initializer double that counts how often the hook ran.
#[derive(Debug, Default, Clone)]
pub struct CountingInitializer {
    calls: Arc<AtomicUsize>,
}

impl CountingInitializer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl InstanceInitializer for CountingInitializer {
    async fn initialize(&self, _instance_id: &str) -> Result<(), EngineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Process-local map from instance id to its configuration.
///
/// Entries are created by whoever creates storage instances; this subsystem
/// only reads and mutates them.
#[derive(Debug, Default)]
pub struct InstanceRegistry {
    inner: Mutex<HashMap<String, InstanceConfig>>,
}

impl InstanceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the configuration for `config.instance_id`.
    pub fn register(&self, config: InstanceConfig) -> Result<(), RegistryError> {
        debug!(instance_id = %config.instance_id, "registering instance");
        let mut map = self.lock()?;
        map.insert(config.instance_id.clone(), config);
        Ok(())
    }

    pub fn get(&self, instance_id: &str) -> Result<InstanceConfig, RegistryError> {
        let map = self.lock()?;
        map.get(instance_id)
            .cloned()
            .ok_or_else(|| unknown(instance_id))
    }

    pub fn contains(&self, instance_id: &str) -> Result<bool, RegistryError> {
        Ok(self.lock()?.contains_key(instance_id))
    }

    pub fn instance_ids(&self) -> Result<Vec<String>, RegistryError> {
        let map = self.lock()?;
        let mut ids: Vec<String> = map.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }

    pub fn set_key(&self, instance_id: &str, key: Option<String>) -> Result<(), RegistryError> {
        self.update(instance_id, |config| config.key = key)
    }

    pub fn set_alias(&self, instance_id: &str, alias: Option<String>) -> Result<(), RegistryError> {
        self.update(instance_id, |config| config.alias = alias)
    }

    pub fn set_accessible_mode(
        &self,
        instance_id: &str,
        mode: impl Into<String>,
    ) -> Result<(), RegistryError> {
        let mode = mode.into();
        self.update(instance_id, |config| config.accessible_mode = mode)
    }

    pub fn is_initialized(&self, instance_id: &str) -> Result<bool, RegistryError> {
        Ok(self.get(instance_id)?.initialized)
    }

    /// Run the initializer hook once for `instance_id`. Returns whether the
    /// hook ran on this call.
    #[instrument(skip_all, fields(instance_id = %instance_id))]
    pub async fn ensure_initialized(
        &self,
        instance_id: &str,
        initializer: &dyn InstanceInitializer,
    ) -> Result<bool, RegistryError> {
        if self.is_initialized(instance_id)? {
            return Ok(false);
        }

        // The lock is released while the hook runs; callers serialize per instance.
        initializer.initialize(instance_id).await?;
        self.update(instance_id, |config| config.initialized = true)?;
        debug!("instance initialized");
        Ok(true)
    }

    fn update(
        &self,
        instance_id: &str,
        apply: impl FnOnce(&mut InstanceConfig),
    ) -> Result<(), RegistryError> {
        let mut map = self.lock()?;
        let config = map.get_mut(instance_id).ok_or_else(|| unknown(instance_id))?;
        apply(config);
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, InstanceConfig>>, RegistryError> {
        self.inner.lock().map_err(|err| RegistryError::LockPoisoned {
            reason: err.to_string(),
        })
    }
}

fn unknown(instance_id: &str) -> RegistryError {
    RegistryError::UnknownInstance {
        instance_id: instance_id.to_string(),
    }
}
