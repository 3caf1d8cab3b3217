use kvcrypt_core::{
    instance::{InstanceConfig, InstanceRegistry},
    storage::StatusRecord,
};

use crate::{EncryptOptions, EncryptionError, EncryptionOrchestrator, EncryptionReceipt};

/// Top-level handle owning the instance registry and the orchestrator.
///
/// Independent systems share nothing, so tests can build as many as they need.
pub struct StorageSystem {
    registry: InstanceRegistry,
    orchestrator: EncryptionOrchestrator,
}

impl StorageSystem {
    pub fn new(orchestrator: EncryptionOrchestrator) -> Self {
        Self {
            registry: InstanceRegistry::new(),
            orchestrator,
        }
    }

    pub fn registry(&self) -> &InstanceRegistry {
        &self.registry
    }

    pub fn orchestrator(&self) -> &EncryptionOrchestrator {
        &self.orchestrator
    }

    /// Register a storage instance so it can be encrypted.
    pub fn register(&self, config: InstanceConfig) -> Result<(), EncryptionError> {
        Ok(self.registry.register(config)?)
    }

    /// Encryption surface of one registered instance.
    pub fn instance(&self, instance_id: &str) -> Result<InstanceEncryption<'_>, EncryptionError> {
        if !self.registry.contains(instance_id)? {
            return Err(EncryptionError::UnknownInstance {
                instance_id: instance_id.to_string(),
            });
        }
        Ok(InstanceEncryption {
            system: self,
            instance_id: instance_id.to_string(),
        })
    }
}

/// Per-instance handle exposing encrypt, decrypt and key rotation.
pub struct InstanceEncryption<'a> {
    system: &'a StorageSystem,
    instance_id: String,
}

impl InstanceEncryption<'_> {
    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// Encrypt the instance at any time after creation. Without a key, one is
    /// generated and kept in the secure keystore under the default alias.
    pub async fn encrypt(
        &self,
        options: EncryptOptions,
    ) -> Result<EncryptionReceipt, EncryptionError> {
        self.system
            .orchestrator
            .encrypt(&self.system.registry, &self.instance_id, options)
            .await
    }

    /// Decrypt the instance. The key it was encrypted with is discarded.
    pub async fn decrypt(&self) -> Result<(), EncryptionError> {
        self.system
            .orchestrator
            .decrypt(&self.system.registry, &self.instance_id)
            .await
    }

    /// Replace the encryption key, e.g. after the old one was compromised.
    pub async fn change_encryption_key(
        &self,
        options: EncryptOptions,
    ) -> Result<EncryptionReceipt, EncryptionError> {
        self.system
            .orchestrator
            .rotate(&self.system.registry, &self.instance_id, options)
            .await
    }

    pub async fn status(&self) -> Result<Option<StatusRecord>, EncryptionError> {
        self.system.orchestrator.status(&self.instance_id).await
    }

    pub fn config(&self) -> Result<InstanceConfig, EncryptionError> {
        Ok(self.system.registry.get(&self.instance_id)?)
    }
}
