use std::{fmt, sync::Arc};

use kvcrypt_core::{
    alias,
    instance::{InstanceInitializer, InstanceRegistry},
    keygen::KeyGenerator,
    storage::{EncryptionEngine, SecureKeystore, StatusLedger, StatusRecord},
};
use kvcrypt_storage::key_generator::OsKeyGenerator;
use tracing::{debug, info, instrument, warn};

use crate::{EncryptOptions, EncryptionError, EncryptionReceipt};

/// Collaborator calls made by the orchestrator, in the order they run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    StoreKey,
    ApplyKey,
    RemoveKey,
    SetFlag,
    RecordStatus,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Step::StoreKey => "keystore.store",
            Step::ApplyKey => "engine.apply_key",
            Step::RemoveKey => "engine.remove_key",
            Step::SetFlag => "engine.set_encrypted_flag",
            Step::RecordStatus => "ledger.record",
        };
        f.write_str(name)
    }
}

/// Completed collaborator steps of one call. There is no transaction spanning
/// keystore, engine and ledger, so a failure leaves these steps in place.
struct StepLog {
    completed: Vec<Step>,
}

impl StepLog {
    fn new() -> Self {
        Self {
            completed: Vec::new(),
        }
    }

    fn check<T, E>(&mut self, step: Step, result: Result<T, E>) -> Result<T, EncryptionError>
    where
        E: Into<EncryptionError>,
    {
        match result {
            Ok(value) => {
                debug!(%step, "step completed");
                self.completed.push(step);
                Ok(value)
            }
            Err(err) => {
                let err = err.into();
                if self.completed.is_empty() {
                    debug!(%step, error = %err, "step failed");
                } else {
                    warn!(
                        failed = %step,
                        completed = ?self.completed,
                        error = %err,
                        "aborting; completed steps are not rolled back"
                    );
                }
                Err(err)
            }
        }
    }
}

/// Sequences the secure keystore, the encryption engine and the status ledger
/// to move an instance between the unencrypted and encrypted states.
///
/// Ordering is always keystore, then engine, then ledger: a lost ledger write
/// can be rebuilt from the engine, a lost keystore write cannot.
pub struct EncryptionOrchestrator {
    keystore: Arc<dyn SecureKeystore>,
    engine: Arc<dyn EncryptionEngine>,
    ledger: Arc<dyn StatusLedger>,
    initializer: Arc<dyn InstanceInitializer>,
    key_generator: Arc<dyn KeyGenerator>,
}

impl EncryptionOrchestrator {
    pub fn new(
        keystore: impl SecureKeystore + 'static,
        engine: impl EncryptionEngine + 'static,
        ledger: impl StatusLedger + 'static,
        initializer: impl InstanceInitializer + 'static,
    ) -> Self {
        Self {
            keystore: Arc::new(keystore),
            engine: Arc::new(engine),
            ledger: Arc::new(ledger),
            initializer: Arc::new(initializer),
            key_generator: Arc::new(OsKeyGenerator),
        }
    }

    /// Replace the OS-random key generator.
    pub fn with_key_generator(mut self, generator: impl KeyGenerator + 'static) -> Self {
        self.key_generator = Arc::new(generator);
        self
    }

    /// Encrypt `instance_id`, or re-key it when it is already encrypted.
    #[instrument(
        skip_all,
        fields(instance_id = %instance_id, secure = options.secure_key_storage)
    )]
    pub async fn encrypt(
        &self,
        registry: &InstanceRegistry,
        instance_id: &str,
        options: EncryptOptions,
    ) -> Result<EncryptionReceipt, EncryptionError> {
        let EncryptOptions {
            key,
            secure_key_storage,
            alias: custom_alias,
            accessible_mode,
        } = options.normalized();
        let config = registry.get(instance_id)?;

        if let Some(mode) = accessible_mode {
            registry.set_accessible_mode(instance_id, mode)?;
        }

        let mut alias = alias::derive(&config.alias_prefix, instance_id);
        registry.set_alias(instance_id, Some(alias.clone()))?;

        let key = match key {
            Some(key) => key,
            None => {
                debug!("no key supplied, generating one");
                self.key_generator.generate()?
            }
        };
        registry.set_key(instance_id, Some(key.clone()))?;

        if secure_key_storage {
            if let Some(custom) = custom_alias.as_deref() {
                alias = alias::derive(&config.alias_prefix, custom);
                registry.set_alias(instance_id, Some(alias.clone()))?;
            }
        }

        registry
            .ensure_initialized(instance_id, self.initializer.as_ref())
            .await?;
        let accessible_mode = registry.get(instance_id)?.accessible_mode;

        let mut log = StepLog::new();
        if secure_key_storage {
            log.check(
                Step::StoreKey,
                self.keystore.store(&alias, &key, &accessible_mode).await,
            )?;
        }
        log.check(Step::ApplyKey, self.engine.apply_key(&key, instance_id).await)?;
        log.check(
            Step::SetFlag,
            self.engine
                .set_encrypted_flag(instance_id, true, instance_id)
                .await,
        )?;

        let recorded_alias = secure_key_storage.then_some(alias);
        log.check(
            Step::RecordStatus,
            self.ledger
                .record(instance_id, true, recorded_alias.as_deref())
                .await,
        )?;

        info!(alias = ?recorded_alias, "instance encrypted");
        Ok(EncryptionReceipt {
            key,
            alias: recorded_alias,
        })
    }

    /// Decrypt `instance_id`. The engine discards the key; the in-memory
    /// config keeps its last key and alias.
    #[instrument(skip_all, fields(instance_id = %instance_id))]
    pub async fn decrypt(
        &self,
        registry: &InstanceRegistry,
        instance_id: &str,
    ) -> Result<(), EncryptionError> {
        registry
            .ensure_initialized(instance_id, self.initializer.as_ref())
            .await?;

        let mut log = StepLog::new();
        log.check(Step::RemoveKey, self.engine.remove_key(instance_id).await)?;
        // The engine flag marks a managed encryption state, so it is set on
        // decrypt too.
        log.check(
            Step::SetFlag,
            self.engine
                .set_encrypted_flag(instance_id, true, instance_id)
                .await,
        )?;
        log.check(
            Step::RecordStatus,
            self.ledger.record(instance_id, false, None).await,
        )?;

        info!("instance decrypted");
        Ok(())
    }

    /// Replace the key of `instance_id`. Identical to a single `encrypt`.
    pub async fn rotate(
        &self,
        registry: &InstanceRegistry,
        instance_id: &str,
        options: EncryptOptions,
    ) -> Result<EncryptionReceipt, EncryptionError> {
        self.encrypt(registry, instance_id, options).await
    }

    pub async fn status(&self, instance_id: &str) -> Result<Option<StatusRecord>, EncryptionError> {
        Ok(self.ledger.lookup(instance_id).await?)
    }

    /// Read back the key of an encrypted instance from the secure keystore,
    /// using the alias recorded in the ledger. `None` when the instance is not
    /// encrypted or its key is caller-managed.
    #[instrument(skip_all, fields(instance_id = %instance_id))]
    pub async fn stored_key(&self, instance_id: &str) -> Result<Option<String>, EncryptionError> {
        let Some(record) = self.ledger.lookup(instance_id).await? else {
            return Ok(None);
        };
        match (record.encrypted, record.alias) {
            (true, Some(alias)) => Ok(self.keystore.fetch(&alias).await?),
            _ => Ok(None),
        }
    }
}
