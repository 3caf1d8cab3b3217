use kvcrypt_core::{
    instance::RegistryError,
    keygen::GenerationError,
    storage::{EngineError, KeystoreError, LedgerError},
};
use thiserror::Error;

/// Failure of an encrypt, decrypt or rotate call. Steps completed before the
/// failure are not rolled back.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EncryptionError {
    #[error("unknown storage instance: {instance_id}")]
    UnknownInstance { instance_id: String },
    #[error(transparent)]
    Keystore(#[from] KeystoreError),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Generation(#[from] GenerationError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error("instance registry unavailable: {reason}")]
    Registry { reason: String },
}

impl From<RegistryError> for EncryptionError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::UnknownInstance { instance_id } => {
                EncryptionError::UnknownInstance { instance_id }
            }
            RegistryError::Initialize(engine) => EncryptionError::Engine(engine),
            RegistryError::LockPoisoned { reason } => EncryptionError::Registry { reason },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn poisoned_registry_maps_to_registry_error() {
        let err = EncryptionError::from(RegistryError::LockPoisoned {
            reason: "poisoned".to_string(),
        });
        assert_eq!(
            err,
            EncryptionError::Registry {
                reason: "poisoned".to_string()
            }
        );
    }
}
