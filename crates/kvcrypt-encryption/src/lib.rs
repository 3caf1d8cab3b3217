//! Encryption-state orchestration for kvcrypt storage instances.
//!
//! [`EncryptionOrchestrator`] sequences the secure keystore, the native engine
//! and the status ledger; [`StorageSystem`] owns the instance registry and hands
//! out per-instance [`InstanceEncryption`] handles.

mod error;
mod options;
mod orchestrator;
mod system;

pub use error::EncryptionError;
pub use options::{EncryptOptions, EncryptionReceipt};
pub use orchestrator::{EncryptionOrchestrator, Step};
pub use system::{InstanceEncryption, StorageSystem};
