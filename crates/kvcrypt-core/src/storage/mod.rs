//! Contracts for the three collaborators the encryption orchestrator sequences:
//! the secure keystore, the native encryption engine, and the status ledger.

mod engine;
mod keystore;
mod ledger;

pub use engine::{EncryptionEngine, EngineError, InMemoryEngine};
pub use keystore::{InMemoryKeystore, KeystoreError, SecureKeystore, DEFAULT_ACCESSIBLE_MODE};
pub use ledger::{InMemoryLedger, LedgerError, StatusLedger, StatusRecord};
