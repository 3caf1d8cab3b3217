//! Concrete collaborators for kvcrypt: the OS keyring keystore, the OS-random
//! key generator, and the durable file-backed status ledger.

pub mod key_generator;
pub mod keyring_store;
pub mod status_file;
