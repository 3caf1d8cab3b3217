//! Core abstractions for kvcrypt: collaborator contracts, the instance registry,
//! and alias derivation. Concrete OS-backed implementations live in
//! `kvcrypt-storage`; the orchestration lives in `kvcrypt-encryption`.

pub mod alias;
pub mod instance;
pub mod keygen;
pub mod storage;
