use thiserror::Error;

/// Raised when the random source cannot produce key material.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("key generation failed: {reason}")]
pub struct GenerationError {
    pub reason: String,
}

/// Produces fresh key material when the caller does not supply a key.
///
/// Implementations must draw from a cryptographically secure source and never
/// derive the key from instance identifiers.
pub trait KeyGenerator: Send + Sync {
    fn generate(&self) -> Result<String, GenerationError>;
}
