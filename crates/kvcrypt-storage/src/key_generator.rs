use kvcrypt_core::keygen::{GenerationError, KeyGenerator};
use rand::{rngs::OsRng, RngCore};

/// Length of generated keys, in characters.
pub const KEY_LENGTH: usize = 16;

/// Character space of generated keys.
pub const KEY_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

// Bytes at or above this bound are rejected so every charset index is equally likely.
const ACCEPT_BELOW: u8 = (256 / KEY_CHARSET.len() * KEY_CHARSET.len()) as u8;

/// Key generator backed by the operating system CSPRNG.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsKeyGenerator;

impl KeyGenerator for OsKeyGenerator {
    fn generate(&self) -> Result<String, GenerationError> {
        generate_key()
    }
}

/// Draw a fresh alphanumeric key of [`KEY_LENGTH`] characters from `OsRng`.
pub fn generate_key() -> Result<String, GenerationError> {
    let mut key = String::with_capacity(KEY_LENGTH);
    let mut buf = [0u8; 32];

    while key.len() < KEY_LENGTH {
        OsRng
            .try_fill_bytes(&mut buf)
            .map_err(|e| GenerationError {
                reason: e.to_string(),
            })?;

        for byte in buf.iter().copied().filter(|b| *b < ACCEPT_BELOW) {
            if key.len() == KEY_LENGTH {
                break;
            }
            key.push(KEY_CHARSET[byte as usize % KEY_CHARSET.len()] as char);
        }
    }

    Ok(key)
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn generates_fixed_length_alphanumeric_keys() {
        let key = OsKeyGenerator.generate().expect("generate");
        assert_eq!(key.len(), KEY_LENGTH);
        assert!(key.bytes().all(|b| KEY_CHARSET.contains(&b)));
    }

    #[test]
    fn consecutive_keys_are_unique() {
        let mut seen = HashSet::new();
        for _ in 0..2_000 {
            let key = generate_key().expect("generate");
            assert!(seen.insert(key), "generated a duplicate key");
        }
    }

    #[test]
    fn rejection_bound_is_multiple_of_charset() {
        assert_eq!(ACCEPT_BELOW as usize % KEY_CHARSET.len(), 0);
        assert_eq!(ACCEPT_BELOW, 248);
    }
}
