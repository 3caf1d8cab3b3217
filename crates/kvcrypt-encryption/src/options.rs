use std::fmt;

/// Parameters of an encrypt or key-rotation call.
///
/// Defaults: a generated key, stored in the secure keystore under the
/// instance's default alias, with the instance's current accessibility mode.
#[derive(Clone, PartialEq, Eq)]
pub struct EncryptOptions {
    /// Caller-managed key. Generated when absent or empty.
    pub key: Option<String>,
    /// Store the key in the secure keystore. Defaults to `true`.
    pub secure_key_storage: bool,
    /// Custom keystore alias, prefixed with the instance's alias prefix. Only
    /// honored when `secure_key_storage` is set.
    pub alias: Option<String>,
    /// Keystore accessibility policy; replaces the instance's mode when set.
    pub accessible_mode: Option<String>,
}

impl Default for EncryptOptions {
    fn default() -> Self {
        Self {
            key: None,
            secure_key_storage: true,
            alias: None,
            accessible_mode: None,
        }
    }
}

impl EncryptOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn with_accessible_mode(mut self, mode: impl Into<String>) -> Self {
        self.accessible_mode = Some(mode.into());
        self
    }

    pub fn secure_key_storage(mut self, enabled: bool) -> Self {
        self.secure_key_storage = enabled;
        self
    }

    /// Empty strings count as absent.
    pub(crate) fn normalized(self) -> Self {
        Self {
            key: non_empty(self.key),
            secure_key_storage: self.secure_key_storage,
            alias: non_empty(self.alias),
            accessible_mode: non_empty(self.accessible_mode),
        }
    }
}

impl fmt::Debug for EncryptOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptOptions")
            .field("key", &self.key.as_ref().map(|_| "<redacted>"))
            .field("secure_key_storage", &self.secure_key_storage)
            .field("alias", &self.alias)
            .field("accessible_mode", &self.accessible_mode)
            .finish()
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

/// Returned by a successful encrypt: the effective key and, when the key went
/// to the secure keystore, the alias it is stored under.
#[derive(Clone, PartialEq, Eq)]
pub struct EncryptionReceipt {
    pub key: String,
    pub alias: Option<String>,
}

impl fmt::Debug for EncryptionReceipt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptionReceipt")
            .field("key", &"<redacted>")
            .field("alias", &self.alias)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_secure_storage() {
        let options = EncryptOptions::default();
        assert!(options.secure_key_storage);
        assert_eq!(options.key, None);
        assert_eq!(options.alias, None);
        assert_eq!(options.accessible_mode, None);
    }

    #[test]
    fn normalized_drops_empty_strings() {
        let options = EncryptOptions::new()
            .with_key("")
            .with_alias("")
            .with_accessible_mode("")
            .secure_key_storage(false)
            .normalized();
        assert_eq!(options.key, None);
        assert_eq!(options.alias, None);
        assert_eq!(options.accessible_mode, None);
        assert!(!options.secure_key_storage);
    }

    #[test]
    fn debug_never_prints_key() {
        let options = EncryptOptions::new().with_key("mySecret123");
        assert!(!format!("{options:?}").contains("mySecret123"));

        let receipt = EncryptionReceipt {
            key: "mySecret123".into(),
            alias: None,
        };
        assert!(!format!("{receipt:?}").contains("mySecret123"));
    }
}
