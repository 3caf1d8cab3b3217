/// Prefix used when an instance is registered without one.
pub const DEFAULT_ALIAS_PREFIX: &str = "com.MMKV.";

/// Derive the secure keystore alias for `identifier` under `prefix`.
///
/// The alias is the lowercase hex encoding of the UTF-8 bytes of
/// `prefix + identifier`. It is looked up again on later runs, so the output
/// must never change for the same input.
pub fn derive(prefix: &str, identifier: &str) -> String {
    let mut raw = String::with_capacity(prefix.len() + identifier.len());
    raw.push_str(prefix);
    raw.push_str(identifier);
    hex::encode(raw.as_bytes())
}
