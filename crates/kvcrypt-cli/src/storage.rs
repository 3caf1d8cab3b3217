use std::path::PathBuf;

use crate::config::Config;
use color_eyre::Result;
use dirs::data_dir;
use kvcrypt_storage::{keyring_store::KeyringKeystore, status_file::FileStatusLedger};
use tracing::debug;

/// Resolve the default data directory for kvcrypt.
pub fn default_data_dir() -> Result<PathBuf> {
    let base = data_dir().ok_or_else(|| color_eyre::eyre::eyre!("no data dir available"))?;
    Ok(base.join("kvcrypt"))
}

/// Data directory from `KVCRYPT_DATA_DIR`, then config, then the platform default.
pub fn data_dir_from_config(config: &Config) -> Result<PathBuf> {
    if let Some(root) = std::env::var_os("KVCRYPT_DATA_DIR") {
        return Ok(PathBuf::from(root));
    }
    match &config.data_dir {
        Some(root) => Ok(root.clone()),
        None => default_data_dir(),
    }
}

/// Open the durable status ledger under the configured data directory.
pub fn ledger_from_config(config: &Config) -> Result<FileStatusLedger> {
    let root = data_dir_from_config(config)?;
    debug!(?root, "opening status ledger");
    Ok(FileStatusLedger::in_dir(root)?)
}

/// Build the OS keyring keystore for the configured service.
pub fn keystore_from_config(config: &Config) -> KeyringKeystore {
    let service = config.keyring_service();
    debug!(%service, "using OS keyring");
    KeyringKeystore::new(service)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ledger_opens_under_configured_dir() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = Config {
            data_dir: Some(dir.path().to_path_buf()),
            ..Config::default()
        };
        if std::env::var_os("KVCRYPT_DATA_DIR").is_some() {
            return;
        }
        let ledger = ledger_from_config(&config).expect("open ledger");
        assert!(ledger.path().starts_with(dir.path()));
    }
}
