use std::{
    fs,
    path::{Path, PathBuf},
};

use color_eyre::Result;
use dirs::config_dir;
use kvcrypt_core::{alias::DEFAULT_ALIAS_PREFIX, storage::DEFAULT_ACCESSIBLE_MODE};
use kvcrypt_storage::keyring_store::DEFAULT_SERVICE;
use serde::{Deserialize, Serialize};

/// User-level configuration loaded from `~/.config/kvcrypt/config.toml` (platform-specific).
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct Config {
    /// Override for the data directory holding the status ledger.
    pub data_dir: Option<PathBuf>,
    /// Namespace prefix used to derive keystore aliases.
    pub alias_prefix: Option<String>,
    /// Keyring service name keys are stored under.
    pub keyring_service: Option<String>,
    /// Accessibility policy used for keystore health checks.
    pub accessible_mode: Option<String>,
}

impl Config {
    pub fn alias_prefix(&self) -> &str {
        self.alias_prefix.as_deref().unwrap_or(DEFAULT_ALIAS_PREFIX)
    }

    pub fn accessible_mode(&self) -> &str {
        self.accessible_mode
            .as_deref()
            .unwrap_or(DEFAULT_ACCESSIBLE_MODE)
    }

    /// Keyring service, preferring `KVCRYPT_KEYRING_SERVICE` over the file.
    pub fn keyring_service(&self) -> String {
        std::env::var("KVCRYPT_KEYRING_SERVICE")
            .ok()
            .or_else(|| self.keyring_service.clone())
            .unwrap_or_else(|| DEFAULT_SERVICE.to_string())
    }
}

/// Load config from the default path; if missing, return defaults.
pub fn load() -> Result<Config> {
    let path = default_path()?;
    load_from_path(path)
}

/// Load config from a given path; if missing or empty, return defaults.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<Config> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(Config::default());
    }
    let contents = fs::read_to_string(path)?;
    if contents.trim().is_empty() {
        return Ok(Config::default());
    }
    let cfg: Config = toml::from_str(&contents)?;
    Ok(cfg)
}

/// Resolve the default config path (platform aware).
pub fn default_path() -> Result<PathBuf> {
    let base = config_dir().ok_or_else(|| color_eyre::eyre::eyre!("no config dir available"))?;
    Ok(base.join("kvcrypt").join("config.toml"))
}

/// Write the given config to the default path unless a file is already there.
pub fn write_default_if_missing(config: &Config) -> Result<PathBuf> {
    write_if_missing(config, &default_path()?)
}

fn write_if_missing(config: &Config, path: &Path) -> Result<PathBuf> {
    if path.exists() {
        return Ok(path.to_path_buf());
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let body = toml::to_string_pretty(config)?;
    fs::write(path, body)?;
    Ok(path.to_path_buf())
}
