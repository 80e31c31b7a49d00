//! Application configuration management.
//!
//! Settings (API base URL, idle threshold, lock duration, storage backend,
//! locale, user id) live in `~/.config/cring-session/config.json`. The field
//! cipher secret never touches that file: it comes from the
//! `CRING_FIELD_SECRET` environment variable, and its absence is fatal.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::crypto::{CryptoError, FieldCipher};
use crate::idle::{ActivityEvent, IdleConfig};
use crate::reauth::Locale;
use crate::storage::{FileStore, KeyringStore, MemoryStore, SharedStore};

/// Application name used for config/cache directory paths
pub const APP_NAME: &str = "cring-session";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Environment variable holding the shared field-cipher secret
pub const SECRET_ENV: &str = "CRING_FIELD_SECRET";

/// Environment variable overriding the API base URL
pub const API_URL_ENV: &str = "CRING_API_URL";

const DEFAULT_API_BASE_URL: &str = "http://localhost:8080/api";

/// Inactivity before the session locks (5 minutes)
const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 300;

/// How long an idle lock masks protected data (5 minutes)
const DEFAULT_LOCK_DURATION_SECS: u64 = 300;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Required environment variable {0} is not set")]
    MissingSecret(&'static str),

    #[error("Field cipher secret is unusable: {0}")]
    InvalidSecret(#[from] CryptoError),

    #[error("{field} = {value} is out of range")]
    OutOfRange { field: &'static str, value: u64 },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    File,
    Keyring,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_base_url: String,
    pub idle_timeout_secs: u64,
    pub lock_duration_secs: u64,
    pub idle_events: Vec<ActivityEvent>,
    pub storage: StorageBackend,
    pub locale: Locale,
    pub user_id: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            idle_timeout_secs: DEFAULT_IDLE_TIMEOUT_SECS,
            lock_duration_secs: DEFAULT_LOCK_DURATION_SECS,
            idle_events: ActivityEvent::ALL.to_vec(),
            storage: StorageBackend::default(),
            locale: Locale::default(),
            user_id: None,
        }
    }
}

impl Config {
    /// Load from the default location, falling back to defaults when absent.
    /// Environment overrides are applied afterwards.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&Self::config_path()?)?;
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config file {}", path.display()))
        } else {
            debug!(path = %path.display(), "No config file, using defaults");
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    pub fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var(API_URL_ENV) {
            if !url.trim().is_empty() {
                self.api_base_url = url.trim().to_string();
            }
        }
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn cache_dir(&self) -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    pub fn idle_config(&self) -> IdleConfig {
        IdleConfig::with_threshold(std::time::Duration::from_secs(self.idle_timeout_secs))
            .events(self.idle_events.iter().copied())
    }

    pub fn lock_duration(&self) -> std::result::Result<chrono::Duration, ConfigError> {
        seconds_to_duration(self.lock_duration_secs).ok_or(ConfigError::OutOfRange {
            field: "lock_duration_secs",
            value: self.lock_duration_secs,
        })
    }

    /// Open the configured storage backend.
    pub fn open_store(&self) -> Result<SharedStore> {
        let store: SharedStore = match self.storage {
            StorageBackend::File => Arc::new(
                FileStore::new(self.cache_dir()?.join("storage"))
                    .context("Failed to open file store")?,
            ),
            StorageBackend::Keyring => Arc::new(
                KeyringStore::open(APP_NAME).context("Failed to open keychain store")?,
            ),
            StorageBackend::Memory => Arc::new(MemoryStore::new()),
        };
        debug!(backend = ?self.storage, "Storage backend opened");
        Ok(store)
    }
}

/// `None` when `secs` does not fit a `chrono::Duration`.
fn seconds_to_duration(secs: u64) -> Option<chrono::Duration> {
    i64::try_from(secs).ok().and_then(chrono::Duration::try_seconds)
}

/// Build the field cipher from the `CRING_FIELD_SECRET` value. A missing or
/// blank secret is `ConfigError::MissingSecret`.
pub fn field_cipher_from(secret: Option<String>) -> std::result::Result<FieldCipher, ConfigError> {
    let secret = secret
        .filter(|s| !s.trim().is_empty())
        .ok_or(ConfigError::MissingSecret(SECRET_ENV))?;
    Ok(FieldCipher::from_secret(&secret)?)
}
