//! Application configuration management.
//!
//! Configuration is stored at `~/.config/bimbelku/config.json` (or the
//! platform equivalent). `BIMBELKU_API_URL` in the environment overrides the
//! stored API base URL.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::auth::{FilePersistence, KeyringPersistence, MemoryPersistence, SessionPersistence};

/// Application name used for config/data directory paths
const APP_NAME: &str = "bimbelku";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Environment variable overriding `api_url`
pub const API_URL_ENV: &str = "BIMBELKU_API_URL";

const DEFAULT_API_URL: &str = "http://localhost:8000";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
const DEFAULT_REFRESH_TIMEOUT_SECS: u64 = 15;

/// Where the session survives restarts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// `session.json` in the data directory.
    #[default]
    File,
    /// The OS keychain.
    Keyring,
    /// Nothing is persisted.
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_url: String,
    pub request_timeout_secs: u64,
    pub refresh_timeout_secs: u64,
    /// Check the stored session against the server before landing on a dashboard.
    pub verify_session_on_entry: bool,
    pub storage: StorageBackend,
    pub last_email: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            refresh_timeout_secs: DEFAULT_REFRESH_TIMEOUT_SECS,
            verify_session_on_entry: true,
            storage: StorageBackend::default(),
            last_email: None,
        }
    }
}

impl Config {
    /// Load the stored config, then apply environment overrides.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_stored()?;
        config.apply_env();
        Ok(config)
    }

    /// The config file as written, without environment overrides.
    pub fn load_stored() -> Result<Self> {
        let path = Self::config_path()?;
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse {}", path.display()))
    }

    /// Record the last email used to log in, leaving the rest of the stored
    /// file alone.
    pub fn save_last_email(email: &str) -> Result<()> {
        let mut stored = Self::load_stored()?;
        stored.last_email = Some(email.to_string());
        stored.save()
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn data_dir(&self) -> Result<PathBuf> {
        let data_dir = dirs::data_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find data directory"))?;
        Ok(data_dir.join(APP_NAME))
    }

    pub fn apply_env(&mut self) {
        self.apply_api_url(std::env::var(API_URL_ENV).ok());
    }

    fn apply_api_url(&mut self, value: Option<String>) {
        if let Some(url) = value.map(|v| v.trim().trim_end_matches('/').to_string()) {
            if !url.is_empty() {
                debug!(api_url = %url, "API URL overridden from environment");
                self.api_url = url;
            }
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn refresh_timeout(&self) -> Duration {
        Duration::from_secs(self.refresh_timeout_secs)
    }

    /// Open the configured session storage backend.
    pub fn open_persistence(&self) -> Result<Box<dyn SessionPersistence>> {
        Ok(match self.storage {
            StorageBackend::File => Box::new(FilePersistence::new(&self.data_dir()?)),
            StorageBackend::Keyring => Box::new(KeyringPersistence::default()),
            StorageBackend::Memory => Box::new(MemoryPersistence::new()),
        })
    }
}
