//! Settings file for schemapilot

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application settings, read from `config.toml`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Location of the SQLite store (defaults to the user data directory)
    #[serde(default)]
    pub store_path: Option<PathBuf>,

    /// Timeout for metadata requests and for connecting to providers
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Metabase instance to extract metadata from
    #[serde(default)]
    pub metabase: MetabaseSettings,
}

/// Metabase connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct MetabaseSettings {
    /// Base URL, e.g. https://metabase.example.com
    pub url: Option<String>,

    /// Session token sent as `X-Metabase-Session`
    pub session_token: Option<String>,

    /// API key sent as `x-api-key`
    pub api_key: Option<String>,
}

fn default_request_timeout_secs() -> u64 {
    30
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            store_path: None,
            request_timeout_secs: default_request_timeout_secs(),
            metabase: MetabaseSettings::default(),
        }
    }
}

impl Settings {
    /// `schemapilot/config.toml` under the user config directory
    pub fn default_path() -> Result<PathBuf> {
        let dir = dirs::config_dir().context("Could not determine the user config directory")?;
        Ok(dir.join(crate::APP_NAME).join("config.toml"))
    }

    /// Load settings from `path` or return defaults when it does not exist
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {:?}", path))?;
            let settings: Settings = toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {:?}", path))?;
            Ok(settings)
        } else {
            Ok(Self::default())
        }
    }

    /// Save settings to `path`
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {:?}", path))?;

        Ok(())
    }

    /// Resolved store location
    pub fn store_path(&self) -> Result<PathBuf> {
        if let Some(ref path) = self.store_path {
            return Ok(path.clone());
        }
        let dir = dirs::data_dir().context("Could not determine the user data directory")?;
        Ok(dir.join(crate::APP_NAME).join("store.db"))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
