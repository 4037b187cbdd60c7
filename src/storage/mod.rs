//! SQLite storage layer for schemapilot
//!
//! This module handles persistent storage of:
//! - The extracted raw schema and its extraction date
//! - Table selection options and the formatted schema
//! - Provider credentials, their status and the selected model
//! - Migration of the legacy single-provider configuration

mod schema;

pub use schema::{LEGACY_CONFIG_KEY, LOCAL_CONFIG_KEY, SCHEMA};

use crate::llm::Provider;
use crate::schema::{DatabaseId, FormattedDatabase, FormattedSchema, RawDatabase, SchemaOptionsRoot};
use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info};

/// Outcome of the last credential check for a provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderStatus {
    #[default]
    Unset,
    Valid,
    Invalid,
    Error,
}

impl ProviderStatus {
    pub fn is_unset(&self) -> bool {
        matches!(self, ProviderStatus::Unset)
    }
}

impl std::fmt::Display for ProviderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderStatus::Unset => write!(f, "unset"),
            ProviderStatus::Valid => write!(f, "valid"),
            ProviderStatus::Invalid => write!(f, "invalid"),
            ProviderStatus::Error => write!(f, "error"),
        }
    }
}

/// Credential of one provider
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "ProviderStatus::is_unset")]
    pub status: ProviderStatus,
}

/// Where the prompt popup was last placed
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PopupPosition {
    pub left: f64,
    pub top: f64,
}

/// The persisted configuration document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_database_schema: Option<Vec<RawDatabase>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_database_schema_extracted_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_schema_options: Option<SchemaOptionsRoot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formatted_database_schema: Option<FormattedSchema>,
    #[serde(default = "default_provider_selected")]
    pub provider_selected: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_selected: Option<String>,
    #[serde(default = "default_providers")]
    pub providers: BTreeMap<String, ProviderConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub popup_position: Option<PopupPosition>,
}

fn default_provider_selected() -> String {
    Provider::OpenAi.key().to_string()
}

fn default_providers() -> BTreeMap<String, ProviderConfig> {
    Provider::ALL
        .iter()
        .map(|p| (p.key().to_string(), ProviderConfig::default()))
        .collect()
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            raw_database_schema: None,
            raw_database_schema_extracted_at: None,
            database_schema_options: None,
            formatted_database_schema: None,
            provider_selected: default_provider_selected(),
            model_selected: None,
            providers: default_providers(),
            popup_position: None,
        }
    }
}

impl LocalConfig {
    /// API key of the selected provider, when one is configured
    pub fn selected_api_key(&self) -> Option<&str> {
        self.providers
            .get(&self.provider_selected)
            .and_then(|p| p.api_key.as_deref())
            .filter(|key| !key.is_empty())
    }

    /// Formatted schema of one database
    pub fn formatted_database(&self, database_id: DatabaseId) -> Option<&FormattedDatabase> {
        self.formatted_database_schema
            .as_ref()
            .and_then(|schema| schema.get(&database_id))
    }
}

/// Single-provider document written by earlier releases
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyConfig {
    #[serde(default)]
    schema: Option<FormattedSchema>,
    #[serde(default)]
    schema_extracted_at: Option<String>,
    #[serde(default)]
    status: Option<ProviderStatus>,
    #[serde(default)]
    key: Option<String>,
    #[serde(default)]
    model_name: Option<String>,
    #[serde(default)]
    popup_position: Option<PopupPosition>,
}

impl From<LegacyConfig> for LocalConfig {
    fn from(legacy: LegacyConfig) -> Self {
        let mut config = LocalConfig {
            formatted_database_schema: legacy.schema,
            raw_database_schema_extracted_at: legacy.schema_extracted_at,
            model_selected: legacy.model_name,
            popup_position: legacy.popup_position,
            ..Default::default()
        };
        config.providers.insert(
            Provider::OpenAi.key().to_string(),
            ProviderConfig {
                api_key: legacy.key,
                status: legacy.status.unwrap_or_default(),
            },
        );
        config
    }
}

/// Read/write access to the persisted configuration
pub trait ConfigStore {
    /// Current configuration, defaults when nothing was saved yet
    fn load(&self) -> Result<LocalConfig>;

    /// Replace the whole configuration
    fn save(&self, config: &LocalConfig) -> Result<()>;

    /// Record the status of one provider's credential
    fn set_provider_status(&self, provider: &str, status: ProviderStatus) -> Result<()> {
        let mut config = self.load()?;
        config
            .providers
            .entry(provider.to_string())
            .or_default()
            .status = status;
        self.save(&config)
    }
}

/// Database connection wrapper
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open or create a store at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path.as_ref())
            .with_context(|| format!("Failed to open database at {:?}", path.as_ref()))?;

        let store = Self { conn };
        store.initialize()?;

        Ok(store)
    }

    /// Open an in-memory store (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;

        let store = Self { conn };
        store.initialize()?;

        Ok(store)
    }

    fn initialize(&self) -> Result<()> {
        self.conn
            .execute_batch(SCHEMA)
            .context("Failed to initialize database schema")?;
        Ok(())
    }

    /// Raw value stored under a key
    pub fn get(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row("SELECT value FROM config WHERE key = ?1", params![key], |row| {
                row.get(0)
            })
            .optional()
            .with_context(|| format!("Failed to read config key {}", key))?;
        Ok(value)
    }

    /// Store a raw value under a key
    pub fn put(&self, key: &str, value: &str) -> Result<()> {
        self.conn
            .execute(
                "INSERT OR REPLACE INTO config (key, value, updated_at) VALUES (?1, ?2, datetime('now'))",
                params![key, value],
            )
            .with_context(|| format!("Failed to write config key {}", key))?;
        Ok(())
    }

    /// Convert a legacy document, if any; the legacy entry is kept
    fn migrate_legacy(&self) -> Result<Option<LocalConfig>> {
        let Some(raw) = self.get(LEGACY_CONFIG_KEY)? else {
            return Ok(None);
        };
        let legacy: LegacyConfig =
            serde_json::from_str(&raw).context("Failed to parse legacy configuration")?;

        let config = LocalConfig::from(legacy);
        self.save(&config)?;
        info!("Migrated legacy configuration");

        Ok(Some(config))
    }
}

impl ConfigStore for Store {
    fn load(&self) -> Result<LocalConfig> {
        if let Some(raw) = self.get(LOCAL_CONFIG_KEY)? {
            return serde_json::from_str(&raw).context("Failed to parse stored configuration");
        }
        if let Some(config) = self.migrate_legacy()? {
            return Ok(config);
        }
        Ok(LocalConfig::default())
    }

    fn save(&self, config: &LocalConfig) -> Result<()> {
        let value = serde_json::to_string(config).context("Failed to serialize configuration")?;
        self.put(LOCAL_CONFIG_KEY, &value)?;
        debug!("Saved configuration ({} bytes)", value.len());
        Ok(())
    }
}
