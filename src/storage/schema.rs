//! Database schema definition

/// SQL schema for the local store
pub const SCHEMA: &str = r#"
-- Configuration key-value store; values are JSON documents
CREATE TABLE IF NOT EXISTS config (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
"#;

/// Key of the current configuration document
pub const LOCAL_CONFIG_KEY: &str = "local_config";

/// Key of the single-provider document written by earlier releases
pub const LEGACY_CONFIG_KEY: &str = "local_config_legacy";
