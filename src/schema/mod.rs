//! Database schema model and curation
//!
//! This module handles:
//! - Normalizing raw metadata into token-counted table options
//! - Reconciling fresh options with persisted user selections
//! - Choosing default selections under a token budget
//! - Formatting the selected tables into prompt text

pub mod format;
pub mod merge;
pub mod normalize;
pub mod select;
pub mod tokens;

pub use format::format_schema;
pub use merge::merge_options;
pub use normalize::normalize;
pub use select::{admit_namespaces, select_default_tables, unseen_databases, ModelTarget};
pub use tokens::count_tokens;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Identifier of a database in the metadata source
pub type DatabaseId = u64;

/// Schema namespace that is never auto-selected when a table appears in it
pub const NEW_SCHEMA_SENTINEL: &str = "newSchema";

/// A database as delivered by the metadata collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawDatabase {
    pub id: DatabaseId,
    pub name: String,
    pub engine: String,
    #[serde(default)]
    pub tables: Vec<RawTable>,
}

/// A table with its visible columns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawTable {
    pub id: u64,
    pub name: String,
    pub schema: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub fields: Vec<RawColumn>,
}

/// A column; `target_table_id`/`target_column_id` encode a foreign key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawColumn {
    pub id: u64,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub database_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_table_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_column_id: Option<u64>,
}

/// Selection state for every database, keyed by database id
pub type SchemaOptionsRoot = BTreeMap<DatabaseId, DatabaseOptions>;

/// Per-database table options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseOptions {
    pub engine: String,
    pub name: String,
    pub tables: Vec<TableOption>,
}

/// A table as presented for selection
///
/// `number_tokens` and `formatted_description` are derived from the other
/// fields and are recomputed on every normalization. `selected` is the only
/// field carried across merges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableOption {
    pub id: u64,
    pub name: String,
    pub schema: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub selected: bool,
    pub number_tokens: usize,
    pub formatted_description: String,
    pub fields: Vec<ColumnOption>,
}

impl TableOption {
    /// Qualified `schema.table` name, used as the table's identity
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.schema, self.name)
    }
}

/// A column of a [`TableOption`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnOption {
    pub id: u64,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub database_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_table_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_column_id: Option<u64>,
    /// Resolved `schema.table.column` of the foreign key target
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_formatted_name: Option<String>,
}

/// Prompt-ready schema text, keyed by database id
pub type FormattedSchema = BTreeMap<DatabaseId, FormattedDatabase>;

/// The selected tables of one database, serialized for a prompt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormattedDatabase {
    pub engine: String,
    pub tables: String,
}

/// Total tokens of the selected tables of a database
pub fn selected_tokens(database: &DatabaseOptions) -> usize {
    database
        .tables
        .iter()
        .filter(|t| t.selected)
        .map(|t| t.number_tokens)
        .sum()
}
