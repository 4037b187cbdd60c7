//! Metabase metadata extraction
//!
//! Reads every database and the visible columns of its active tables
//! through the Metabase REST API, producing the raw schema the normalizer
//! consumes.

use crate::config::MetabaseSettings;
use crate::schema::{DatabaseId, RawColumn, RawDatabase, RawTable};
use anyhow::{bail, Context, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Column visibilities that never reach a prompt
const HIDDEN_VISIBILITIES: [&str; 3] = ["hidden", "retired", "sensitive"];

const SAVED_QUESTIONS: &str = "Saved Questions";

#[derive(Debug, Clone)]
enum Auth {
    Anonymous,
    Session(String),
    ApiKey(String),
}

/// Client for the Metabase metadata endpoints
#[derive(Debug, Clone)]
pub struct MetabaseClient {
    client: reqwest::Client,
    base_url: String,
    auth: Auth,
}

/// Some endpoints wrap their list in `{"data": [...]}`
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Listing<T> {
    Bare(Vec<T>),
    Wrapped { data: Vec<T> },
}

impl<T> Listing<T> {
    fn into_vec(self) -> Vec<T> {
        match self {
            Listing::Bare(items) => items,
            Listing::Wrapped { data } => data,
        }
    }
}

#[derive(Debug, Deserialize)]
struct DatabaseResponse {
    /// The saved-questions virtual database has a negative id
    id: i64,
    name: String,
    engine: String,
    #[serde(default)]
    is_saved_questions: bool,
    #[serde(default)]
    tables: Vec<TableRef>,
}

#[derive(Debug, Deserialize)]
struct TableRef {
    id: u64,
    #[serde(default)]
    active: bool,
}

#[derive(Debug, Deserialize)]
struct TableResponse {
    id: u64,
    name: String,
    #[serde(default)]
    schema: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    fields: Vec<ColumnResponse>,
}

#[derive(Debug, Deserialize)]
struct ColumnResponse {
    id: u64,
    name: String,
    #[serde(default)]
    active: bool,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    database_type: String,
    #[serde(default)]
    visibility_type: Option<String>,
    #[serde(default)]
    target: Option<ColumnTarget>,
}

#[derive(Debug, Deserialize)]
struct ColumnTarget {
    id: u64,
    table_id: u64,
}

impl MetabaseClient {
    /// Unauthenticated client for `base_url`
    pub fn new(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            auth: Auth::Anonymous,
        }
    }

    pub fn with_session_token(mut self, token: &str) -> Self {
        self.auth = Auth::Session(token.to_string());
        self
    }

    pub fn with_api_key(mut self, key: &str) -> Self {
        self.auth = Auth::ApiKey(key.to_string());
        self
    }

    /// Build a client from the settings file; an API key wins over a session
    pub fn from_settings(settings: &MetabaseSettings, timeout: Duration) -> Result<Self> {
        let Some(ref url) = settings.url else {
            bail!("No Metabase URL configured. Set metabase.url in the config file or use --file.");
        };

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        let mut metabase = Self::new(client, url);
        if let Some(ref token) = settings.session_token {
            metabase = metabase.with_session_token(token);
        }
        if let Some(ref key) = settings.api_key {
            metabase = metabase.with_api_key(key);
        }
        Ok(metabase)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        debug!("GET {}", url);

        let request = match &self.auth {
            Auth::Anonymous => self.client.get(&url),
            Auth::Session(token) => self.client.get(&url).header("X-Metabase-Session", token),
            Auth::ApiKey(key) => self.client.get(&url).header("x-api-key", key),
        };

        let response = request
            .send()
            .await
            .with_context(|| format!("Failed to send request to {}", url))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            bail!("Metabase request {} failed ({}): {}", path, status, body);
        }

        response
            .json()
            .await
            .with_context(|| format!("Failed to parse response from {}", path))
    }

    /// Fetch the raw schema of every database
    ///
    /// A table whose metadata cannot be fetched is skipped; failing to list
    /// the databases is an error.
    pub async fn fetch_raw_schema(&self) -> Result<Vec<RawDatabase>> {
        let databases: Listing<DatabaseResponse> = self
            .get_json("/api/database?include=tables")
            .await
            .context("Failed to list databases")?;

        let mut raw = Vec::new();
        for database in databases.into_vec() {
            if database.is_saved_questions || database.name == SAVED_QUESTIONS {
                continue;
            }
            let Ok(id) = DatabaseId::try_from(database.id) else {
                warn!("Skipping database {} with id {}", database.name, database.id);
                continue;
            };

            let mut tables = Vec::new();
            for table in database.tables.iter().filter(|t| t.active) {
                match self
                    .get_json::<TableResponse>(&format!("/api/table/{}/query_metadata", table.id))
                    .await
                {
                    Ok(response) => tables.push(convert_table(response)),
                    Err(e) => warn!("Skipping table {}: {:#}", table.id, e),
                }
            }

            info!("Database {} ({}): {} tables", database.name, database.engine, tables.len());
            raw.push(RawDatabase {
                id,
                name: database.name,
                engine: database.engine,
                tables,
            });
        }

        Ok(raw)
    }
}

fn is_visible(column: &ColumnResponse) -> bool {
    column.active
        && !column
            .visibility_type
            .as_deref()
            .is_some_and(|v| HIDDEN_VISIBILITIES.contains(&v))
}

fn convert_table(table: TableResponse) -> RawTable {
    RawTable {
        id: table.id,
        name: table.name,
        schema: table.schema.unwrap_or_default(),
        description: table.description,
        fields: table
            .fields
            .into_iter()
            .filter(is_visible)
            .map(|column| RawColumn {
                id: column.id,
                name: column.name,
                description: column.description,
                database_type: column.database_type,
                target_table_id: column.target.as_ref().map(|t| t.table_id),
                target_column_id: column.target.as_ref().map(|t| t.id),
            })
            .collect(),
    }
}
