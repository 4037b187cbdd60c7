//! Extraction pipeline
//!
//! Normalizes a freshly extracted raw schema, initializes selections of
//! databases seen for the first time, reconciles the rest with persisted
//! selections, and stores the result with its formatted text.

use crate::llm::ProviderDispatcher;
use crate::schema::{
    format_schema, merge_options, normalize, select_default_tables, selected_tokens,
    unseen_databases, DatabaseId, ModelTarget, RawDatabase, SchemaOptionsRoot,
};
use crate::storage::ConfigStore;
use anyhow::{anyhow, bail, Context, Result};
use std::fmt;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

/// Single-flight guard for extractions, owned by the caller
#[derive(Debug, Default)]
pub struct ExtractionLock {
    inner: Mutex<()>,
}

impl ExtractionLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the lock without waiting
    pub fn try_acquire(&self) -> Result<MutexGuard<'_, ()>> {
        self.inner
            .try_lock()
            .map_err(|_| anyhow!("extraction already in progress"))
    }
}

/// Outcome of one database after an extraction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseSummary {
    pub id: DatabaseId,
    pub name: String,
    pub tables: usize,
    pub selected_tables: usize,
    pub selected_tokens: usize,
}

/// Outcome of an extraction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionSummary {
    pub extracted_at: String,
    pub databases: Vec<DatabaseSummary>,
}

impl ExtractionSummary {
    fn from_options(options: &SchemaOptionsRoot, extracted_at: String) -> Self {
        let databases = options
            .iter()
            .map(|(id, database)| DatabaseSummary {
                id: *id,
                name: database.name.clone(),
                tables: database.tables.len(),
                selected_tables: database.tables.iter().filter(|t| t.selected).count(),
                selected_tokens: selected_tokens(database),
            })
            .collect();
        Self {
            extracted_at,
            databases,
        }
    }
}

impl fmt::Display for ExtractionSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Schema extracted on {}", self.extracted_at)?;
        for db in &self.databases {
            writeln!(
                f,
                "  [{}] {}: {}/{} tables selected, {} tokens",
                db.id, db.name, db.selected_tables, db.tables, db.selected_tokens
            )?;
        }
        Ok(())
    }
}

/// Run one extraction over `raw` and persist the result
///
/// Fails immediately when another extraction holds `lock`.
pub async fn refresh_schema<S: ConfigStore>(
    raw: Vec<RawDatabase>,
    store: &S,
    dispatcher: &ProviderDispatcher,
    lock: &ExtractionLock,
) -> Result<ExtractionSummary> {
    let _guard = lock.try_acquire()?;

    let mut config = store.load()?;
    let mut fresh = normalize(&raw).context("Failed to normalize raw schema")?;

    let unseen = unseen_databases(&fresh, config.database_schema_options.as_ref());
    if !unseen.is_empty() {
        match ModelTarget::from_config(&config) {
            Some(target) => {
                let mut first_seen: SchemaOptionsRoot = unseen
                    .iter()
                    .filter_map(|id| fresh.remove_entry(id))
                    .collect();
                select_default_tables(&mut first_seen, dispatcher, &target).await;
                fresh.extend(first_seen);
            }
            None => info!(
                "No API key or model configured; {} new database(s) keep every table selected",
                unseen.len()
            ),
        }
    }

    let options = match config.database_schema_options.take() {
        Some(persisted) => merge_options(persisted, fresh),
        None => fresh,
    };

    let extracted_at = chrono::Local::now().format("%Y-%m-%d").to_string();
    let summary = ExtractionSummary::from_options(&options, extracted_at.clone());

    config.formatted_database_schema = Some(format_schema(&options));
    config.database_schema_options = Some(options);
    config.raw_database_schema = Some(raw);
    config.raw_database_schema_extracted_at = Some(extracted_at);
    store.save(&config)?;

    debug!("Stored schema of {} database(s)", summary.databases.len());
    Ok(summary)
}

/// Select or deselect one `schema.table` and regenerate the formatted schema
pub fn set_table_selection<S: ConfigStore>(
    store: &S,
    database_id: DatabaseId,
    qualified_table: &str,
    selected: bool,
) -> Result<()> {
    let mut config = store.load()?;
    let Some(options) = config.database_schema_options.as_mut() else {
        bail!("No schema extracted yet. Run 'schemapilot extract' first.");
    };

    let database = options
        .get_mut(&database_id)
        .ok_or_else(|| anyhow!("Unknown database: {}", database_id))?;
    let table = database
        .tables
        .iter_mut()
        .find(|t| t.qualified_name() == qualified_table)
        .ok_or_else(|| anyhow!("Unknown table {} in database {}", qualified_table, database_id))?;
    table.selected = selected;

    config.formatted_database_schema = Some(format_schema(options));
    store.save(&config)?;

    info!(
        "{} {} in database {}",
        if selected { "Selected" } else { "Deselected" },
        qualified_table,
        database_id
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::testing::ScriptedBackend;
    use crate::llm::Provider;
    use crate::schema::fixtures;
    use crate::storage::Store;
    use std::sync::Arc;

    fn dispatcher(backend: &ScriptedBackend) -> ProviderDispatcher {
        ProviderDispatcher::new().with_backend(Provider::OpenAi, Arc::new(backend.clone()))
    }

    fn store_with_model() -> Store {
        let store = Store::open_in_memory().unwrap();
        let mut config = store.load().unwrap();
        config.model_selected = Some("gpt-4o".to_string());
        config.providers.get_mut("openai").unwrap().api_key = Some("sk".to_string());
        store.save(&config).unwrap();
        store
    }

    fn formatted(store: &Store, id: DatabaseId) -> String {
        store.load().unwrap().formatted_database(id).unwrap().tables.clone()
    }

    #[tokio::test]
    async fn test_first_extraction_without_model_selects_all() {
        let store = Store::open_in_memory().unwrap();
        let backend = ScriptedBackend::new();

        let summary = refresh_schema(
            vec![fixtures::shop_database()],
            &store,
            &dispatcher(&backend),
            &ExtractionLock::new(),
        )
        .await
        .unwrap();

        assert!(backend.recorded().is_empty());
        assert_eq!(summary.databases[0].selected_tables, 3);
        assert_eq!(summary.extracted_at.len(), 10);

        let config = store.load().unwrap();
        assert_eq!(config.raw_database_schema.unwrap().len(), 1);
        assert!(formatted(&store, 7).contains("staging.raw_events"));
    }

    #[tokio::test]
    async fn test_first_extraction_runs_selector() {
        let store = store_with_model();
        let backend = ScriptedBackend::new().then_reply("[\"public\"]");

        let summary = refresh_schema(
            vec![fixtures::shop_database()],
            &store,
            &dispatcher(&backend),
            &ExtractionLock::new(),
        )
        .await
        .unwrap();

        assert_eq!(backend.recorded().len(), 1);
        assert_eq!(summary.databases[0].selected_tables, 2);
        let text = formatted(&store, 7);
        assert!(text.starts_with("public.users:"));
        assert!(!text.contains("raw_events"));
    }

    #[tokio::test]
    async fn test_reextraction_keeps_manual_choices() {
        let store = store_with_model();
        let backend = ScriptedBackend::new().then_reply("[\"public\", \"staging\"]");
        let dispatcher = dispatcher(&backend);
        let lock = ExtractionLock::new();

        refresh_schema(vec![fixtures::shop_database()], &store, &dispatcher, &lock)
            .await
            .unwrap();
        set_table_selection(&store, 7, "public.orders", false).unwrap();

        let summary = refresh_schema(vec![fixtures::shop_database()], &store, &dispatcher, &lock)
            .await
            .unwrap();

        // The selector only runs for databases seen for the first time
        assert_eq!(backend.recorded().len(), 1);
        assert_eq!(summary.databases[0].selected_tables, 2);
        assert!(!formatted(&store, 7).contains("public.orders"));
    }

    #[tokio::test]
    async fn test_new_database_goes_through_selector() {
        let store = store_with_model();
        let backend = ScriptedBackend::new()
            .then_reply("[\"public\"]")
            .then_reply("[\"staging\"]");
        let dispatcher = dispatcher(&backend);
        let lock = ExtractionLock::new();

        refresh_schema(vec![fixtures::shop_database()], &store, &dispatcher, &lock)
            .await
            .unwrap();

        let mut second = fixtures::shop_database();
        second.id = 8;
        refresh_schema(vec![fixtures::shop_database(), second], &store, &dispatcher, &lock)
            .await
            .unwrap();

        assert_eq!(backend.recorded().len(), 2);
        assert!(formatted(&store, 7).contains("public.users"));
        let added = formatted(&store, 8);
        assert!(added.starts_with("staging.raw_events:"));
        assert!(!added.contains("public.users"));
    }

    #[tokio::test]
    async fn test_dropped_database_removed() {
        let store = Store::open_in_memory().unwrap();
        let backend = ScriptedBackend::new();
        let dispatcher = dispatcher(&backend);
        let lock = ExtractionLock::new();

        refresh_schema(vec![fixtures::shop_database()], &store, &dispatcher, &lock)
            .await
            .unwrap();
        let summary = refresh_schema(Vec::new(), &store, &dispatcher, &lock).await.unwrap();

        assert!(summary.databases.is_empty());
        assert!(store.load().unwrap().formatted_database(7).is_none());
    }

    #[tokio::test]
    async fn test_concurrent_extraction_rejected() {
        let store = Store::open_in_memory().unwrap();
        let lock = ExtractionLock::new();
        let _held = lock.try_acquire().unwrap();

        let err = refresh_schema(
            vec![fixtures::shop_database()],
            &store,
            &ProviderDispatcher::new(),
            &lock,
        )
        .await
        .unwrap_err();

        assert_eq!(err.to_string(), "extraction already in progress");
        assert!(store.load().unwrap().database_schema_options.is_none());
    }

    #[test]
    fn test_set_table_selection_errors() {
        let store = Store::open_in_memory().unwrap();
        assert!(set_table_selection(&store, 7, "public.users", false).is_err());
    }

    #[tokio::test]
    async fn test_set_table_selection_unknown_table() {
        let store = Store::open_in_memory().unwrap();
        refresh_schema(
            vec![fixtures::shop_database()],
            &store,
            &ProviderDispatcher::new(),
            &ExtractionLock::new(),
        )
        .await
        .unwrap();

        let err = set_table_selection(&store, 7, "public.ghost", true).unwrap_err();
        assert!(err.to_string().contains("public.ghost"));
        assert!(set_table_selection(&store, 99, "public.users", true).is_err());

        set_table_selection(&store, 7, "staging.raw_events", false).unwrap();
        assert!(!formatted(&store, 7).contains("raw_events"));
    }

    #[test]
    fn test_summary_display() {
        let summary = ExtractionSummary {
            extracted_at: "2024-05-01".to_string(),
            databases: vec![DatabaseSummary {
                id: 7,
                name: "Shop".to_string(),
                tables: 3,
                selected_tables: 2,
                selected_tokens: 120,
            }],
        };
        let text = summary.to_string();
        assert!(text.contains("2024-05-01"));
        assert!(text.contains("[7] Shop: 2/3 tables selected, 120 tokens"));
    }
}
