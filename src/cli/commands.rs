//! Command implementations

use super::{AskArgs, AskMode};
use crate::config::Settings;
use crate::llm::models::PROVIDERS;
use crate::llm::prompts::{explain_error_prompt, fix_error_prompt, query_prompt};
use crate::llm::{lookup, CallOrchestrator, ErrorKind, ProviderDispatcher};
use crate::metabase::MetabaseClient;
use crate::pipeline::{self, ExtractionLock, ExtractionSummary};
use crate::schema::{DatabaseId, RawDatabase};
use crate::storage::{ConfigStore, ProviderStatus, Store};
use anyhow::{anyhow, bail, Context, Result};
use std::io::Write;
use std::path::Path;
use tracing::debug;

/// Settings and store shared by every command
pub struct App {
    pub settings: Settings,
    pub store: Store,
    /// Held for the whole of an extraction
    pub extraction_lock: ExtractionLock,
}

impl App {
    /// Load settings from `config_path` (or the default location) and open the store
    pub fn open(config_path: Option<&Path>) -> Result<Self> {
        let config_path = match config_path {
            Some(path) => path.to_path_buf(),
            None => Settings::default_path()?,
        };
        let settings = Settings::load_or_default(&config_path)?;

        let store_path = settings.store_path()?;
        if let Some(parent) = store_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {:?}", parent))?;
        }
        debug!("Using store at {:?}", store_path);
        let store = Store::open(&store_path)?;

        Ok(Self {
            settings,
            store,
            extraction_lock: ExtractionLock::new(),
        })
    }

    /// Dispatcher whose connections honour the configured timeout
    pub fn dispatcher(&self) -> Result<ProviderDispatcher> {
        let client = reqwest::Client::builder()
            .connect_timeout(self.settings.request_timeout())
            .build()
            .context("Failed to build HTTP client")?;
        Ok(ProviderDispatcher::with_client(client))
    }
}

/// Extract the raw schema and refresh selections
pub async fn extract(app: &App, file: Option<&Path>) -> Result<ExtractionSummary> {
    let raw: Vec<RawDatabase> = match file {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read raw schema file: {:?}", path))?;
            serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse raw schema file: {:?}", path))?
        }
        None => {
            MetabaseClient::from_settings(&app.settings.metabase, app.settings.request_timeout())?
                .fetch_raw_schema()
                .await?
        }
    };

    println!("Extracting {} database(s)...", raw.len());
    pipeline::refresh_schema(raw, &app.store, &app.dispatcher()?, &app.extraction_lock).await
}

/// Print the formatted schema, or the table options
pub fn show_schema(store: &impl ConfigStore, database: Option<DatabaseId>, options: bool) -> Result<()> {
    let config = store.load()?;
    let Some(ref all_options) = config.database_schema_options else {
        println!("No schema extracted yet. Run 'schemapilot extract' first.");
        return Ok(());
    };

    if let Some(id) = database {
        if !all_options.contains_key(&id) {
            bail!("Unknown database: {}", id);
        }
    }
    let wanted = |id: &DatabaseId| database.map_or(true, |d| d == *id);

    if options {
        for (id, db) in all_options.iter().filter(|(id, _)| wanted(*id)) {
            println!("[{}] {} ({})", id, db.name, db.engine);
            for table in &db.tables {
                println!(
                    "  [{}] {} ({} tokens)",
                    if table.selected { "x" } else { " " },
                    table.qualified_name(),
                    table.number_tokens
                );
            }
        }
        return Ok(());
    }

    if let Some(ref formatted) = config.formatted_database_schema {
        for (id, db) in formatted.iter().filter(|(id, _)| wanted(*id)) {
            println!("-- database {} ({})", id, db.engine);
            print!("{}", db.tables);
        }
    }
    Ok(())
}

/// Select or deselect one table
pub fn set_selection(store: &impl ConfigStore, database: DatabaseId, table: &str, selected: bool) -> Result<()> {
    pipeline::set_table_selection(store, database, table, selected)?;
    println!(
        "✓ {} {}",
        if selected { "Selected" } else { "Deselected" },
        table
    );
    Ok(())
}

/// Verify and store a provider credential, selecting the provider and model
pub async fn set_provider(
    store: &impl ConfigStore,
    dispatcher: &ProviderDispatcher,
    provider: &str,
    model: &str,
    api_key: Option<&str>,
) -> Result<ProviderStatus> {
    lookup(provider, model)?;

    let mut config = store.load()?;
    let api_key = match api_key {
        Some(key) => key.to_string(),
        None => config
            .providers
            .get(provider)
            .and_then(|p| p.api_key.clone())
            .filter(|key| !key.is_empty())
            .ok_or_else(|| anyhow!("No API key stored for {}. Pass one with --api-key.", provider))?,
    };

    println!("Testing connection to {} with {}...", provider, model);
    let status = match dispatcher.test_connection(provider, model, &api_key).await {
        Ok(()) => {
            println!("✓ Credential is valid");
            ProviderStatus::Valid
        }
        Err(e) if e.kind == ErrorKind::Invalid => {
            eprintln!("✗ Credential rejected: {}", e);
            ProviderStatus::Invalid
        }
        Err(e) => {
            eprintln!("✗ Connection failed ({}): {}", e.kind, e);
            ProviderStatus::Error
        }
    };

    let entry = config.providers.entry(provider.to_string()).or_default();
    entry.api_key = Some(api_key);
    entry.status = status;
    config.provider_selected = provider.to_string();
    config.model_selected = Some(model.to_string());
    store.save(&config)?;

    Ok(status)
}

/// Select the provider and model used for calls
pub fn use_provider(store: &impl ConfigStore, provider: &str, model: &str) -> Result<()> {
    let (_, spec) = lookup(provider, model)?;

    let mut config = store.load()?;
    config.provider_selected = provider.to_string();
    config.model_selected = Some(model.to_string());
    let has_key = config.selected_api_key().is_some();
    store.save(&config)?;

    println!("✓ Using {} ({})", spec.display_name, provider);
    if !has_key {
        println!("  No API key stored yet. Run 'schemapilot provider set {} --model {} --api-key <KEY>'.", provider, model);
    }
    Ok(())
}

/// Print the model registry, marking the selected model
pub fn list_models(store: &impl ConfigStore) -> Result<()> {
    let config = store.load()?;

    for entry in PROVIDERS {
        let key = entry.provider.key();
        let status = config
            .providers
            .get(key)
            .map(|p| p.status)
            .unwrap_or_default();
        println!("{} ({}) [{}]", entry.display_name, key, status);

        for model in entry.models {
            let current = config.provider_selected == key
                && config.model_selected.as_deref() == Some(model.key);
            println!(
                "  {} {:<20} {:<22} {:>9} tokens{}",
                if current { "*" } else { " " },
                model.key,
                model.display_name,
                model.context_window,
                if model.is_thinking_model { "  (thinking)" } else { "" }
            );
        }
    }
    Ok(())
}

/// Stream an answer about one database to stdout
pub async fn ask(store: &impl ConfigStore, dispatcher: &ProviderDispatcher, args: &AskArgs) -> Result<()> {
    ask_into(store, dispatcher, args, std::io::stdout()).await
}

/// Stream an answer into `out`
///
/// Output stops at the first write failure, which is returned once the
/// call has finished.
pub async fn ask_into(
    store: &impl ConfigStore,
    dispatcher: &ProviderDispatcher,
    args: &AskArgs,
    mut out: impl Write,
) -> Result<()> {
    let config = store.load()?;
    let database = config
        .formatted_database(args.database)
        .ok_or_else(|| anyhow!("No schema for database {}. Run 'schemapilot extract' first.", args.database))?;

    let (system, messages) = match args.mode {
        AskMode::Query => {
            let prompt = args.prompt.as_deref().context("A request is required in query mode")?;
            query_prompt(database, prompt, args.query.as_deref())
        }
        AskMode::Explain | AskMode::Fix => {
            let query = args.query.as_deref().context("--query is required")?;
            let error = args.error.as_deref().context("--error is required")?;
            if args.mode == AskMode::Explain {
                explain_error_prompt(database, query, error)
            } else {
                fix_error_prompt(database, query, error)
            }
        }
    };

    let mut write_error: Option<std::io::Error> = None;
    let mut failure: Option<String> = None;

    CallOrchestrator::new(dispatcher, store)
        .run(
            &config,
            &system,
            messages,
            |text, done| {
                if write_error.is_some() {
                    return;
                }
                let written = out
                    .write_all(text.as_bytes())
                    .and_then(|()| if done { out.write_all(b"\n") } else { Ok(()) })
                    .and_then(|()| out.flush());
                if let Err(e) = written {
                    write_error = Some(e);
                }
            },
            |message| failure = Some(message.to_string()),
        )
        .await;

    if let Some(message) = failure {
        return Err(anyhow!(message));
    }
    match write_error {
        Some(e) => Err(e).context("Failed to write the answer"),
        None => Ok(()),
    }
}
