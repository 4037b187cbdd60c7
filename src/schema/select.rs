//! Default table selection for newly seen databases
//!
//! The selected model ranks schema namespaces by analytic relevance. The
//! ranking is then walked under the model's context window, and only the
//! admitted namespaces stay selected.

use super::{DatabaseId, DatabaseOptions, SchemaOptionsRoot};
use crate::llm::prompts::{strip_code_fences, SELECTION_SYSTEM_PROMPT};
use crate::llm::{lookup, ChatRequest, ProviderDispatcher};
use crate::storage::LocalConfig;
use anyhow::{bail, Context, Result};
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, info, warn};

/// Provider, model and credential used for ranking
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelTarget {
    pub provider: String,
    pub model: String,
    pub api_key: String,
}

impl ModelTarget {
    /// The selected provider and model, when both are usable
    pub fn from_config(config: &LocalConfig) -> Option<Self> {
        let api_key = config.selected_api_key()?;
        let model = config.model_selected.as_deref().filter(|m| !m.is_empty())?;
        Some(Self {
            provider: config.provider_selected.clone(),
            model: model.to_string(),
            api_key: api_key.to_string(),
        })
    }
}

/// Walk `ranked` namespaces and admit them while they fit `context_window`
///
/// The first namespace is always admitted. The walk stops at the first
/// namespace that does not fit.
pub fn admit_namespaces(
    ranked: &[String],
    tokens: &BTreeMap<String, usize>,
    context_window: u64,
) -> Vec<String> {
    let mut admitted: Vec<String> = Vec::new();
    let mut total: u64 = 0;

    for namespace in ranked {
        let cost = tokens.get(namespace).copied().unwrap_or(0) as u64;
        if !admitted.is_empty() && total + cost > context_window {
            debug!(
                "Namespace {} rejected: {} + {} tokens exceeds {}",
                namespace, total, cost, context_window
            );
            break;
        }
        admitted.push(namespace.clone());
        total += cost;
    }

    admitted
}

/// Replace the all-selected defaults of every database in `options`
///
/// A database whose ranking fails keeps every table selected. Returns the
/// number of databases whose selection was changed.
pub async fn select_default_tables(
    options: &mut SchemaOptionsRoot,
    dispatcher: &ProviderDispatcher,
    target: &ModelTarget,
) -> usize {
    let context_window = match lookup(&target.provider, &target.model) {
        Ok((_, model)) => model.context_window,
        Err(e) => {
            warn!("Skipping default selection: {}", e);
            return 0;
        }
    };

    let mut curated = 0;
    for (id, database) in options.iter_mut() {
        match rank_namespaces(dispatcher, target, database).await {
            Ok(ranked) => {
                let admitted = admit_namespaces(&ranked, &namespace_tokens(database), context_window);
                apply_selection(database, &admitted);
                info!("Database {}: selected schemas {:?}", id, admitted);
                curated += 1;
            }
            Err(e) => warn!(
                "Default selection failed for database {}, keeping all tables: {:#}",
                id, e
            ),
        }
    }

    curated
}

/// Table names grouped by namespace, without duplicates
fn namespace_listing(database: &DatabaseOptions) -> BTreeMap<&str, Vec<&str>> {
    let mut listing: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for table in &database.tables {
        let names = listing.entry(table.schema.as_str()).or_default();
        if !names.contains(&table.name.as_str()) {
            names.push(table.name.as_str());
        }
    }
    listing
}

fn namespace_tokens(database: &DatabaseOptions) -> BTreeMap<String, usize> {
    let mut tokens: BTreeMap<String, usize> = BTreeMap::new();
    for table in &database.tables {
        *tokens.entry(table.schema.clone()).or_default() += table.number_tokens;
    }
    tokens
}

/// Ask the model for namespaces, most relevant first
async fn rank_namespaces(
    dispatcher: &ProviderDispatcher,
    target: &ModelTarget,
    database: &DatabaseOptions,
) -> Result<Vec<String>> {
    let listing = namespace_listing(database);
    let message = serde_json::to_string(&listing).context("Failed to serialize schema listing")?;

    let request = ChatRequest::new(&target.provider, &target.model, &target.api_key)
        .system(SELECTION_SYSTEM_PROMPT)
        .message(message);
    let reply = dispatcher.generate_response(&request).await?;

    let ranked: Vec<String> = serde_json::from_str(&strip_code_fences(&reply))
        .with_context(|| format!("Failed to parse schema ranking: {}", reply))?;

    let mut seen = HashSet::new();
    let known: Vec<String> = ranked
        .into_iter()
        .filter(|name| listing.contains_key(name.as_str()) && seen.insert(name.clone()))
        .collect();

    if known.is_empty() {
        bail!("Schema ranking named no known schema: {}", reply);
    }
    Ok(known)
}

fn apply_selection(database: &mut DatabaseOptions, admitted: &[String]) {
    for table in &mut database.tables {
        table.selected = admitted.contains(&table.schema);
    }
}

/// Databases of `fresh` that have no persisted options yet
pub fn unseen_databases(fresh: &SchemaOptionsRoot, persisted: Option<&SchemaOptionsRoot>) -> Vec<DatabaseId> {
    fresh
        .keys()
        .filter(|id| persisted.map_or(true, |p| !p.contains_key(id)))
        .copied()
        .collect()
}
