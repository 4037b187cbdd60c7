//! schemapilot - Curated database schemas as LLM context
//!
//! This library extracts database metadata, keeps a token-budgeted
//! selection of tables that survives re-extraction, and streams answers
//! from several LLM providers through one interface.

pub mod cli;
pub mod config;
pub mod llm;
pub mod metabase;
pub mod pipeline;
pub mod schema;
pub mod storage;

#[cfg(test)]
mod test_support;

/// Re-export commonly used types
pub use llm::{CallOrchestrator, ChatRequest, ErrorKind, LlmError, ProviderDispatcher};
pub use pipeline::{refresh_schema, ExtractionLock};
pub use schema::{FormattedSchema, RawDatabase, SchemaOptionsRoot};
pub use storage::{ConfigStore, LocalConfig, Store};

/// Application-wide error type
pub use anyhow::Result;

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const APP_NAME: &str = "schemapilot";
