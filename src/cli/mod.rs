//! CLI interface using clap
//!
//! Provides the command-line interface for schemapilot

mod commands;

pub use commands::*;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// schemapilot - Curated database schemas as LLM context
#[derive(Parser, Debug)]
#[command(name = "schemapilot")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the settings file
    #[arg(short, long, global = true, env = "SCHEMAPILOT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Extract database metadata and refresh table selections
    Extract(ExtractArgs),

    /// Inspect or edit the curated schema
    Schema(SchemaArgs),

    /// Configure LLM providers
    Provider(ProviderArgs),

    /// List supported providers and models
    Models,

    /// Ask the selected model about a database
    Ask(AskArgs),
}

/// Arguments for extract command
#[derive(Parser, Debug)]
pub struct ExtractArgs {
    /// Read the raw schema from a JSON file instead of Metabase
    #[arg(short, long)]
    pub file: Option<PathBuf>,
}

/// Arguments for schema command
#[derive(Parser, Debug)]
pub struct SchemaArgs {
    #[command(subcommand)]
    pub action: SchemaAction,
}

#[derive(Subcommand, Debug)]
pub enum SchemaAction {
    /// Print the formatted schema
    Show(ShowArgs),

    /// Include a table in the formatted schema
    Select(SelectionArgs),

    /// Exclude a table from the formatted schema
    Deselect(SelectionArgs),
}

/// Arguments for schema show
#[derive(Parser, Debug)]
pub struct ShowArgs {
    /// Only this database
    #[arg(short, long)]
    pub database: Option<u64>,

    /// List table options with selection flags and token counts
    #[arg(long)]
    pub options: bool,
}

/// Arguments for schema select/deselect
#[derive(Parser, Debug)]
pub struct SelectionArgs {
    /// Database id
    pub database: u64,

    /// Qualified table name (schema.table)
    pub table: String,
}

/// Arguments for provider command
#[derive(Parser, Debug)]
pub struct ProviderArgs {
    #[command(subcommand)]
    pub action: ProviderAction,
}

#[derive(Subcommand, Debug)]
pub enum ProviderAction {
    /// Store and verify a provider credential
    Set(ProviderSetArgs),

    /// Select the provider and model used for calls
    Use(ProviderUseArgs),
}

/// Arguments for provider set
#[derive(Parser, Debug)]
pub struct ProviderSetArgs {
    /// Provider key (openai, anthropic, gemini)
    pub provider: String,

    /// Model key used to verify the credential
    #[arg(short, long)]
    pub model: String,

    /// API key; the stored key is verified again when omitted
    #[arg(short = 'k', long, env = "SCHEMAPILOT_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,
}

/// Arguments for provider use
#[derive(Parser, Debug)]
pub struct ProviderUseArgs {
    /// Provider key (openai, anthropic, gemini)
    pub provider: String,

    /// Model key
    #[arg(short, long)]
    pub model: String,
}

/// What to ask for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum AskMode {
    /// Write a query from a request
    #[default]
    Query,
    /// Explain a database error
    Explain,
    /// Fix a query that raised an error
    Fix,
}

/// Arguments for ask command
#[derive(Parser, Debug)]
pub struct AskArgs {
    /// Database id whose schema is sent as context
    #[arg(short, long)]
    pub database: u64,

    /// Operation to run
    #[arg(short, long, value_enum, default_value_t = AskMode::Query)]
    pub mode: AskMode,

    /// Current query (required for explain and fix)
    #[arg(short, long)]
    pub query: Option<String>,

    /// Error returned by the database (required for explain and fix)
    #[arg(short, long)]
    pub error: Option<String>,

    /// Request in natural language (required for query)
    pub prompt: Option<String>,
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
