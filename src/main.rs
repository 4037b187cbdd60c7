//! schemapilot - Curated database schemas as LLM context
//!
//! Extracts database metadata, keeps a token-budgeted selection of tables,
//! and streams answers from OpenAI, Anthropic or Gemini.

use anyhow::Result;
use schemapilot::cli::{
    ask, extract, list_models, set_provider, set_selection, show_schema, use_provider, App, Cli,
    Commands, ProviderAction, SchemaAction,
};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse_args();

    // Setup logging; stdout is reserved for command output
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    });

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let app = App::open(cli.config.as_deref())?;

    // Execute command
    match cli.command {
        Commands::Extract(args) => {
            let summary = extract(&app, args.file.as_deref()).await?;
            print!("{}", summary);
        }

        Commands::Schema(args) => match args.action {
            SchemaAction::Show(show) => show_schema(&app.store, show.database, show.options)?,
            SchemaAction::Select(sel) => set_selection(&app.store, sel.database, &sel.table, true)?,
            SchemaAction::Deselect(sel) => set_selection(&app.store, sel.database, &sel.table, false)?,
        },

        Commands::Provider(args) => match args.action {
            ProviderAction::Set(set) => {
                set_provider(
                    &app.store,
                    &app.dispatcher()?,
                    &set.provider,
                    &set.model,
                    set.api_key.as_deref(),
                )
                .await?;
            }
            ProviderAction::Use(choice) => use_provider(&app.store, &choice.provider, &choice.model)?,
        },

        Commands::Models => list_models(&app.store)?,

        Commands::Ask(args) => ask(&app.store, &app.dispatcher()?, &args).await?,
    }

    Ok(())
}
