use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use leadmap_export::ExportStore;
use leadmap_extract::{FixtureListingSource, SourceRegistry};
use leadmap_tasks::TaskStore;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "leadmap")]
#[command(about = "Map directory lead scraper service")]
struct Cli {
    /// Saved results page backing the maps source.
    #[arg(long, default_value = "fixtures/maps_results.html")]
    fixture: PathBuf,

    /// Directory export artifacts are written to.
    #[arg(long, default_value = "exports")]
    exports: PathBuf,

    /// Fetch business websites to fill in missing e-mails.
    #[arg(long)]
    enrich_emails: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the JSON API server.
    Serve,
    /// List the registered scraper types.
    Sources,
}

fn init_telemetry() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,leadmap=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_telemetry();
    let cli = Cli::parse();

    let mut maps = FixtureListingSource::from_file(&cli.fixture)
        .with_context(|| format!("loading fixture {}", cli.fixture.display()))?;
    if cli.enrich_emails {
        maps = maps.with_website_lookup(reqwest::Client::new());
    }
    let mut registry = SourceRegistry::new();
    registry.register(Arc::new(maps));

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => {
            let store = TaskStore::new(registry, ExportStore::new(&cli.exports));
            leadmap_web::serve_from_env(store).await?;
        }
        Commands::Sources => {
            for source in registry.descriptors() {
                println!("{:<12} {:<24} {}", source.name, source.display_name, source.description);
            }
        }
    }

    Ok(())
}
