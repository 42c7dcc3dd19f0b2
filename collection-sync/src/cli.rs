/// # collection-sync CLI
///
/// Command parsing and process-level wiring for the `collection-sync` binary.
/// All discovery and sync logic lives in `collection-sync-core`; this module
/// only loads configuration, builds the registry and chooses how cycles run.
///
/// ## Commands
/// - `serve`: schedule every enabled source and expose the HTTP API until Ctrl-C.
/// - `sync`: run one blocking cycle for every enabled source matching the
///   optional `--provider/--host/--organization` filter and print a report.
///   Exits non-zero if any cycle failed.
///
/// For programmatic and integration use, call [`run`] with a constructed [`Cli`].
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use collection_sync_core::config::SourceIdParts;
use collection_sync_core::contract::CatalogSink;
use collection_sync_core::dispatch::SyncFilter;
use collection_sync_core::orchestrator::SyncStatus;
use collection_sync_core::registry::RegistryHandle;
use futures::future::join_all;
use tokio::sync::watch;

use crate::bootstrap::build_registry;
use crate::catalog::JsonFileCatalog;
use crate::load_config::load_config;
use crate::scheduler::schedule_sources;
use crate::server::{serve, AppState};

/// CLI for collection-sync: discover collections in SCM hosts and sync them to a catalog.
#[derive(Parser)]
#[clap(
    name = "collection-sync",
    version,
    about = "Discover galaxy collections across GitHub/GitLab organizations and sync them into a catalog"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the scheduler and the HTTP API using the given config file
    Serve {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
    },
    /// Run one sync cycle for matching sources and exit
    Sync {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
        /// Only sources of this provider (github, gitlab)
        #[clap(long)]
        provider: Option<String>,
        /// Only sources on this host (requires --provider)
        #[clap(long)]
        host: Option<String>,
        /// Only this organization (requires --host)
        #[clap(long)]
        organization: Option<String>,
    },
}

/// Async CLI entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Serve { config } => serve_command(config).await,
        Commands::Sync {
            config,
            provider,
            host,
            organization,
        } => {
            let filter = SyncFilter {
                provider,
                host,
                organization,
            };
            sync_command(config, filter).await
        }
    }
}

async fn serve_command(config: PathBuf) -> Result<()> {
    let config = load_config(config)?;
    tracing::info!(command = "serve", "Starting scheduler and HTTP API");
    let catalog: Arc<dyn CatalogSink> = Arc::new(JsonFileCatalog::open(&config.catalog.path)?);
    let registry = Arc::new(RegistryHandle::new(build_registry(&config.sources, catalog)?));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let schedules = schedule_sources(&registry.snapshot(), &shutdown_rx);
    let signal_tx = shutdown_tx.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("Shutdown signal received"),
            Err(e) => tracing::error!(error = %e, "Failed to listen for shutdown signal"),
        }
        let _ = signal_tx.send(true);
    });

    let served = serve(config.server.bind, AppState { registry }, shutdown_rx).await;
    // The server may also stop on its own (bind failure); stop the schedules either way.
    let _ = shutdown_tx.send(true);
    for handle in schedules {
        let _ = handle.await;
    }
    served
}

async fn sync_command(config: PathBuf, filter: SyncFilter) -> Result<()> {
    filter.validate().map_err(|e| anyhow!("invalid filter: {}", e))?;
    let config = load_config(config)?;
    tracing::info!(command = "sync", ?filter, "Starting one-shot synchronisation");
    let catalog: Arc<dyn CatalogSink> = Arc::new(JsonFileCatalog::open(&config.catalog.path)?);
    let registry = build_registry(&config.sources, catalog)?;

    let selected: Vec<_> = registry
        .iter()
        .filter(|o| o.source().enabled && filter.matches(&SourceIdParts::parse(o.source_id())))
        .collect();
    if selected.is_empty() {
        tracing::error!(command = "sync", ?filter, "No enabled source matches the filter");
        return Err(anyhow!("no enabled source matches the filter"));
    }

    let runs = join_all(selected.iter().map(|orchestrator| async move {
        let outcome = orchestrator
            .run_with_timeout(orchestrator.source().schedule.timeout)
            .await;
        (orchestrator.source_id().to_string(), outcome)
    }))
    .await;

    let mut failed = 0;
    println!("Sync report");
    for (source_id, outcome) in &runs {
        match outcome {
            Ok(outcome) if outcome.status == SyncStatus::Success => {
                println!(
                    "  {}: success ({} collections, {} entities)",
                    source_id, outcome.collections, outcome.entities
                );
            }
            Ok(outcome) => {
                failed += 1;
                println!(
                    "  {}: failure ({})",
                    source_id,
                    outcome.error.as_deref().unwrap_or("unknown error")
                );
            }
            Err(e) => {
                failed += 1;
                println!("  {}: not run ({})", source_id, e);
            }
        }
    }
    println!("{} of {} sources synced", runs.len() - failed, runs.len());

    if failed > 0 {
        tracing::error!(command = "sync", failed, total = runs.len(), "Synchronisation failed");
        return Err(anyhow!("{} of {} source syncs failed", failed, runs.len()));
    }
    tracing::info!(command = "sync", total = runs.len(), "Synchronisation complete");
    Ok(())
}
