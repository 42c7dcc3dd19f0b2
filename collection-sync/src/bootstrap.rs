//! Wires resolved configuration into a connected [`SourceRegistry`].

use std::sync::Arc;

use anyhow::{anyhow, Result};
use collection_sync_core::contract::{CatalogSink, ManifestValidator, ScmClient};
use collection_sync_core::error::ScmError;
use collection_sync_core::manifest::GalaxyManifestValidator;
use collection_sync_core::orchestrator::SourceOrchestrator;
use collection_sync_core::registry::SourceRegistry;
use tracing::{error, info};

use crate::load_config::SourceSpec;
use crate::scm;

/// Builds one orchestrator per source with the real SCM clients.
pub fn build_registry(sources: &[SourceSpec], sink: Arc<dyn CatalogSink>) -> Result<SourceRegistry> {
    build_registry_with(sources, sink, scm::client_for)
}

/// Like [`build_registry`], with the SCM client supplied by `client_for`.
pub fn build_registry_with<F>(
    sources: &[SourceSpec],
    sink: Arc<dyn CatalogSink>,
    client_for: F,
) -> Result<SourceRegistry>
where
    F: Fn(&SourceSpec) -> Result<Arc<dyn ScmClient>, ScmError>,
{
    let validator: Arc<dyn ManifestValidator> = Arc::new(GalaxyManifestValidator);
    let mut orchestrators = Vec::with_capacity(sources.len());
    for spec in sources {
        let client = client_for(spec).map_err(|e| {
            error!(source_id = %spec.config.source_id(), error = %e, "Failed to build SCM client");
            anyhow!("{}: {}", spec.config.source_id(), e)
        })?;
        let orchestrator = SourceOrchestrator::new(spec.config.clone(), client, Arc::clone(&validator));
        orchestrator.connect(Arc::clone(&sink));
        orchestrators.push(Arc::new(orchestrator));
    }
    let registry = SourceRegistry::new(orchestrators);
    info!(
        sources = registry.len(),
        enabled = registry.iter().filter(|o| o.source().enabled).count(),
        "Source registry built"
    );
    Ok(registry)
}
