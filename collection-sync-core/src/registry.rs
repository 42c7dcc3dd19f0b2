//! The set of registered sources, and their status.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use tracing::{info, warn};

use crate::orchestrator::{SourceOrchestrator, SyncStatus};

/// Immutable, id-ordered set of orchestrators built at startup.
#[derive(Default)]
pub struct SourceRegistry {
    orchestrators: Vec<Arc<SourceOrchestrator>>,
}

impl SourceRegistry {
    /// Builds the registry; a second orchestrator with an existing id is dropped.
    pub fn new(orchestrators: Vec<Arc<SourceOrchestrator>>) -> Self {
        let mut unique: Vec<Arc<SourceOrchestrator>> = Vec::with_capacity(orchestrators.len());
        for orchestrator in orchestrators {
            if unique
                .iter()
                .any(|o| o.source_id() == orchestrator.source_id())
            {
                warn!(source_id = %orchestrator.source_id(), "Duplicate source id, ignoring");
                continue;
            }
            unique.push(orchestrator);
        }
        unique.sort_by(|a, b| a.source_id().cmp(b.source_id()));
        Self {
            orchestrators: unique,
        }
    }

    pub fn len(&self) -> usize {
        self.orchestrators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orchestrators.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<SourceOrchestrator>> {
        self.orchestrators.iter()
    }

    pub fn get(&self, source_id: &str) -> Option<&Arc<SourceOrchestrator>> {
        self.orchestrators
            .iter()
            .find(|o| o.source_id() == source_id)
    }

    pub fn status(&self) -> StatusReport {
        let sources: Vec<SourceStatus> = self
            .orchestrators
            .iter()
            .map(|o| SourceStatus::of(o))
            .collect();
        StatusReport {
            sync_in_progress: sources.iter().any(|s| s.sync_in_progress),
            sources,
        }
    }
}

/// Shared handle whose registry can be swapped atomically.
///
/// Readers take a [`snapshot`](Self::snapshot) and keep working on it even
/// if the registry is replaced meanwhile.
pub struct RegistryHandle {
    current: RwLock<Arc<SourceRegistry>>,
}

impl RegistryHandle {
    pub fn new(registry: SourceRegistry) -> Self {
        Self {
            current: RwLock::new(Arc::new(registry)),
        }
    }

    pub fn snapshot(&self) -> Arc<SourceRegistry> {
        Arc::clone(&self.current.read())
    }

    pub fn replace(&self, registry: SourceRegistry) -> Arc<SourceRegistry> {
        let next = Arc::new(registry);
        info!(sources = next.len(), "Replacing source registry");
        std::mem::replace(&mut *self.current.write(), next)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceStatus {
    pub source_id: String,
    pub provider: String,
    pub host: String,
    pub organization: String,
    pub enabled: bool,
    pub sync_in_progress: bool,
    pub last_sync_time: Option<DateTime<Utc>>,
    pub last_failed_sync_time: Option<DateTime<Utc>>,
    pub last_sync_status: Option<SyncStatus>,
    pub collections_found: usize,
    pub collections_delta: i64,
}

impl SourceStatus {
    fn of(orchestrator: &SourceOrchestrator) -> Self {
        let source = orchestrator.source();
        let state = orchestrator.state();
        Self {
            source_id: orchestrator.source_id().to_string(),
            provider: source.provider.to_string(),
            host: source.host.clone(),
            organization: source.organization.clone(),
            enabled: source.enabled,
            sync_in_progress: state.is_syncing,
            last_sync_time: state.last_sync_time,
            last_failed_sync_time: state.last_failed_sync_time,
            last_sync_status: state.last_sync_status,
            collections_found: state.current_count,
            collections_delta: state.delta(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub sync_in_progress: bool,
    pub sources: Vec<SourceStatus>,
}
