//! Per-source sync orchestration.
//!
//! A [`SourceOrchestrator`] owns the [`SourceSyncState`] of exactly one source
//! and runs its crawl → dedup → map → mutate cycle. At most one cycle runs per
//! source at a time; a second request while one is in flight is rejected, not
//! queued.
//!
//! # Entry points
//! - [`SourceOrchestrator::run`] / [`SourceOrchestrator::run_with_timeout`]:
//!   block until the cycle ends (scheduler path).
//! - [`SourceOrchestrator::start_sync`]: claim the source and spawn the cycle
//!   in the background (dispatch path).
//!
//! # Error Handling
//! Nothing that happens inside a cycle escapes it: SCM, mapping, sink errors,
//! timeouts and panics are all recorded as a failed cycle. Only caller errors
//! ([`SyncError`]) are returned before a cycle starts.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::config::SourceConfig;
use crate::contract::{CatalogSink, ManifestValidator, ScmClient};
use crate::crawler::Crawler;
use crate::entity::{collection_entity, repository_entity};
use crate::error::{CycleError, SyncError};
use crate::identity::deduplicate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Success,
    Failure,
}

/// Mutable sync bookkeeping of one source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceSyncState {
    pub is_syncing: bool,
    pub last_sync_time: Option<DateTime<Utc>>,
    pub last_failed_sync_time: Option<DateTime<Utc>>,
    pub last_sync_status: Option<SyncStatus>,
    /// Collections found by the last successful cycle.
    pub current_count: usize,
    /// `current_count` before the last successful cycle.
    pub previous_count: usize,
}

impl SourceSyncState {
    pub fn delta(&self) -> i64 {
        self.current_count as i64 - self.previous_count as i64
    }
}

/// Answer of [`SourceOrchestrator::start_sync`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StartSyncResult {
    pub started: bool,
    pub skipped: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Result of one completed cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleOutcome {
    pub status: SyncStatus,
    pub collections: usize,
    pub entities: usize,
    pub error: Option<String>,
}

struct CycleCounts {
    collections: usize,
    entities: usize,
}

pub struct SourceOrchestrator {
    source: Arc<SourceConfig>,
    source_id: String,
    client: Arc<dyn ScmClient>,
    validator: Arc<dyn ManifestValidator>,
    sink: RwLock<Option<Arc<dyn CatalogSink>>>,
    state: Mutex<SourceSyncState>,
}

impl SourceOrchestrator {
    pub fn new(
        source: SourceConfig,
        client: Arc<dyn ScmClient>,
        validator: Arc<dyn ManifestValidator>,
    ) -> Self {
        let source_id = source.source_id();
        Self {
            source: Arc::new(source),
            source_id,
            client,
            validator,
            sink: RwLock::new(None),
            state: Mutex::new(SourceSyncState::default()),
        }
    }

    pub fn source(&self) -> &SourceConfig {
        &self.source
    }

    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    /// Stable name under which this source writes to the catalog.
    pub fn provider_name(&self) -> String {
        self.source.location_key()
    }

    /// Attaches the catalog sink. Must happen before any run.
    pub fn connect(&self, sink: Arc<dyn CatalogSink>) {
        let mut slot = self.sink.write();
        if slot.is_some() {
            warn!(source_id = %self.source_id, "Replacing existing catalog connection");
        }
        *slot = Some(sink);
        info!(source_id = %self.source_id, "Connected to catalog sink");
    }

    pub fn is_connected(&self) -> bool {
        self.sink.read().is_some()
    }

    pub fn state(&self) -> SourceSyncState {
        self.state.lock().clone()
    }

    pub fn is_syncing(&self) -> bool {
        self.state.lock().is_syncing
    }

    /// Runs one full cycle and waits for it to finish.
    pub async fn run(&self) -> Result<CycleOutcome, SyncError> {
        let sink = self.begin()?;
        Ok(self.execute(sink, None).await)
    }

    /// Like [`run`](Self::run), failing the cycle once `timeout` elapses.
    pub async fn run_with_timeout(&self, timeout: Duration) -> Result<CycleOutcome, SyncError> {
        let sink = self.begin()?;
        Ok(self.execute(sink, Some(timeout)).await)
    }

    /// Claims the source and launches a cycle without waiting for it.
    ///
    /// The background cycle is bounded by the source's schedule timeout, so a
    /// hung crawl cannot hold the source forever.
    pub fn start_sync(self: &Arc<Self>) -> StartSyncResult {
        match self.begin() {
            Ok(sink) => {
                let this = Arc::clone(self);
                let timeout = self.source.schedule.timeout;
                tokio::spawn(async move {
                    this.execute(sink, Some(timeout)).await;
                });
                StartSyncResult {
                    started: true,
                    skipped: false,
                    error: None,
                }
            }
            Err(SyncError::AlreadySyncing(_)) => {
                info!(source_id = %self.source_id, "Sync already in progress, skipping");
                StartSyncResult {
                    started: false,
                    skipped: true,
                    error: None,
                }
            }
            Err(e) => StartSyncResult {
                started: false,
                skipped: false,
                error: Some(e.to_string()),
            },
        }
    }

    /// Idle → Syncing. Checks the connection first, then claims the source.
    fn begin(&self) -> Result<Arc<dyn CatalogSink>, SyncError> {
        let sink = self
            .sink
            .read()
            .clone()
            .ok_or_else(|| SyncError::NotConnected(self.source_id.clone()))?;
        let mut state = self.state.lock();
        if state.is_syncing {
            return Err(SyncError::AlreadySyncing(self.source_id.clone()));
        }
        state.is_syncing = true;
        Ok(sink)
    }

    async fn execute(&self, sink: Arc<dyn CatalogSink>, timeout: Option<Duration>) -> CycleOutcome {
        let span = info_span!("sync_cycle", source_id = %self.source_id, run_id = %Uuid::new_v4());
        async {
            info!("Starting sync cycle");
            let body = AssertUnwindSafe(self.cycle(sink.as_ref())).catch_unwind();
            let result = match timeout {
                Some(limit) => match tokio::time::timeout(limit, body).await {
                    Ok(result) => result,
                    Err(_) => Ok(Err(CycleError::TimedOut(limit))),
                },
                None => body.await,
            };
            let result = result.unwrap_or_else(|panic| {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                Err(CycleError::Panicked(message))
            });
            self.finish(result)
        }
        .instrument(span)
        .await
    }

    async fn cycle(&self, sink: &dyn CatalogSink) -> Result<CycleCounts, CycleError> {
        let source = self.source.as_ref();
        let crawler = Crawler::new(source, self.client.as_ref(), self.validator.as_ref());

        let repos = self.client.list_repositories().await?;
        let discovered = crawler
            .discover_in_repos(&repos, &source.discovery_options())
            .await;
        let unique = deduplicate(source, discovered);

        let mut per_repo: HashMap<&str, usize> = HashMap::new();
        for item in &unique {
            *per_repo.entry(item.repository.full_path.as_str()).or_default() += 1;
        }

        let mut entities = Vec::with_capacity(per_repo.len() + unique.len());
        for repo in &repos {
            if let Some(count) = per_repo.get(repo.full_path.as_str()) {
                entities.push(repository_entity(repo, source, *count)?);
            }
        }
        for item in &unique {
            entities.push(collection_entity(item, source)?);
        }

        let counts = CycleCounts {
            collections: unique.len(),
            entities: entities.len(),
        };
        sink.apply_full_mutation(&source.location_key(), entities)
            .await?;
        Ok(counts)
    }

    /// Syncing → Idle, recording the outcome.
    fn finish(&self, result: Result<CycleCounts, CycleError>) -> CycleOutcome {
        let mut state = self.state.lock();
        state.is_syncing = false;
        match result {
            Ok(counts) => {
                state.last_sync_time = Some(Utc::now());
                state.last_sync_status = Some(SyncStatus::Success);
                state.previous_count = state.current_count;
                state.current_count = counts.collections;
                info!(
                    collections = counts.collections,
                    entities = counts.entities,
                    delta = state.delta(),
                    "Sync cycle succeeded"
                );
                CycleOutcome {
                    status: SyncStatus::Success,
                    collections: counts.collections,
                    entities: counts.entities,
                    error: None,
                }
            }
            Err(e) => {
                state.last_failed_sync_time = Some(Utc::now());
                state.last_sync_status = Some(SyncStatus::Failure);
                error!(error = %e, "Sync cycle failed");
                CycleOutcome {
                    status: SyncStatus::Failure,
                    collections: 0,
                    entities: 0,
                    error: Some(e.to_string()),
                }
            }
        }
    }
}
