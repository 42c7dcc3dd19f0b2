//! Periodic sync scheduling.
//!
//! One tokio task per enabled source ticks at the source's frequency and runs a
//! bounded cycle through [`SourceOrchestrator::run_with_timeout`]. A tick that
//! finds the source already syncing (e.g. from an HTTP trigger) is skipped.
//! Missed ticks are skipped as well, never bunched up.

use std::future::Future;
use std::sync::Arc;

use collection_sync_core::config::Schedule;
use collection_sync_core::error::SyncError;
use collection_sync_core::orchestrator::SourceOrchestrator;
use collection_sync_core::registry::SourceRegistry;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Runs `task` on `schedule` until `shutdown` turns `true` (or its sender drops).
pub fn spawn_schedule<F, Fut>(
    id: String,
    schedule: Schedule,
    mut shutdown: watch::Receiver<bool>,
    task: F,
) -> JoinHandle<()>
where
    F: Fn() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        info!(
            task_id = %id,
            frequency = ?schedule.frequency,
            initial_delay = ?schedule.initial_delay,
            "Scheduled task started"
        );

        if let Some(delay) = schedule.initial_delay {
            tokio::select! {
                _ = sleep(delay) => {}
                _ = stop_requested(&mut shutdown) => {
                    info!(task_id = %id, "Scheduled task stopped before first run");
                    return;
                }
            }
        }

        let mut ticker = interval(schedule.frequency);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    debug!(task_id = %id, "Scheduled tick");
                    task().await;
                }
                _ = stop_requested(&mut shutdown) => {
                    info!(task_id = %id, "Scheduled task shutting down");
                    break;
                }
            }
        }
    })
}

/// Resolves once `true` is published or the sender is gone.
async fn stop_requested(shutdown: &mut watch::Receiver<bool>) {
    loop {
        let stop = *shutdown.borrow_and_update();
        if stop || shutdown.changed().await.is_err() {
            return;
        }
    }
}

/// Schedules every enabled source of `registry`.
pub fn schedule_sources(
    registry: &SourceRegistry,
    shutdown: &watch::Receiver<bool>,
) -> Vec<JoinHandle<()>> {
    registry
        .iter()
        .filter(|orchestrator| {
            let enabled = orchestrator.source().enabled;
            if !enabled {
                info!(source_id = %orchestrator.source_id(), "Source disabled, not scheduling");
            }
            enabled
        })
        .map(|orchestrator| {
            let orchestrator = Arc::clone(orchestrator);
            let schedule = orchestrator.source().schedule.clone();
            let id = orchestrator.source_id().to_string();
            spawn_schedule(id, schedule, shutdown.clone(), move || {
                scheduled_run(Arc::clone(&orchestrator))
            })
        })
        .collect()
}

async fn scheduled_run(orchestrator: Arc<SourceOrchestrator>) {
    let timeout = orchestrator.source().schedule.timeout;
    match orchestrator.run_with_timeout(timeout).await {
        Ok(outcome) => debug!(
            source_id = %orchestrator.source_id(),
            status = ?outcome.status,
            collections = outcome.collections,
            "Scheduled sync finished"
        ),
        Err(SyncError::AlreadySyncing(id)) => {
            info!(source_id = %id, "Sync already in progress, skipping scheduled run")
        }
        Err(e @ SyncError::NotConnected(_)) => {
            warn!(error = %e, "Scheduled sync could not start")
        }
    }
}
