mod common;

use std::sync::Arc;

use tokio::sync::watch;

use collection_sync_core::config::{Provider, SourceConfig};
use collection_sync_core::contract::MockCatalogSink;
use collection_sync_core::dispatch::{dispatch, DispatchStatus, SyncFilter, SyncResultStatus};
use collection_sync_core::manifest::GalaxyManifestValidator;
use collection_sync_core::orchestrator::{SourceOrchestrator, SyncStatus};
use collection_sync_core::registry::{RegistryHandle, SourceRegistry};
use common::{eventually, galaxy_yml, source, FakeRepo, FakeScm};

fn accepting_sink() -> Arc<MockCatalogSink> {
    let mut sink = MockCatalogSink::new();
    sink.expect_apply_full_mutation().returning(|_, _| Ok(()));
    Arc::new(sink)
}

fn repos() -> Vec<FakeRepo> {
    vec![FakeRepo::new("acme", "content").file(
        "main",
        "galaxy.yml",
        &galaxy_yml("acme", "tools", "1.0.0"),
    )]
}

/// Builds a connected orchestrator whose repository listing waits on a gate.
fn gated(source: SourceConfig) -> (Arc<SourceOrchestrator>, watch::Sender<bool>) {
    let (scm, gate) = FakeScm::gated(repos());
    let orch = Arc::new(SourceOrchestrator::new(
        source,
        Arc::new(scm),
        Arc::new(GalaxyManifestValidator),
    ));
    orch.connect(accepting_sink());
    (orch, gate)
}

struct Fixture {
    registry: SourceRegistry,
    gates: Vec<watch::Sender<bool>>,
}

impl Fixture {
    /// Two GitHub organizations and one GitLab group, all connected.
    fn new() -> Self {
        let sources = vec![
            source(Provider::Github, "github.com", "acme"),
            source(Provider::Github, "github.com", "widgets"),
            source(Provider::Gitlab, "gitlab.example.com", "platform"),
        ];
        let mut orchestrators = Vec::new();
        let mut gates = Vec::new();
        for source in sources {
            let (orch, gate) = gated(source);
            orchestrators.push(orch);
            gates.push(gate);
        }
        Self {
            registry: SourceRegistry::new(orchestrators),
            gates,
        }
    }

    fn release(&self) {
        for gate in &self.gates {
            let _ = gate.send(true);
        }
    }
}

fn provider(p: &str) -> SyncFilter {
    SyncFilter {
        provider: Some(p.into()),
        ..Default::default()
    }
}

fn organization(p: &str, host: &str, org: &str) -> SyncFilter {
    SyncFilter {
        provider: Some(p.into()),
        host: Some(host.into()),
        organization: Some(org.into()),
    }
}

#[tokio::test]
async fn provider_filter_starts_matching_sources() {
    let fixture = Fixture::new();

    let response = dispatch(&fixture.registry, &[provider("github")]);

    assert_eq!(response.status, DispatchStatus::Accepted);
    assert_eq!(response.summary.total, 2);
    assert_eq!(response.summary.sync_started, 2);
    let ids: Vec<_> = response
        .results
        .iter()
        .map(|r| r.source_id.clone().unwrap())
        .collect();
    assert_eq!(
        ids,
        vec!["test:github:github.com:acme", "test:github:github.com:widgets"]
    );
    assert!(!fixture
        .registry
        .get("test:gitlab:gitlab.example.com:platform")
        .unwrap()
        .is_syncing());

    fixture.release();
    let registry = &fixture.registry;
    eventually(|| !registry.status().sync_in_progress).await;
}

#[tokio::test]
async fn empty_request_targets_every_source() {
    let fixture = Fixture::new();

    let response = dispatch(&fixture.registry, &[]);

    assert_eq!(response.status, DispatchStatus::Accepted);
    assert_eq!(response.summary.sync_started, 3);
    fixture.release();
}

#[tokio::test]
async fn repeated_request_reports_already_syncing() {
    let fixture = Fixture::new();
    dispatch(&fixture.registry, &[provider("gitlab")]);

    let response = dispatch(&fixture.registry, &[provider("gitlab")]);

    assert_eq!(response.status, DispatchStatus::Ok);
    assert_eq!(response.summary.already_syncing, 1);
    assert_eq!(response.results[0].status, SyncResultStatus::AlreadySyncing);
    fixture.release();
}

#[tokio::test]
async fn invalid_filters_alone_are_a_bad_request() {
    let fixture = Fixture::new();
    let orphan_org = SyncFilter {
        organization: Some("acme".into()),
        ..Default::default()
    };

    let response = dispatch(&fixture.registry, &[orphan_org]);

    assert_eq!(response.status, DispatchStatus::BadRequest);
    assert_eq!(response.summary.invalid, 1);
    assert_eq!(response.summary.total, 1);
    assert!(response.results[0].filter.is_some());
    assert!(response.results[0].error.is_some());
    assert!(!fixture.registry.status().sync_in_progress);
}

#[tokio::test]
async fn invalid_filter_next_to_a_match_is_multi_status() {
    let fixture = Fixture::new();
    let host_only = SyncFilter {
        host: Some("github.com".into()),
        ..Default::default()
    };

    let response = dispatch(
        &fixture.registry,
        &[host_only, organization("github", "github.com", "acme")],
    );

    assert_eq!(response.status, DispatchStatus::MultiStatus);
    assert_eq!(response.summary.total, 2);
    assert_eq!(response.summary.invalid, 1);
    assert_eq!(response.summary.sync_started, 1);
    fixture.release();
}

#[tokio::test]
async fn unconnected_sources_fail() {
    let orch = Arc::new(SourceOrchestrator::new(
        source(Provider::Github, "github.com", "acme"),
        Arc::new(FakeScm::new(repos())),
        Arc::new(GalaxyManifestValidator),
    ));
    let registry = SourceRegistry::new(vec![orch]);

    let response = dispatch(&registry, &[]);

    assert_eq!(response.status, DispatchStatus::InternalServerError);
    assert_eq!(response.summary.failed, 1);
    assert!(response.results[0]
        .error
        .as_deref()
        .unwrap()
        .contains("not connected"));
}

#[tokio::test]
async fn overlapping_filters_sync_each_source_once() {
    let fixture = Fixture::new();

    let response = dispatch(
        &fixture.registry,
        &[
            provider("github"),
            organization("github", "github.com", "acme"),
            provider("github"),
        ],
    );

    assert_eq!(response.status, DispatchStatus::Accepted);
    assert_eq!(response.summary.total, 2);
    fixture.release();
}

#[tokio::test]
async fn unmatched_filter_is_a_bad_request() {
    let fixture = Fixture::new();

    let response = dispatch(
        &fixture.registry,
        &[organization("github", "github.com", "nobody")],
    );

    assert_eq!(response.status, DispatchStatus::BadRequest);
    assert_eq!(response.summary.total, 0);
    assert!(response.results.is_empty());
}

#[tokio::test]
async fn disabled_sources_are_never_dispatched() {
    let (enabled, gate) = gated(source(Provider::Github, "github.com", "acme"));
    let (disabled, _disabled_gate) =
        gated(source(Provider::Github, "github.com", "legacy").with_enabled(false));
    let registry = SourceRegistry::new(vec![enabled, disabled]);

    let response = dispatch(&registry, &[provider("github")]);

    assert_eq!(response.summary.total, 1);
    assert_eq!(
        response.results[0].source_id.as_deref(),
        Some("test:github:github.com:acme")
    );
    let status = registry.status();
    assert_eq!(status.sources.len(), 2);
    assert!(status.sources.iter().any(|s| !s.enabled));
    gate.send(true).unwrap();
}

#[tokio::test]
async fn status_reflects_finished_syncs() {
    let fixture = Fixture::new();
    dispatch(&fixture.registry, &[provider("gitlab")]);

    let report = fixture.registry.status();
    assert!(report.sync_in_progress);
    let gitlab = report
        .sources
        .iter()
        .find(|s| s.provider == "gitlab")
        .unwrap();
    assert!(gitlab.sync_in_progress);
    assert_eq!(gitlab.host, "gitlab.example.com");

    fixture.release();
    let registry = &fixture.registry;
    eventually(|| !registry.status().sync_in_progress).await;

    let report = fixture.registry.status();
    let gitlab = report
        .sources
        .iter()
        .find(|s| s.provider == "gitlab")
        .unwrap();
    assert_eq!(gitlab.last_sync_status, Some(SyncStatus::Success));
    assert_eq!(gitlab.collections_found, 1);
    assert_eq!(gitlab.collections_delta, 1);
    assert!(report
        .sources
        .iter()
        .filter(|s| s.provider == "github")
        .all(|s| s.last_sync_time.is_none()));
}

#[tokio::test]
async fn registry_replacement_does_not_disturb_snapshots() {
    let handle = RegistryHandle::new(Fixture::new().registry);
    let before = handle.snapshot();
    assert_eq!(before.len(), 3);

    let old = handle.replace(SourceRegistry::new(vec![]));

    assert!(Arc::ptr_eq(&before, &old));
    assert_eq!(before.len(), 3);
    assert!(handle.snapshot().is_empty());
    let response = dispatch(&handle.snapshot(), &[]);
    assert_eq!(response.status, DispatchStatus::BadRequest);
}

#[test]
fn duplicate_source_ids_are_dropped() {
    let make = || {
        Arc::new(SourceOrchestrator::new(
            source(Provider::Github, "github.com", "acme"),
            Arc::new(FakeScm::new(vec![])),
            Arc::new(GalaxyManifestValidator),
        ))
    };

    let registry = SourceRegistry::new(vec![make(), make()]);

    assert_eq!(registry.len(), 1);
}
