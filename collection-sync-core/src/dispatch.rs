//! Filter-based dispatch of background syncs.
//!
//! A request carries zero or more [`SyncFilter`]s. Each filter is validated on
//! its own, matched against every enabled source in the registry, and the
//! union of matches is synced once per source via
//! [`SourceOrchestrator::start_sync`]. The per-source outcomes are folded into
//! one [`DispatchResponse`] whose [`DispatchStatus`] answers "did the request
//! make sense" before "did the syncs start".

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::SourceIdParts;
use crate::error::FilterError;
use crate::orchestrator::SourceOrchestrator;
use crate::registry::SourceRegistry;

/// Hierarchical selector: `organization` needs `host`, `host` needs `provider`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization: Option<String>,
}

impl SyncFilter {
    pub fn validate(&self) -> Result<(), FilterError> {
        if self.organization.is_some() && self.host.is_none() {
            return Err(FilterError::OrganizationWithoutHost);
        }
        if self.host.is_some() && self.provider.is_none() {
            return Err(FilterError::HostWithoutProvider);
        }
        Ok(())
    }

    /// Exact match on every present field; absent fields match anything.
    pub fn matches(&self, parts: &SourceIdParts) -> bool {
        let field = |want: &Option<String>, have: &str| want.as_deref().map_or(true, |w| w == have);
        field(&self.provider, &parts.provider)
            && field(&self.host, &parts.host)
            && field(&self.organization, &parts.organization)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncResultStatus {
    SyncStarted,
    AlreadySyncing,
    Failed,
    Invalid,
}

/// Outcome for one matched source, or for one rejected filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncResult {
    pub status: SyncResultStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organization: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<SyncFilter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SyncResult {
    fn invalid(filter: SyncFilter, error: FilterError) -> Self {
        Self {
            status: SyncResultStatus::Invalid,
            source_id: None,
            provider: None,
            host: None,
            organization: None,
            filter: Some(filter),
            error: Some(error.to_string()),
        }
    }

    fn for_source(parts: SourceIdParts, source_id: &str, status: SyncResultStatus) -> Self {
        Self {
            status,
            source_id: Some(source_id.to_string()),
            provider: Some(parts.provider),
            host: Some(parts.host),
            organization: Some(parts.organization),
            filter: None,
            error: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncSummary {
    pub total: usize,
    pub sync_started: usize,
    pub already_syncing: usize,
    pub failed: usize,
    pub invalid: usize,
}

impl SyncSummary {
    fn record(&mut self, status: SyncResultStatus) {
        self.total += 1;
        match status {
            SyncResultStatus::SyncStarted => self.sync_started += 1,
            SyncResultStatus::AlreadySyncing => self.already_syncing += 1,
            SyncResultStatus::Failed => self.failed += 1,
            SyncResultStatus::Invalid => self.invalid += 1,
        }
    }
}

/// Overall status of a dispatch batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchStatus {
    Ok,
    Accepted,
    MultiStatus,
    BadRequest,
    InternalServerError,
}

impl DispatchStatus {
    pub fn code(self) -> u16 {
        match self {
            DispatchStatus::Ok => 200,
            DispatchStatus::Accepted => 202,
            DispatchStatus::MultiStatus => 207,
            DispatchStatus::BadRequest => 400,
            DispatchStatus::InternalServerError => 500,
        }
    }

    /// Precedence, first match wins:
    /// nothing to do or all invalid → 400; all failed → 500; all started → 202;
    /// all already syncing → 200; only invalid and failed → 400; otherwise 207.
    pub fn classify(summary: &SyncSummary) -> Self {
        let successes = summary.sync_started + summary.already_syncing;
        if summary.total == 0 || summary.invalid == summary.total {
            DispatchStatus::BadRequest
        } else if summary.failed == summary.total {
            DispatchStatus::InternalServerError
        } else if summary.sync_started == summary.total {
            DispatchStatus::Accepted
        } else if summary.already_syncing == summary.total {
            DispatchStatus::Ok
        } else if successes == 0 {
            DispatchStatus::BadRequest
        } else {
            DispatchStatus::MultiStatus
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DispatchResponse {
    pub summary: SyncSummary,
    pub results: Vec<SyncResult>,
    #[serde(skip)]
    pub status: DispatchStatus,
}

/// Starts background syncs for every enabled source matched by `filters`.
///
/// An empty `filters` slice selects every enabled source.
pub fn dispatch(registry: &SourceRegistry, filters: &[SyncFilter]) -> DispatchResponse {
    let filters: Vec<SyncFilter> = if filters.is_empty() {
        vec![SyncFilter::default()]
    } else {
        filters.to_vec()
    };

    let mut results = Vec::new();
    let mut seen = HashSet::new();
    let mut matched: Vec<(&Arc<SourceOrchestrator>, SourceIdParts)> = Vec::new();
    for filter in filters {
        if let Err(e) = filter.validate() {
            debug!(?filter, error = %e, "Rejecting invalid sync filter");
            results.push(SyncResult::invalid(filter, e));
            continue;
        }
        for orchestrator in registry.iter().filter(|o| o.source().enabled) {
            let parts = SourceIdParts::parse(orchestrator.source_id());
            if filter.matches(&parts) && seen.insert(orchestrator.source_id().to_string()) {
                matched.push((orchestrator, parts));
            }
        }
    }

    for (orchestrator, parts) in matched {
        let started = orchestrator.start_sync();
        let status = if started.started {
            SyncResultStatus::SyncStarted
        } else if started.skipped {
            SyncResultStatus::AlreadySyncing
        } else {
            SyncResultStatus::Failed
        };
        let mut result = SyncResult::for_source(parts, orchestrator.source_id(), status);
        result.error = started.error;
        results.push(result);
    }

    let mut summary = SyncSummary::default();
    for result in &results {
        summary.record(result.status);
    }
    let status = DispatchStatus::classify(&summary);
    info!(
        total = summary.total,
        sync_started = summary.sync_started,
        already_syncing = summary.already_syncing,
        failed = summary.failed,
        invalid = summary.invalid,
        status = status.code(),
        "Dispatched sync request"
    );
    DispatchResponse {
        summary,
        results,
        status,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter(provider: Option<&str>, host: Option<&str>, org: Option<&str>) -> SyncFilter {
        SyncFilter {
            provider: provider.map(Into::into),
            host: host.map(Into::into),
            organization: org.map(Into::into),
        }
    }

    fn summary(started: usize, already: usize, failed: usize, invalid: usize) -> SyncSummary {
        SyncSummary {
            total: started + already + failed + invalid,
            sync_started: started,
            already_syncing: already,
            failed,
            invalid,
        }
    }

    #[test]
    fn hierarchy_is_enforced() {
        assert_eq!(
            filter(None, None, Some("org")).validate(),
            Err(FilterError::OrganizationWithoutHost)
        );
        assert_eq!(
            filter(None, Some("github.com"), None).validate(),
            Err(FilterError::HostWithoutProvider)
        );
        assert!(filter(Some("github"), Some("github.com"), Some("org")).validate().is_ok());
        assert!(SyncFilter::default().validate().is_ok());
    }

    #[test]
    fn absent_fields_are_wildcards() {
        let parts = SourceIdParts::parse("dev:github:github.com:acme");
        assert!(SyncFilter::default().matches(&parts));
        assert!(filter(Some("github"), None, None).matches(&parts));
        assert!(!filter(Some("gitlab"), None, None).matches(&parts));
        assert!(!filter(Some("github"), Some("github.com"), Some("other")).matches(&parts));
    }

    #[test]
    fn status_precedence() {
        let classify = |s: SyncSummary| DispatchStatus::classify(&s);
        assert_eq!(classify(summary(0, 0, 0, 0)), DispatchStatus::BadRequest);
        assert_eq!(classify(summary(0, 0, 0, 2)), DispatchStatus::BadRequest);
        assert_eq!(classify(summary(0, 0, 3, 0)), DispatchStatus::InternalServerError);
        assert_eq!(classify(summary(2, 0, 0, 0)), DispatchStatus::Accepted);
        assert_eq!(classify(summary(0, 3, 0, 0)), DispatchStatus::Ok);
        assert_eq!(classify(summary(0, 0, 1, 1)), DispatchStatus::BadRequest);
        assert_eq!(classify(summary(1, 1, 0, 0)), DispatchStatus::MultiStatus);
        assert_eq!(classify(summary(1, 0, 0, 1)), DispatchStatus::MultiStatus);
        assert_eq!(classify(summary(0, 1, 1, 0)), DispatchStatus::MultiStatus);
    }

    #[test]
    fn status_codes() {
        assert_eq!(DispatchStatus::Accepted.code(), 202);
        assert_eq!(DispatchStatus::MultiStatus.code(), 207);
    }
}
