//! Repository crawling for one source.
//!
//! [`Crawler`] composes ref resolution ([`crate::refs`]), directory walking
//! ([`crate::walker`]) and manifest processing ([`crate::manifest`]) over every
//! repository of a [`SourceConfig`]. The algorithm is provider-independent;
//! the provider only contributes its [`ProviderFlavor`] vocabulary and the
//! [`ScmClient`] it was built with.
//!
//! # Failure isolation
//! A failure inside one repository (ref listing, root listing) is recorded as
//! a skip reason for that repository and never affects the others. When the
//! branch or tag listing fails, the default branch is still searched. Only the
//! organization-level repository listing in [`Crawler::discover`] can fail
//! the whole crawl.

use std::collections::HashSet;

use futures::future::join_all;
use futures::stream::{self, StreamExt};
use tracing::{debug, info, warn};

use crate::config::SourceConfig;
use crate::contract::{ManifestValidator, RepositoryInfo, ScmClient};
use crate::error::ScmError;
use crate::flavor::ProviderFlavor;
use crate::manifest::{DiscoveredItem, ManifestProcessor};
use crate::refs::{resolve_refs, DiscoveryOptions, ResolvedRef};
use crate::walker::DirectoryWalker;

/// Repositories crawled concurrently within one source.
pub const MAX_CONCURRENT_REPOSITORIES: usize = 8;

pub const NO_MANIFESTS_REASON: &str = "no valid manifest files found";

/// A repository that contributed nothing, and why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedRepository {
    pub repository: String,
    pub reason: String,
}

struct RepositoryCrawl {
    items: Vec<DiscoveredItem>,
    skipped: Option<SkippedRepository>,
}

pub struct Crawler<'a> {
    source: &'a SourceConfig,
    client: &'a dyn ScmClient,
    validator: &'a dyn ManifestValidator,
    flavor: &'static dyn ProviderFlavor,
}

impl<'a> Crawler<'a> {
    pub fn new(
        source: &'a SourceConfig,
        client: &'a dyn ScmClient,
        validator: &'a dyn ManifestValidator,
    ) -> Self {
        Self {
            source,
            client,
            validator,
            flavor: source.provider.flavor(),
        }
    }

    /// Lists the organization's repositories and crawls all of them.
    pub async fn discover(
        &self,
        options: &DiscoveryOptions,
    ) -> Result<Vec<DiscoveredItem>, ScmError> {
        let repos = self.client.list_repositories().await?;
        Ok(self.discover_in_repos(&repos, options).await)
    }

    /// Crawls an already-listed set of repositories.
    pub async fn discover_in_repos(
        &self,
        repos: &[RepositoryInfo],
        options: &DiscoveryOptions,
    ) -> Vec<DiscoveredItem> {
        let label = self.flavor.repository_label();
        info!(
            source_id = %self.source.source_id(),
            repositories = repos.len(),
            "Crawling {}s for collection manifests",
            label
        );

        let pending: Vec<_> = repos
            .iter()
            .map(|repo| self.crawl_repository(repo, options))
            .collect();
        let crawls: Vec<RepositoryCrawl> = stream::iter(pending)
            .buffered(MAX_CONCURRENT_REPOSITORIES)
            .collect()
            .await;

        let mut items = Vec::new();
        let mut skipped = Vec::new();
        for crawl in crawls {
            items.extend(crawl.items);
            skipped.extend(crawl.skipped);
        }

        for skip in &skipped {
            info!(
                source_id = %self.source.source_id(),
                repo = %skip.repository,
                reason = %skip.reason,
                "Skipped {}",
                label
            );
        }
        info!(
            source_id = %self.source.source_id(),
            repositories = repos.len(),
            skipped = skipped.len(),
            manifests = items.len(),
            "Crawl finished"
        );
        items
    }

    async fn crawl_repository(
        &self,
        repo: &RepositoryInfo,
        options: &DiscoveryOptions,
    ) -> RepositoryCrawl {
        let mut last_error: Option<ScmError> = None;
        let refs = match resolve_refs(self.client, repo, options).await {
            Ok(refs) => refs,
            Err(e) => {
                warn!(
                    repo = %repo.full_path,
                    error = %e,
                    "Failed to resolve refs, searching the default branch only"
                );
                last_error = Some(e);
                vec![ResolvedRef::branch(repo.default_branch.clone())]
            }
        };

        let walker = DirectoryWalker::new(self.client, self.flavor.repository_label());
        let processor = ManifestProcessor::new(self.client, self.validator);
        let start_paths: Vec<&str> = if self.source.manifest_paths.is_empty() {
            vec![""]
        } else {
            self.source.manifest_paths.iter().map(String::as_str).collect()
        };

        let mut items = Vec::new();
        for git_ref in &refs {
            let mut seen = HashSet::new();
            let mut candidates = Vec::new();
            for start in &start_paths {
                let walk = walker
                    .find_manifests(repo, &git_ref.name, start, self.source.crawl_depth)
                    .await;
                if let Some(e) = walk.root_error {
                    last_error = Some(e);
                }
                candidates.extend(walk.candidates.into_iter().filter(|c| seen.insert(c.clone())));
            }
            debug!(
                repo = %repo.full_path,
                git_ref = %git_ref.name,
                candidates = candidates.len(),
                "Walked ref"
            );

            let processed = join_all(
                candidates
                    .iter()
                    .map(|path| processor.process(repo, git_ref, path)),
            )
            .await;
            items.extend(processed.into_iter().flatten());
        }

        let skipped = if items.is_empty() {
            let reason = match last_error {
                Some(e) => format!("error: {}", e),
                None => NO_MANIFESTS_REASON.to_string(),
            };
            Some(SkippedRepository {
                repository: repo.full_path.clone(),
                reason,
            })
        } else {
            None
        };
        RepositoryCrawl { items, skipped }
    }
}
