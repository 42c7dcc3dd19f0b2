use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::ConfigError;
use crate::flavor::{GithubFlavor, GitlabFlavor, ProviderFlavor};
use crate::refs::DiscoveryOptions;

pub const DEFAULT_CRAWL_DEPTH: u32 = 5;

/// Prefix of the catalog location key owned by each source.
pub const LOCATION_KEY_PREFIX: &str = "scm-discovery";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Github,
    Gitlab,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Github => "github",
            Provider::Gitlab => "gitlab",
        }
    }

    pub fn flavor(&self) -> &'static dyn ProviderFlavor {
        match self {
            Provider::Github => &GithubFlavor,
            Provider::Gitlab => &GitlabFlavor,
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "github" => Ok(Provider::Github),
            "gitlab" => Ok(Provider::Gitlab),
            _ => Err(ConfigError::UnknownProvider(s.to_string())),
        }
    }
}

/// How often a source is crawled and how long one cycle may take.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schedule {
    pub frequency: Duration,
    pub timeout: Duration,
    pub initial_delay: Option<Duration>,
}

/// One crawlable unit: an organization on a host of a provider, in one environment.
///
/// Built once from static configuration and never mutated afterwards.
#[derive(Debug, Clone)]
pub struct SourceConfig {
    pub env: String,
    pub provider: Provider,
    pub host: String,
    pub organization: String,
    pub host_label: String,
    pub enabled: bool,
    pub branches: Vec<String>,
    pub tag_patterns: Vec<String>,
    pub manifest_paths: Vec<String>,
    pub crawl_depth: u32,
    pub schedule: Schedule,
}

impl SourceConfig {
    /// A source with default discovery settings; adjust with the `with_*` methods.
    pub fn new(
        env: impl Into<String>,
        provider: Provider,
        host: impl Into<String>,
        organization: impl Into<String>,
        schedule: Schedule,
    ) -> Self {
        let host = host.into();
        Self {
            env: env.into(),
            provider,
            host_label: host.clone(),
            host,
            organization: organization.into(),
            enabled: true,
            branches: Vec::new(),
            tag_patterns: Vec::new(),
            manifest_paths: Vec::new(),
            crawl_depth: DEFAULT_CRAWL_DEPTH,
            schedule,
        }
    }

    pub fn with_host_label(mut self, label: impl Into<String>) -> Self {
        self.host_label = label.into();
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_branches(mut self, branches: Vec<String>) -> Self {
        self.branches = branches;
        self
    }

    pub fn with_tag_patterns(mut self, patterns: Vec<String>) -> Self {
        self.tag_patterns = patterns;
        self
    }

    pub fn with_manifest_paths(mut self, paths: Vec<String>) -> Self {
        self.manifest_paths = paths;
        self
    }

    pub fn with_crawl_depth(mut self, depth: u32) -> Self {
        self.crawl_depth = depth;
        self
    }

    /// Stable identifier `env:provider:host:organization`.
    pub fn source_id(&self) -> String {
        format!(
            "{}:{}:{}:{}",
            self.env, self.provider, self.host, self.organization
        )
    }

    /// Key under which this source's entities are stored in the catalog.
    pub fn location_key(&self) -> String {
        format!("{}:{}", LOCATION_KEY_PREFIX, self.source_id())
    }

    pub fn discovery_options(&self) -> DiscoveryOptions {
        DiscoveryOptions {
            branches: self.branches.clone(),
            tag_patterns: self.tag_patterns.clone(),
        }
    }

    /// Rejects settings that would make every crawl of this source a no-op.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.crawl_depth == 0 {
            return Err(ConfigError::InvalidCrawlDepth(self.source_id()));
        }
        Ok(())
    }

    pub fn trace_loaded(&self) {
        info!(
            source_id = %self.source_id(),
            enabled = self.enabled,
            crawl_depth = self.crawl_depth,
            "Loaded SCM source"
        );
        debug!(?self, "SCM source loaded (full debug)");
    }
}

/// The four segments of a stable source identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceIdParts {
    pub env: String,
    pub provider: String,
    pub host: String,
    pub organization: String,
}

impl SourceIdParts {
    /// Splits `env:provider:host:organization`.
    ///
    /// Everything after the third colon belongs to the organization. Missing
    /// segments become `"unknown"`.
    pub fn parse(source_id: &str) -> Self {
        let segments: Vec<&str> = source_id.split(':').collect();
        if segments.len() < 4 {
            warn!(
                source_id,
                segments = segments.len(),
                "Source id has fewer than 4 segments, substituting 'unknown'"
            );
        }
        let segment = |i: usize| {
            segments
                .get(i)
                .map(|s| s.to_string())
                .unwrap_or_else(|| "unknown".to_string())
        };
        let organization = if segments.len() > 3 {
            segments[3..].join(":")
        } else {
            "unknown".to_string()
        };
        Self {
            env: segment(0),
            provider: segment(1),
            host: segment(2),
            organization,
        }
    }
}
