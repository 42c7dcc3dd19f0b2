//! Collection identity and within-crawl deduplication.

use std::collections::HashSet;
use std::fmt;

use tracing::debug;

use crate::config::{Provider, SourceConfig};
use crate::manifest::{CollectionMetadata, DiscoveredItem};

/// Identity of one logical collection as seen from one source.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CollectionIdentifier {
    pub provider: Provider,
    pub host: String,
    pub organization: String,
    pub namespace: String,
    pub name: String,
    pub version: String,
}

impl CollectionIdentifier {
    pub fn new(source: &SourceConfig, metadata: &CollectionMetadata) -> Self {
        Self {
            provider: source.provider,
            host: source.host.clone(),
            organization: source.organization.clone(),
            namespace: metadata.namespace.clone(),
            name: metadata.name.clone(),
            version: metadata.version.clone(),
        }
    }

    /// `provider:host:organization:namespace.name@version`
    pub fn dedup_key(&self) -> String {
        format!(
            "{}:{}:{}:{}.{}@{}",
            self.provider, self.host, self.organization, self.namespace, self.name, self.version
        )
    }
}

impl fmt::Display for CollectionIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.dedup_key())
    }
}

/// Collapses items that share a dedup key, keeping the first one seen.
///
/// Versions are part of the key, so different versions of the same
/// collection are all kept.
pub fn deduplicate(source: &SourceConfig, items: Vec<DiscoveredItem>) -> Vec<DiscoveredItem> {
    let mut seen = HashSet::new();
    let total = items.len();
    let unique: Vec<DiscoveredItem> = items
        .into_iter()
        .filter(|item| {
            let key = CollectionIdentifier::new(source, &item.metadata).dedup_key();
            let first = seen.insert(key.clone());
            if !first {
                debug!(
                    dedup_key = %key,
                    repo = %item.repository.full_path,
                    git_ref = %item.git_ref,
                    path = %item.path,
                    "Dropping duplicate discovery"
                );
            }
            first
        })
        .collect();
    debug!(
        source_id = %source.source_id(),
        discovered = total,
        unique = unique.len(),
        "Deduplicated discoveries"
    );
    unique
}
