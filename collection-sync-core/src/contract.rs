//! # contract: interfaces to the systems the sync engine talks to
//!
//! The engine never reaches an SCM host, a catalog or a schema directly. It
//! goes through the three traits below, which are implemented by real clients
//! in the binary crate and by `mockall` mocks in tests.
//!
//! ## Interfaces
//! - [`ScmClient`]: one `(provider, host, organization)`; lists repositories,
//!   branches, tags and directories, and reads raw file content.
//! - [`CatalogSink`]: accepts the complete entity set for a location key.
//! - [`ManifestValidator`]: turns parsed manifest data into [`CollectionMetadata`].
//!
//! ## Mocking & Testing
//! - All traits are annotated for `mockall` (`MockScmClient`, `MockCatalogSink`,
//!   `MockManifestValidator`) when the `test-export-mocks` feature is enabled.

use async_trait::async_trait;
#[cfg(any(test, feature = "test-export-mocks"))]
use mockall::automock;
use serde::{Deserialize, Serialize};

use crate::entity::EntityDescriptor;
use crate::error::{ScmError, SinkError, ValidationError};
use crate::manifest::CollectionMetadata;

/// A repository (GitHub) or project (GitLab) as reported by the SCM host.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryInfo {
    /// Short name, e.g. `ansible-collections`.
    pub name: String,
    /// Owner-qualified path, e.g. `my-org/ansible-collections`.
    pub full_path: String,
    pub default_branch: String,
    /// Browser URL of the repository.
    pub url: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Dir,
}

/// One entry of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryEntry {
    pub name: String,
    /// Path relative to the repository root, without a leading slash.
    pub path: String,
    pub kind: EntryKind,
}

impl DirectoryEntry {
    pub fn file(path: &str) -> Self {
        Self::new(path, EntryKind::File)
    }

    pub fn dir(path: &str) -> Self {
        Self::new(path, EntryKind::Dir)
    }

    fn new(path: &str, kind: EntryKind) -> Self {
        let path = path.trim_matches('/').to_string();
        let name = path.rsplit('/').next().unwrap_or_default().to_string();
        Self { name, path, kind }
    }
}

/// Read access to the repositories of one organization on one SCM host.
///
/// Implementations own URL building, authentication and pagination. Every
/// method is a suspension point for the crawler and may be called
/// concurrently for different repositories.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait ScmClient: Send + Sync {
    /// List every repository in the organization.
    async fn list_repositories(&self) -> Result<Vec<RepositoryInfo>, ScmError>;

    /// List branch names of a repository.
    async fn list_branches(&self, repo: &RepositoryInfo) -> Result<Vec<String>, ScmError>;

    /// List tag names of a repository.
    async fn list_tags(&self, repo: &RepositoryInfo) -> Result<Vec<String>, ScmError>;

    /// List a directory at `git_ref`. An empty `path` is the repository root.
    async fn list_directory(
        &self,
        repo: &RepositoryInfo,
        git_ref: &str,
        path: &str,
    ) -> Result<Vec<DirectoryEntry>, ScmError>;

    /// Read the raw content of a file at `git_ref`.
    async fn read_file(
        &self,
        repo: &RepositoryInfo,
        git_ref: &str,
        path: &str,
    ) -> Result<String, ScmError>;
}

/// Destination for discovered entities.
///
/// A mutation declares the complete entity set for `location_key`; anything
/// previously stored under that key and absent from `entities` is removed.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait CatalogSink: Send + Sync {
    async fn apply_full_mutation(
        &self,
        location_key: &str,
        entities: Vec<EntityDescriptor>,
    ) -> Result<(), SinkError>;
}

/// Schema check for parsed manifest data.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
pub trait ManifestValidator: Send + Sync {
    fn validate(&self, data: &serde_json::Value) -> Result<CollectionMetadata, ValidationError>;
}
