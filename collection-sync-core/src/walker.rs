//! Depth-bounded directory traversal collecting manifest candidates.

use futures::future::{join_all, BoxFuture};
use futures::FutureExt;
use tracing::{debug, trace, warn};

use crate::contract::{EntryKind, RepositoryInfo, ScmClient};
use crate::error::ScmError;

/// File names recognized as collection manifests (compared lowercase).
pub const MANIFEST_FILENAMES: [&str; 2] = ["galaxy.yml", "galaxy.yaml"];

/// Directory names never descended into (compared lowercase).
pub const SKIP_DIRECTORIES: &[&str] = &[
    ".git",
    ".github",
    ".gitlab",
    ".tox",
    ".venv",
    "venv",
    ".cache",
    "__pycache__",
    "node_modules",
    "build",
    "dist",
    "target",
    "docs",
    "tests",
    "test",
];

pub fn is_manifest_file(name: &str) -> bool {
    let lower = name.to_lowercase();
    MANIFEST_FILENAMES.contains(&lower.as_str())
}

pub fn is_skipped_dir(name: &str) -> bool {
    let lower = name.to_lowercase();
    SKIP_DIRECTORIES.contains(&lower.as_str())
}

/// Result of walking one repository at one ref from one start path.
#[derive(Debug, Default)]
pub struct WalkResult {
    pub candidates: Vec<String>,
    /// Set when the start path itself could not be listed.
    pub root_error: Option<ScmError>,
}

pub struct DirectoryWalker<'a> {
    client: &'a dyn ScmClient,
    label: &'static str,
}

impl<'a> DirectoryWalker<'a> {
    pub fn new(client: &'a dyn ScmClient, label: &'static str) -> Self {
        Self { client, label }
    }

    /// Collects manifest candidate paths below `start_path` (empty = root).
    ///
    /// `depth` counts directory listings: 0 lists nothing, 1 lists only the
    /// start path. Failures below the start path drop that subtree only.
    pub async fn find_manifests(
        &self,
        repo: &RepositoryInfo,
        git_ref: &str,
        start_path: &str,
        depth: u32,
    ) -> WalkResult {
        let start = start_path.trim_matches('/').to_string();
        match self.walk(repo, git_ref, start, depth, true).await {
            Ok(candidates) => WalkResult {
                candidates,
                root_error: None,
            },
            Err(e) => WalkResult {
                candidates: Vec::new(),
                root_error: Some(e),
            },
        }
    }

    fn walk<'b>(
        &'b self,
        repo: &'b RepositoryInfo,
        git_ref: &'b str,
        path: String,
        depth: u32,
        is_root: bool,
    ) -> BoxFuture<'b, Result<Vec<String>, ScmError>> {
        async move {
            if depth == 0 {
                trace!(repo = %repo.full_path, path = %path, "Depth limit reached");
                return Ok(Vec::new());
            }

            let entries = match self.client.list_directory(repo, git_ref, &path).await {
                Ok(entries) => entries,
                Err(e) if is_root => {
                    warn!(
                        repo = %repo.full_path,
                        git_ref,
                        path = %path,
                        error = %e,
                        "Failed to list {} root, skipping this ref",
                        self.label
                    );
                    return Err(e);
                }
                Err(e) => {
                    debug!(
                        repo = %repo.full_path,
                        git_ref,
                        path = %path,
                        error = %e,
                        "Failed to list subdirectory, skipping subtree"
                    );
                    return Ok(Vec::new());
                }
            };

            if is_root && entries.is_empty() {
                warn!(
                    repo = %repo.full_path,
                    git_ref,
                    path = %path,
                    "Empty listing at {} root, the SCM client may be misbehaving",
                    self.label
                );
            }

            let mut candidates = Vec::new();
            let mut subdirs = Vec::new();
            for entry in entries {
                match entry.kind {
                    EntryKind::File if is_manifest_file(&entry.name) => {
                        debug!(repo = %repo.full_path, git_ref, path = %entry.path, "Found manifest candidate");
                        candidates.push(entry.path);
                    }
                    EntryKind::File => {}
                    EntryKind::Dir if is_skipped_dir(&entry.name) => {
                        trace!(repo = %repo.full_path, path = %entry.path, "Skipping directory");
                    }
                    EntryKind::Dir => subdirs.push(entry.path),
                }
            }

            let nested = join_all(
                subdirs
                    .into_iter()
                    .map(|dir| self.walk(repo, git_ref, dir, depth - 1, false)),
            )
            .await;
            for subtree in nested {
                // non-root walks never return Err
                candidates.extend(subtree.unwrap_or_default());
            }
            Ok(candidates)
        }
        .boxed()
    }
}
