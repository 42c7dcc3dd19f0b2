#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tokio::sync::watch;

use collection_sync_core::config::{Provider, Schedule, SourceConfig};
use collection_sync_core::contract::{DirectoryEntry, RepositoryInfo, ScmClient};
use collection_sync_core::error::ScmError;

pub fn schedule() -> Schedule {
    Schedule {
        frequency: Duration::from_secs(3600),
        timeout: Duration::from_secs(600),
        initial_delay: None,
    }
}

pub fn source(provider: Provider, host: &str, org: &str) -> SourceConfig {
    SourceConfig::new("test", provider, host, org, schedule())
}

pub fn galaxy_yml(namespace: &str, name: &str, version: &str) -> String {
    format!(
        "namespace: {namespace}\nname: {name}\nversion: {version}\ntags:\n  - infra\n  - Infra\nauthors:\n  - Someone\n"
    )
}

/// In-memory repository: files keyed by `(ref, path)`.
#[derive(Clone, Default)]
pub struct FakeRepo {
    pub info: RepositoryInfo,
    pub branches: Vec<String>,
    pub tags: Vec<String>,
    pub files: BTreeMap<(String, String), String>,
    pub failing_dirs: HashSet<(String, String)>,
    pub fail_refs: bool,
}

impl FakeRepo {
    pub fn new(org: &str, name: &str) -> Self {
        Self {
            info: RepositoryInfo {
                name: name.to_string(),
                full_path: format!("{}/{}", org, name),
                default_branch: "main".to_string(),
                url: format!("https://github.com/{}/{}", org, name),
                description: Some(format!("{} repository", name)),
            },
            branches: vec!["main".to_string()],
            ..Default::default()
        }
    }

    pub fn file(mut self, git_ref: &str, path: &str, content: &str) -> Self {
        self.files
            .insert((git_ref.to_string(), path.to_string()), content.to_string());
        self
    }

    pub fn branch(mut self, name: &str) -> Self {
        self.branches.push(name.to_string());
        self
    }

    pub fn tag(mut self, name: &str) -> Self {
        self.tags.push(name.to_string());
        self
    }

    pub fn failing_dir(mut self, git_ref: &str, path: &str) -> Self {
        self.failing_dirs
            .insert((git_ref.to_string(), path.to_string()));
        self
    }

    fn list(&self, git_ref: &str, path: &str) -> Result<Vec<DirectoryEntry>, ScmError> {
        if self
            .failing_dirs
            .contains(&(git_ref.to_string(), path.to_string()))
        {
            return Err(ScmError::Status {
                url: format!("{}/{}", self.info.full_path, path),
                status: 500,
            });
        }
        let prefix = if path.is_empty() {
            String::new()
        } else {
            format!("{}/", path)
        };
        let mut files = BTreeSet::new();
        let mut dirs = BTreeSet::new();
        for (file_ref, file_path) in self.files.keys() {
            if file_ref != git_ref {
                continue;
            }
            let Some(rest) = file_path.strip_prefix(&prefix) else {
                continue;
            };
            match rest.split_once('/') {
                Some((dir, _)) => {
                    dirs.insert(format!("{}{}", prefix, dir));
                }
                None => {
                    files.insert(format!("{}{}", prefix, rest));
                }
            }
        }
        if files.is_empty() && dirs.is_empty() && !path.is_empty() {
            return Err(ScmError::NotFound(path.to_string()));
        }
        Ok(dirs
            .iter()
            .map(|d| DirectoryEntry::dir(d))
            .chain(files.iter().map(|f| DirectoryEntry::file(f)))
            .collect())
    }
}

/// Scriptable SCM double that records directory listings.
pub struct FakeScm {
    repos: RwLock<Vec<FakeRepo>>,
    fail_repository_listing: Mutex<bool>,
    gate: Option<watch::Receiver<bool>>,
    pub listed: Mutex<Vec<(String, String, String)>>,
}

impl FakeScm {
    pub fn new(repos: Vec<FakeRepo>) -> Self {
        Self {
            repos: RwLock::new(repos),
            fail_repository_listing: Mutex::new(false),
            gate: None,
            listed: Mutex::new(Vec::new()),
        }
    }

    /// Blocks `list_repositories` until the returned sender publishes `true`.
    pub fn gated(repos: Vec<FakeRepo>) -> (Self, watch::Sender<bool>) {
        let (tx, rx) = watch::channel(false);
        let mut scm = Self::new(repos);
        scm.gate = Some(rx);
        (scm, tx)
    }

    pub fn set_repos(&self, repos: Vec<FakeRepo>) {
        *self.repos.write() = repos;
    }

    pub fn fail_repository_listing(&self, fail: bool) {
        *self.fail_repository_listing.lock() = fail;
    }

    pub fn listed_paths(&self) -> Vec<String> {
        self.listed.lock().iter().map(|(_, _, p)| p.clone()).collect()
    }

    fn repo(&self, info: &RepositoryInfo) -> Result<FakeRepo, ScmError> {
        self.repos
            .read()
            .iter()
            .find(|r| r.info.full_path == info.full_path)
            .cloned()
            .ok_or_else(|| ScmError::NotFound(info.full_path.clone()))
    }
}

#[async_trait]
impl ScmClient for FakeScm {
    async fn list_repositories(&self) -> Result<Vec<RepositoryInfo>, ScmError> {
        if let Some(gate) = &self.gate {
            let mut gate = gate.clone();
            loop {
                let open = *gate.borrow_and_update();
                if open || gate.changed().await.is_err() {
                    break;
                }
            }
        }
        if *self.fail_repository_listing.lock() {
            return Err(ScmError::Status {
                url: "https://scm.example/orgs".into(),
                status: 503,
            });
        }
        Ok(self.repos.read().iter().map(|r| r.info.clone()).collect())
    }

    async fn list_branches(&self, repo: &RepositoryInfo) -> Result<Vec<String>, ScmError> {
        let repo = self.repo(repo)?;
        if repo.fail_refs {
            return Err(ScmError::Other("branch listing exploded".into()));
        }
        Ok(repo.branches)
    }

    async fn list_tags(&self, repo: &RepositoryInfo) -> Result<Vec<String>, ScmError> {
        let repo = self.repo(repo)?;
        if repo.fail_refs {
            return Err(ScmError::Other("tag listing exploded".into()));
        }
        Ok(repo.tags)
    }

    async fn list_directory(
        &self,
        repo: &RepositoryInfo,
        git_ref: &str,
        path: &str,
    ) -> Result<Vec<DirectoryEntry>, ScmError> {
        self.listed.lock().push((
            repo.full_path.clone(),
            git_ref.to_string(),
            path.to_string(),
        ));
        self.repo(repo)?.list(git_ref, path)
    }

    async fn read_file(
        &self,
        repo: &RepositoryInfo,
        git_ref: &str,
        path: &str,
    ) -> Result<String, ScmError> {
        self.repo(repo)?
            .files
            .get(&(git_ref.to_string(), path.to_string()))
            .cloned()
            .ok_or_else(|| ScmError::NotFound(path.to_string()))
    }
}

pub fn shared(scm: FakeScm) -> Arc<FakeScm> {
    Arc::new(scm)
}

/// Polls until `check` holds, failing the test after two seconds.
pub async fn eventually(mut check: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !check() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not reached in time"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
