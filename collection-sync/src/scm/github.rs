//! GitHub REST v3 client for one organization.

use async_trait::async_trait;
use collection_sync_core::contract::{DirectoryEntry, RepositoryInfo, ScmClient};
use collection_sync_core::error::ScmError;
use serde::Deserialize;
use tracing::{debug, info};

use super::{encode_path, with_query, HttpApi};

const JSON: &str = "application/vnd.github+json";
const RAW: &str = "application/vnd.github.raw";

#[derive(Debug, Deserialize)]
struct Repo {
    name: String,
    full_name: String,
    default_branch: Option<String>,
    html_url: String,
    description: Option<String>,
    #[serde(default)]
    archived: bool,
}

#[derive(Debug, Deserialize)]
struct NamedRef {
    name: String,
}

#[derive(Debug, Deserialize)]
struct Content {
    path: String,
    #[serde(rename = "type")]
    kind: String,
}

pub struct GithubClient {
    api: HttpApi,
    host: String,
    organization: String,
}

impl GithubClient {
    pub fn new(api: HttpApi, host: &str, organization: &str) -> Self {
        Self {
            api,
            host: host.to_string(),
            organization: organization.to_string(),
        }
    }

    fn contents_path(repo: &RepositoryInfo, git_ref: &str, path: &str) -> String {
        let base = format!("/repos/{}/contents", encode_path(&repo.full_path));
        let path = encode_path(path);
        let base = if path.is_empty() {
            base
        } else {
            format!("{}/{}", base, path)
        };
        with_query(&base, "ref", &urlencoding::encode(git_ref))
    }
}

#[async_trait]
impl ScmClient for GithubClient {
    async fn list_repositories(&self) -> Result<Vec<RepositoryInfo>, ScmError> {
        let org = urlencoding::encode(&self.organization);
        let repos: Vec<Repo> = match self
            .api
            .get_paged(&format!("/orgs/{}/repos?type=all", org), JSON)
            .await
        {
            Err(ScmError::NotFound(_)) => {
                // Personal accounts are not organizations.
                debug!(owner = %self.organization, "Organization not found, listing user repositories");
                self.api
                    .get_paged(&format!("/users/{}/repos?type=owner", org), JSON)
                    .await?
            }
            other => other?,
        };

        let total = repos.len();
        let listed: Vec<RepositoryInfo> = repos
            .into_iter()
            .filter(|r| !r.archived)
            .map(|r| RepositoryInfo {
                name: r.name,
                full_path: r.full_name,
                default_branch: r.default_branch.unwrap_or_else(|| "main".to_string()),
                url: r.html_url,
                description: r.description,
            })
            .collect();
        info!(
            host = %self.host,
            org = %self.organization,
            repositories = listed.len(),
            archived = total - listed.len(),
            "Listed GitHub repositories"
        );
        Ok(listed)
    }

    async fn list_branches(&self, repo: &RepositoryInfo) -> Result<Vec<String>, ScmError> {
        let branches: Vec<NamedRef> = self
            .api
            .get_paged(&format!("/repos/{}/branches", encode_path(&repo.full_path)), JSON)
            .await?;
        Ok(branches.into_iter().map(|b| b.name).collect())
    }

    async fn list_tags(&self, repo: &RepositoryInfo) -> Result<Vec<String>, ScmError> {
        let tags: Vec<NamedRef> = self
            .api
            .get_paged(&format!("/repos/{}/tags", encode_path(&repo.full_path)), JSON)
            .await?;
        Ok(tags.into_iter().map(|t| t.name).collect())
    }

    async fn list_directory(
        &self,
        repo: &RepositoryInfo,
        git_ref: &str,
        path: &str,
    ) -> Result<Vec<DirectoryEntry>, ScmError> {
        let contents: Vec<Content> = self
            .api
            .get_json(&Self::contents_path(repo, git_ref, path), JSON)
            .await?;
        Ok(contents
            .into_iter()
            .filter_map(|c| match c.kind.as_str() {
                "dir" => Some(DirectoryEntry::dir(&c.path)),
                "file" => Some(DirectoryEntry::file(&c.path)),
                // symlinks and submodules are not followed
                _ => None,
            })
            .collect())
    }

    async fn read_file(
        &self,
        repo: &RepositoryInfo,
        git_ref: &str,
        path: &str,
    ) -> Result<String, ScmError> {
        self.api
            .get_text(&Self::contents_path(repo, git_ref, path), RAW)
            .await
    }
}
