//! GitLab REST v4 client for one group (subgroups included).

use async_trait::async_trait;
use collection_sync_core::contract::{DirectoryEntry, RepositoryInfo, ScmClient};
use collection_sync_core::error::ScmError;
use serde::Deserialize;
use tracing::info;

use super::{with_query, HttpApi};

const JSON: &str = "application/json";

#[derive(Debug, Deserialize)]
struct Project {
    name: String,
    path_with_namespace: String,
    default_branch: Option<String>,
    web_url: String,
    description: Option<String>,
    #[serde(default)]
    empty_repo: bool,
}

#[derive(Debug, Deserialize)]
struct NamedRef {
    name: String,
}

#[derive(Debug, Deserialize)]
struct TreeEntry {
    path: String,
    #[serde(rename = "type")]
    kind: String,
}

pub struct GitlabClient {
    api: HttpApi,
    host: String,
    group: String,
}

impl GitlabClient {
    pub fn new(api: HttpApi, host: &str, group: &str) -> Self {
        Self {
            api,
            host: host.to_string(),
            group: group.to_string(),
        }
    }

    /// Projects are addressed by their URL-encoded full path.
    fn project(repo: &RepositoryInfo) -> String {
        format!("/projects/{}", urlencoding::encode(&repo.full_path))
    }
}

#[async_trait]
impl ScmClient for GitlabClient {
    async fn list_repositories(&self) -> Result<Vec<RepositoryInfo>, ScmError> {
        let projects: Vec<Project> = self
            .api
            .get_paged(
                &format!(
                    "/groups/{}/projects?include_subgroups=true&archived=false",
                    urlencoding::encode(&self.group)
                ),
                JSON,
            )
            .await?;

        let listed: Vec<RepositoryInfo> = projects
            .into_iter()
            .filter(|p| !p.empty_repo)
            .map(|p| RepositoryInfo {
                name: p.name,
                full_path: p.path_with_namespace,
                default_branch: p.default_branch.unwrap_or_else(|| "main".to_string()),
                url: p.web_url,
                description: p.description,
            })
            .collect();
        info!(
            host = %self.host,
            group = %self.group,
            projects = listed.len(),
            "Listed GitLab projects"
        );
        Ok(listed)
    }

    async fn list_branches(&self, repo: &RepositoryInfo) -> Result<Vec<String>, ScmError> {
        let branches: Vec<NamedRef> = self
            .api
            .get_paged(&format!("{}/repository/branches", Self::project(repo)), JSON)
            .await?;
        Ok(branches.into_iter().map(|b| b.name).collect())
    }

    async fn list_tags(&self, repo: &RepositoryInfo) -> Result<Vec<String>, ScmError> {
        let tags: Vec<NamedRef> = self
            .api
            .get_paged(&format!("{}/repository/tags", Self::project(repo)), JSON)
            .await?;
        Ok(tags.into_iter().map(|t| t.name).collect())
    }

    async fn list_directory(
        &self,
        repo: &RepositoryInfo,
        git_ref: &str,
        path: &str,
    ) -> Result<Vec<DirectoryEntry>, ScmError> {
        let mut query = with_query(
            &format!("{}/repository/tree", Self::project(repo)),
            "ref",
            &urlencoding::encode(git_ref),
        );
        let path = path.trim_matches('/');
        if !path.is_empty() {
            query = with_query(&query, "path", &urlencoding::encode(path));
        }
        let entries: Vec<TreeEntry> = self.api.get_paged(&query, JSON).await?;
        Ok(entries
            .into_iter()
            .filter_map(|e| match e.kind.as_str() {
                "tree" => Some(DirectoryEntry::dir(&e.path)),
                "blob" => Some(DirectoryEntry::file(&e.path)),
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
        let query = with_query(
            &format!(
                "{}/repository/files/{}/raw",
                Self::project(repo),
                urlencoding::encode(path.trim_matches('/'))
            ),
            "ref",
            &urlencoding::encode(git_ref),
        );
        self.api.get_text(&query, "text/plain").await
    }
}
