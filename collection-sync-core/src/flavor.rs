//! Provider-specific vocabulary and URL shapes.
//!
//! The traversal algorithm is the same for every provider; only the strings it
//! logs and the browser URLs it records differ. Each provider supplies a
//! [`ProviderFlavor`] instead of its own crawler.

use crate::config::Provider;

pub trait ProviderFlavor: Send + Sync {
    fn provider(&self) -> Provider;

    /// What the provider calls a repository ("repository", "project").
    fn repository_label(&self) -> &'static str;

    /// Browser URL of a repository.
    fn repository_url(&self, host: &str, full_path: &str) -> String;

    /// Browser URL of a directory at a ref.
    fn tree_url(&self, host: &str, full_path: &str, git_ref: &str, path: &str) -> String;

    /// Browser URL of a file at a ref.
    fn blob_url(&self, host: &str, full_path: &str, git_ref: &str, path: &str) -> String;
}

pub struct GithubFlavor;

impl ProviderFlavor for GithubFlavor {
    fn provider(&self) -> Provider {
        Provider::Github
    }

    fn repository_label(&self) -> &'static str {
        "repository"
    }

    fn repository_url(&self, host: &str, full_path: &str) -> String {
        format!("https://{}/{}", host, full_path)
    }

    fn tree_url(&self, host: &str, full_path: &str, git_ref: &str, path: &str) -> String {
        join_url(&format!("https://{}/{}/tree/{}", host, full_path, git_ref), path)
    }

    fn blob_url(&self, host: &str, full_path: &str, git_ref: &str, path: &str) -> String {
        join_url(&format!("https://{}/{}/blob/{}", host, full_path, git_ref), path)
    }
}

pub struct GitlabFlavor;

impl ProviderFlavor for GitlabFlavor {
    fn provider(&self) -> Provider {
        Provider::Gitlab
    }

    fn repository_label(&self) -> &'static str {
        "project"
    }

    fn repository_url(&self, host: &str, full_path: &str) -> String {
        format!("https://{}/{}", host, full_path)
    }

    fn tree_url(&self, host: &str, full_path: &str, git_ref: &str, path: &str) -> String {
        join_url(&format!("https://{}/{}/-/tree/{}", host, full_path, git_ref), path)
    }

    fn blob_url(&self, host: &str, full_path: &str, git_ref: &str, path: &str) -> String {
        join_url(&format!("https://{}/{}/-/blob/{}", host, full_path, git_ref), path)
    }
}

fn join_url(base: &str, path: &str) -> String {
    let path = path.trim_matches('/');
    if path.is_empty() {
        base.to_string()
    } else {
        format!("{}/{}", base, path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gitlab_urls_use_dash_segment() {
        let url = GitlabFlavor.blob_url("gitlab.com", "grp/proj", "v1.0.0", "/galaxy.yml");
        assert_eq!(url, "https://gitlab.com/grp/proj/-/blob/v1.0.0/galaxy.yml");
    }

    #[test]
    fn github_tree_url_of_root_has_no_trailing_slash() {
        let url = GithubFlavor.tree_url("github.com", "org/repo", "main", "");
        assert_eq!(url, "https://github.com/org/repo/tree/main");
    }
}
