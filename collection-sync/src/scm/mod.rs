//! # SCM clients (reqwest)
//!
//! Concrete [`ScmClient`] implementations for GitHub REST v3 ([`github`]) and
//! GitLab REST v4 ([`gitlab`]). Both share [`HttpApi`] for authentication,
//! status mapping and pagination, so that the provider modules only describe
//! endpoints and payload shapes.
//!
//! Use [`client_for`] to build the client that matches a resolved [`SourceSpec`].

use std::sync::Arc;

use collection_sync_core::config::Provider;
use collection_sync_core::contract::ScmClient;
use collection_sync_core::error::ScmError;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, LINK, USER_AGENT};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::load_config::SourceSpec;

pub mod github;
pub mod gitlab;

pub use github::GithubClient;
pub use gitlab::GitlabClient;

pub const PAGE_SIZE: usize = 100;

/// Upper bound on followed pages per listing.
pub const MAX_PAGES: usize = 50;

const CLIENT_USER_AGENT: &str = concat!("collection-sync/", env!("CARGO_PKG_VERSION"));

/// How a token is presented to the host.
#[derive(Debug, Clone)]
pub enum Auth {
    Anonymous,
    /// `Authorization: Bearer <token>` (GitHub).
    Bearer(String),
    /// `PRIVATE-TOKEN: <token>` (GitLab).
    PrivateToken(String),
}

/// Thin JSON-over-HTTP wrapper around one API root.
#[derive(Debug, Clone)]
pub struct HttpApi {
    client: reqwest::Client,
    base_url: String,
    auth: Auth,
}

impl HttpApi {
    pub fn new(base_url: &str, auth: Auth) -> Result<Self, ScmError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| ScmError::Transport {
                url: base_url.to_string(),
                message: e.to_string(),
            })?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            auth,
        })
    }

    pub fn url(&self, path_and_query: &str) -> String {
        format!("{}{}", self.base_url, path_and_query)
    }

    fn headers(&self, accept: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(CLIENT_USER_AGENT));
        if let Ok(value) = HeaderValue::from_str(accept) {
            headers.insert(ACCEPT, value);
        }
        match &self.auth {
            Auth::Anonymous => {}
            Auth::Bearer(token) => {
                if let Ok(value) = HeaderValue::from_str(&format!("Bearer {}", token)) {
                    headers.insert(AUTHORIZATION, value);
                }
            }
            Auth::PrivateToken(token) => {
                if let Ok(value) = HeaderValue::from_str(token) {
                    headers.insert("private-token", value);
                }
            }
        }
        headers
    }

    async fn send(&self, url: &str, accept: &str) -> Result<reqwest::Response, ScmError> {
        debug!(url, "SCM request");
        let response = self
            .client
            .get(url)
            .headers(self.headers(accept))
            .send()
            .await
            .map_err(|e| ScmError::Transport {
                url: url.to_string(),
                message: e.to_string(),
            })?;
        match response.status() {
            status if status.is_success() => Ok(response),
            StatusCode::NOT_FOUND => Err(ScmError::NotFound(url.to_string())),
            status => Err(ScmError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            }),
        }
    }

    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path_and_query: &str,
        accept: &str,
    ) -> Result<T, ScmError> {
        let url = self.url(path_and_query);
        let response = self.send(&url, accept).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| ScmError::Decode(format!("{}: {}", url, e)))
    }

    pub async fn get_text(&self, path_and_query: &str, accept: &str) -> Result<String, ScmError> {
        let url = self.url(path_and_query);
        let response = self.send(&url, accept).await?;
        response
            .text()
            .await
            .map_err(|e| ScmError::Decode(format!("{}: {}", url, e)))
    }

    /// Collects every page of a JSON array listing by following `Link: rel="next"`
    /// (or GitLab's `X-Next-Page`).
    pub async fn get_paged<T: DeserializeOwned>(
        &self,
        path_and_query: &str,
        accept: &str,
    ) -> Result<Vec<T>, ScmError> {
        let mut url = self.url(&with_query(path_and_query, "per_page", &PAGE_SIZE.to_string()));
        let mut items = Vec::new();
        for _ in 0..MAX_PAGES {
            let response = self.send(&url, accept).await?;
            let next = next_page_url(response.headers(), &url);
            let page: Vec<T> = response
                .json()
                .await
                .map_err(|e| ScmError::Decode(format!("{}: {}", url, e)))?;
            items.extend(page);
            match next {
                Some(next) => url = next,
                None => return Ok(items),
            }
        }
        warn!(url = %url, max_pages = MAX_PAGES, "Stopped following pagination");
        Ok(items)
    }
}

/// Appends `key=value` to a path that may already carry a query string.
pub fn with_query(path: &str, key: &str, value: &str) -> String {
    let separator = if path.contains('?') { '&' } else { '?' };
    format!("{}{}{}={}", path, separator, key, value)
}

/// Percent-encodes every segment of a repository path, keeping the slashes.
pub fn encode_path(path: &str) -> String {
    path.trim_matches('/')
        .split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

fn next_page_url(headers: &HeaderMap, current: &str) -> Option<String> {
    if let Some(link) = headers.get(LINK).and_then(|v| v.to_str().ok()) {
        if let Some(next) = parse_next_link(link) {
            return Some(next);
        }
    }
    let page = headers
        .get("x-next-page")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|p| !p.is_empty())?;
    Some(replace_query(current, "page", page))
}

/// Extracts the `rel="next"` target of an RFC 8288 `Link` header.
pub fn parse_next_link(header: &str) -> Option<String> {
    header.split(',').find_map(|part| {
        let mut pieces = part.split(';');
        let target = pieces.next()?.trim();
        let is_next = pieces.any(|p| {
            let p = p.trim();
            p == "rel=\"next\"" || p == "rel=next"
        });
        if is_next {
            Some(target.trim_start_matches('<').trim_end_matches('>').to_string())
        } else {
            None
        }
    })
}

fn replace_query(url: &str, key: &str, value: &str) -> String {
    let (base, query) = match url.split_once('?') {
        Some((base, query)) => (base, query),
        None => (url, ""),
    };
    let mut pairs: Vec<String> = query
        .split('&')
        .filter(|p| !p.is_empty() && p.split('=').next() != Some(key))
        .map(str::to_string)
        .collect();
    pairs.push(format!("{}={}", key, value));
    format!("{}?{}", base, pairs.join("&"))
}

/// Builds the SCM client for a resolved source.
pub fn client_for(spec: &SourceSpec) -> Result<Arc<dyn ScmClient>, ScmError> {
    let organization = spec.config.organization.as_str();
    match spec.config.provider {
        Provider::Github => {
            let auth = spec.token.clone().map_or(Auth::Anonymous, Auth::Bearer);
            Ok(Arc::new(GithubClient::new(
                HttpApi::new(&spec.api_base_url, auth)?,
                &spec.config.host,
                organization,
            )))
        }
        Provider::Gitlab => {
            let auth = spec
                .token
                .clone()
                .map_or(Auth::Anonymous, Auth::PrivateToken);
            Ok(Arc::new(GitlabClient::new(
                HttpApi::new(&spec.api_base_url, auth)?,
                &spec.config.host,
                organization,
            )))
        }
    }
}
