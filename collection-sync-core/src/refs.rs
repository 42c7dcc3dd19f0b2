//! Reference resolution: which branches and tags of a repository get searched.

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::contract::{RepositoryInfo, ScmClient};
use crate::error::ScmError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RefType {
    Branch,
    Tag,
}

impl RefType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RefType::Branch => "branch",
            RefType::Tag => "tag",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRef {
    pub name: String,
    pub ref_type: RefType,
}

impl ResolvedRef {
    pub fn branch(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ref_type: RefType::Branch,
        }
    }

    pub fn tag(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ref_type: RefType::Tag,
        }
    }
}

/// Extra refs to search besides the default branch.
#[derive(Debug, Clone, Default)]
pub struct DiscoveryOptions {
    pub branches: Vec<String>,
    /// Glob patterns (`*`, `?`) matched against tag names.
    pub tag_patterns: Vec<String>,
}

/// Compiles a tag glob into an anchored regex.
///
/// `*` matches any run of characters and `?` a single character; everything
/// else is matched literally.
pub fn glob_to_regex(pattern: &str) -> Result<Regex, regex::Error> {
    let mut expr = String::with_capacity(pattern.len() + 2);
    expr.push('^');
    let mut literal = [0u8; 4];
    for c in pattern.chars() {
        match c {
            '*' => expr.push_str(".*"),
            '?' => expr.push('.'),
            other => expr.push_str(&regex::escape(other.encode_utf8(&mut literal))),
        }
    }
    expr.push('$');
    Regex::new(&expr)
}

/// Resolves the refs to search in `repo`, default branch first.
///
/// Branch and tag listings are fetched only when the corresponding option is
/// non-empty.
pub async fn resolve_refs(
    client: &dyn ScmClient,
    repo: &RepositoryInfo,
    options: &DiscoveryOptions,
) -> Result<Vec<ResolvedRef>, ScmError> {
    let mut refs = vec![ResolvedRef::branch(repo.default_branch.clone())];

    if !options.branches.is_empty() {
        let existing = client.list_branches(repo).await?;
        for branch in &options.branches {
            let already = refs
                .iter()
                .any(|r| r.ref_type == RefType::Branch && &r.name == branch);
            if already {
                continue;
            }
            if existing.iter().any(|b| b == branch) {
                refs.push(ResolvedRef::branch(branch.clone()));
            } else {
                debug!(repo = %repo.full_path, branch = %branch, "Configured branch does not exist");
            }
        }
    }

    if !options.tag_patterns.is_empty() {
        let patterns: Vec<Regex> = options
            .tag_patterns
            .iter()
            .filter_map(|p| match glob_to_regex(p) {
                Ok(re) => Some(re),
                Err(e) => {
                    warn!(pattern = %p, error = %e, "Ignoring tag pattern that does not compile");
                    None
                }
            })
            .collect();
        let tags = client.list_tags(repo).await?;
        for tag in tags {
            if patterns.iter().any(|re| re.is_match(&tag)) {
                refs.push(ResolvedRef::tag(tag));
            }
        }
    }

    debug!(repo = %repo.full_path, refs = refs.len(), "Resolved refs");
    Ok(refs)
}
