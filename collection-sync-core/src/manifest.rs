//! Manifest reading, parsing and schema validation.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::contract::{ManifestValidator, RepositoryInfo, ScmClient};
use crate::error::ValidationError;
use crate::refs::{RefType, ResolvedRef};

/// Links declared by a manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ManifestLinks {
    pub repository: Option<String>,
    pub documentation: Option<String>,
    pub homepage: Option<String>,
    pub issues: Option<String>,
}

/// Validated content of a collection manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CollectionMetadata {
    pub namespace: String,
    pub name: String,
    pub version: String,
    pub description: Option<String>,
    pub tags: Vec<String>,
    /// Collection name (`namespace.name`) → version range.
    pub dependencies: BTreeMap<String, String>,
    pub authors: Vec<String>,
    pub license: Vec<String>,
    pub links: ManifestLinks,
    pub readme: Option<String>,
}

/// One valid manifest found during a crawl.
#[derive(Debug, Clone)]
pub struct DiscoveredItem {
    pub repository: RepositoryInfo,
    pub git_ref: String,
    pub ref_type: RefType,
    pub path: String,
    pub raw_content: String,
    pub metadata: CollectionMetadata,
}

/// Turns a candidate path into a [`DiscoveredItem`], or nothing.
pub struct ManifestProcessor<'a> {
    client: &'a dyn ScmClient,
    validator: &'a dyn ManifestValidator,
}

impl<'a> ManifestProcessor<'a> {
    pub fn new(client: &'a dyn ScmClient, validator: &'a dyn ManifestValidator) -> Self {
        Self { client, validator }
    }

    /// Reads, parses and validates one candidate. Every failure is logged
    /// and yields `None`.
    pub async fn process(
        &self,
        repo: &RepositoryInfo,
        git_ref: &ResolvedRef,
        path: &str,
    ) -> Option<DiscoveredItem> {
        let raw_content = match self.client.read_file(repo, &git_ref.name, path).await {
            Ok(content) => content,
            Err(e) => {
                warn!(repo = %repo.full_path, git_ref = %git_ref.name, path, error = %e, "Failed to read manifest candidate");
                return None;
            }
        };

        let data: Value = match serde_yaml::from_str(&raw_content) {
            Ok(data) => data,
            Err(e) => {
                warn!(repo = %repo.full_path, git_ref = %git_ref.name, path, error = %e, "Failed to parse manifest candidate");
                return None;
            }
        };

        let metadata = match self.validator.validate(&data) {
            Ok(metadata) => metadata,
            Err(e) => {
                debug!(repo = %repo.full_path, git_ref = %git_ref.name, path, reason = %e, "Manifest candidate is not a valid collection");
                return None;
            }
        };

        debug!(
            repo = %repo.full_path,
            git_ref = %git_ref.name,
            path,
            collection = %format!("{}.{}", metadata.namespace, metadata.name),
            version = %metadata.version,
            "Discovered collection"
        );
        Some(DiscoveredItem {
            repository: repo.clone(),
            git_ref: git_ref.name.clone(),
            ref_type: git_ref.ref_type,
            path: path.to_string(),
            raw_content,
            metadata,
        })
    }
}

/// Schema check for Ansible `galaxy.yml` manifests.
#[derive(Debug, Clone, Copy, Default)]
pub struct GalaxyManifestValidator;

impl ManifestValidator for GalaxyManifestValidator {
    fn validate(&self, data: &Value) -> Result<CollectionMetadata, ValidationError> {
        let map = data.as_object().ok_or(ValidationError::NotAMapping)?;

        let namespace = required_str(map, "namespace")?;
        check_identifier("namespace", &namespace)?;
        let name = required_str(map, "name")?;
        check_identifier("name", &name)?;
        let version = required_str(map, "version")?;
        if !is_semver(&version) {
            return Err(ValidationError::InvalidField {
                field: "version",
                reason: format!("`{}` is not a semantic version", version),
            });
        }

        let dependencies = match map.get("dependencies") {
            None | Some(Value::Null) => BTreeMap::new(),
            Some(Value::Object(deps)) => deps
                .iter()
                .map(|(k, v)| Ok((k.clone(), scalar_to_string("dependencies", v)?)))
                .collect::<Result<_, ValidationError>>()?,
            Some(_) => {
                return Err(ValidationError::InvalidField {
                    field: "dependencies",
                    reason: "expected a mapping".into(),
                })
            }
        };

        Ok(CollectionMetadata {
            namespace,
            name,
            version,
            description: optional_str(map, "description")?,
            tags: string_list(map, "tags")?,
            dependencies,
            authors: string_list(map, "authors")?,
            license: string_list(map, "license")?,
            links: ManifestLinks {
                repository: optional_str(map, "repository")?,
                documentation: optional_str(map, "documentation")?,
                homepage: optional_str(map, "homepage")?,
                issues: optional_str(map, "issues")?,
            },
            readme: optional_str(map, "readme")?,
        })
    }
}

type Map = serde_json::Map<String, Value>;

fn required_str(map: &Map, field: &'static str) -> Result<String, ValidationError> {
    match map.get(field) {
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.trim().to_string()),
        Some(Value::String(_)) | None | Some(Value::Null) => {
            Err(ValidationError::MissingField(field))
        }
        Some(_) => Err(ValidationError::InvalidField {
            field,
            reason: "expected a string".into(),
        }),
    }
}

fn optional_str(map: &Map, field: &'static str) -> Result<Option<String>, ValidationError> {
    match map.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.trim().to_string())),
        Some(_) => Err(ValidationError::InvalidField {
            field,
            reason: "expected a string".into(),
        }),
    }
}

/// Accepts a single string or a list of strings.
fn string_list(map: &Map, field: &'static str) -> Result<Vec<String>, ValidationError> {
    match map.get(field) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::String(s)) => Ok(vec![s.clone()]),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| match item {
                Value::String(s) => Ok(s.clone()),
                _ => Err(ValidationError::InvalidField {
                    field,
                    reason: "expected a list of strings".into(),
                }),
            })
            .collect(),
        Some(_) => Err(ValidationError::InvalidField {
            field,
            reason: "expected a list of strings".into(),
        }),
    }
}

fn scalar_to_string(field: &'static str, value: &Value) -> Result<String, ValidationError> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        _ => Err(ValidationError::InvalidField {
            field,
            reason: "expected scalar version ranges".into(),
        }),
    }
}

/// Lowercase letters, digits and underscores, starting with a letter.
fn check_identifier(field: &'static str, value: &str) -> Result<(), ValidationError> {
    let mut chars = value.chars();
    let valid_start = chars.next().is_some_and(|c| c.is_ascii_lowercase());
    let valid_rest = chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
    if valid_start && valid_rest {
        Ok(())
    } else {
        Err(ValidationError::InvalidField {
            field,
            reason: format!("`{}` must match [a-z][a-z0-9_]*", value),
        })
    }
}

/// `MAJOR.MINOR.PATCH[-pre][+build]` with no leading zeros in the core.
fn is_semver(version: &str) -> bool {
    let (rest, build) = match version.split_once('+') {
        Some((rest, build)) => (rest, Some(build)),
        None => (version, None),
    };
    let (core, pre) = match rest.split_once('-') {
        Some((core, pre)) => (core, Some(pre)),
        None => (rest, None),
    };
    let dotted_ok = |s: &str| {
        !s.is_empty()
            && s.split('.').all(|id| {
                !id.is_empty() && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
            })
    };
    if pre.is_some_and(|p| !dotted_ok(p)) || build.is_some_and(|b| !dotted_ok(b)) {
        return false;
    }
    let parts: Vec<&str> = core.split('.').collect();
    parts.len() == 3
        && parts.iter().all(|p| {
            !p.is_empty()
                && p.chars().all(|c| c.is_ascii_digit())
                && (p.len() == 1 || !p.starts_with('0'))
        })
}
