//! Mapping of discoveries to catalog entity descriptors. No I/O.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};

use crate::config::SourceConfig;
use crate::contract::RepositoryInfo;
use crate::error::MappingError;
use crate::identity::CollectionIdentifier;
use crate::manifest::DiscoveredItem;
use crate::refs::RefType;

pub const API_VERSION: &str = "backstage.io/v1alpha1";
pub const MAX_ENTITY_NAME_LENGTH: usize = 63;
const DIGEST_LENGTH: usize = 8;

pub const ANNOTATION_SOURCE_ID: &str = "scm-discovery/source-id";
pub const ANNOTATION_DEDUP_KEY: &str = "scm-discovery/dedup-key";
pub const ANNOTATION_REF: &str = "scm-discovery/ref";
pub const ANNOTATION_REF_TYPE: &str = "scm-discovery/ref-type";
pub const ANNOTATION_MANIFEST_PATH: &str = "scm-discovery/manifest-path";
pub const ANNOTATION_SOURCE_LOCATION: &str = "backstage.io/source-location";
pub const ANNOTATION_COLLECTION_COUNT: &str = "scm-discovery/collection-count";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityLink {
    pub url: String,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityMetadata {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
    #[serde(default)]
    pub links: Vec<EntityLink>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityDescriptor {
    pub api_version: String,
    pub kind: String,
    pub metadata: EntityMetadata,
    pub spec: serde_json::Value,
}

/// Lifecycle grade: tags are release boundaries, branches are not.
pub fn lifecycle_for(ref_type: RefType) -> &'static str {
    match ref_type {
        RefType::Tag => "production",
        RefType::Branch => "development",
    }
}

/// Lowercase, alphanumerics only, runs of anything else collapsed into `-`.
pub fn sanitize(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut pending_sep = false;
    for c in input.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_sep && !out.is_empty() {
                out.push('-');
            }
            pending_sep = false;
            out.push(c.to_ascii_lowercase());
        } else {
            pending_sep = true;
        }
    }
    out
}

fn short_digest(input: &str) -> String {
    Sha256::digest(input.as_bytes())
        .iter()
        .take(DIGEST_LENGTH / 2)
        .map(|b| format!("{:02x}", b))
        .collect()
}

/// `base-digest`, with `base` cut so the result stays within bounds.
fn with_digest(base: &str, digest: &str) -> String {
    let keep = MAX_ENTITY_NAME_LENGTH - DIGEST_LENGTH - 1;
    let head = if base.len() > keep {
        base[..keep].trim_end_matches('-')
    } else {
        base
    };
    format!("{}-{}", head, digest)
}

/// Builds a bounded entity name from `parts`.
///
/// Names over [`MAX_ENTITY_NAME_LENGTH`] are cut and suffixed with a digest
/// of the full name, so distinct long inputs keep distinct names.
pub fn entity_name(parts: &[&str]) -> Result<String, MappingError> {
    let joined = parts.join("-");
    let full = sanitize(&joined);
    if full.is_empty() {
        return Err(MappingError::EmptyName(joined));
    }
    if full.len() <= MAX_ENTITY_NAME_LENGTH {
        return Ok(full);
    }
    Ok(with_digest(&full, &short_digest(&full)))
}

/// Entity name of a collection.
///
/// Sanitizing folds `_`, `.` and `-` together, so `acme_foo.bar` and
/// `acme.foo_bar` read the same. The dedup key digest keeps them apart.
pub fn collection_entity_name(identifier: &CollectionIdentifier) -> Result<String, MappingError> {
    let joined = [
        identifier.namespace.as_str(),
        identifier.name.as_str(),
        identifier.version.as_str(),
        identifier.organization.as_str(),
        identifier.host.as_str(),
    ]
    .join("-");
    let base = sanitize(&joined);
    if base.is_empty() {
        return Err(MappingError::EmptyName(joined));
    }
    Ok(with_digest(&base, &short_digest(&identifier.dedup_key())))
}

fn dedup_tags<'a>(tags: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for tag in tags {
        let tag = sanitize(tag);
        if !tag.is_empty() && !out.contains(&tag) {
            out.push(tag);
        }
    }
    out
}

fn repository_url(repo: &RepositoryInfo, source: &SourceConfig) -> String {
    if repo.url.is_empty() {
        source
            .provider
            .flavor()
            .repository_url(&source.host, &repo.full_path)
    } else {
        repo.url.clone()
    }
}

/// Entity name of the repository entity for `repo`.
pub fn repository_entity_name(
    repo: &RepositoryInfo,
    source: &SourceConfig,
) -> Result<String, MappingError> {
    entity_name(&[
        source.provider.as_str(),
        source.host.as_str(),
        repo.full_path.as_str(),
    ])
}

/// Maps one deduplicated discovery to a collection entity.
pub fn collection_entity(
    item: &DiscoveredItem,
    source: &SourceConfig,
) -> Result<EntityDescriptor, MappingError> {
    let meta = &item.metadata;
    for (field, value) in [
        ("namespace", &meta.namespace),
        ("name", &meta.name),
        ("version", &meta.version),
    ] {
        if value.trim().is_empty() {
            return Err(MappingError::MissingIdentity {
                path: format!("{}@{}:{}", item.repository.full_path, item.git_ref, item.path),
                field,
            });
        }
    }

    let flavor = source.provider.flavor();
    let repo = &item.repository;
    let identifier = CollectionIdentifier::new(source, meta);
    let name = collection_entity_name(&identifier)?;
    let manifest_dir = item
        .path
        .rsplit_once('/')
        .map(|(dir, _)| dir)
        .unwrap_or("");

    let mut annotations = BTreeMap::new();
    annotations.insert(ANNOTATION_SOURCE_ID.to_string(), source.source_id());
    annotations.insert(ANNOTATION_DEDUP_KEY.to_string(), identifier.dedup_key());
    annotations.insert(ANNOTATION_REF.to_string(), item.git_ref.clone());
    annotations.insert(
        ANNOTATION_REF_TYPE.to_string(),
        item.ref_type.as_str().to_string(),
    );
    annotations.insert(ANNOTATION_MANIFEST_PATH.to_string(), item.path.clone());
    annotations.insert(
        ANNOTATION_SOURCE_LOCATION.to_string(),
        format!(
            "url:{}/",
            flavor.tree_url(&source.host, &repo.full_path, &item.git_ref, manifest_dir)
        ),
    );

    let mut links = vec![EntityLink {
        url: flavor.blob_url(&source.host, &repo.full_path, &item.git_ref, &item.path),
        title: "Manifest".to_string(),
    }];
    for (title, url) in [
        ("Repository", &meta.links.repository),
        ("Documentation", &meta.links.documentation),
        ("Homepage", &meta.links.homepage),
        ("Issues", &meta.links.issues),
    ] {
        if let Some(url) = url {
            links.push(EntityLink {
                url: url.clone(),
                title: title.to_string(),
            });
        }
    }

    let tags = dedup_tags(
        meta.tags
            .iter()
            .map(String::as_str)
            .chain(["ansible", "collection", source.provider.as_str()]),
    );

    Ok(EntityDescriptor {
        api_version: API_VERSION.to_string(),
        kind: "Component".to_string(),
        metadata: EntityMetadata {
            name,
            title: Some(format!("{}.{}", meta.namespace, meta.name)),
            description: meta.description.clone(),
            tags,
            annotations,
            links,
        },
        spec: json!({
            "type": "ansible-collection",
            "lifecycle": lifecycle_for(item.ref_type),
            "owner": source.organization,
            "subcomponentOf": format!("component:{}", repository_entity_name(repo, source)?),
            "collectionNamespace": meta.namespace,
            "collectionName": meta.name,
            "collectionVersion": meta.version,
            "collectionDependencies": meta.dependencies,
            "collectionAuthors": meta.authors,
            "collectionLicense": meta.license,
            "collectionReadme": meta.readme,
            "repository": repository_url(repo, source),
            "ref": item.git_ref,
            "refType": item.ref_type,
            "hostLabel": source.host_label,
        }),
    })
}

/// Maps a repository that holds `collection_count` collections.
pub fn repository_entity(
    repo: &RepositoryInfo,
    source: &SourceConfig,
    collection_count: usize,
) -> Result<EntityDescriptor, MappingError> {
    let name = repository_entity_name(repo, source)?;
    let url = repository_url(repo, source);

    let mut annotations = BTreeMap::new();
    annotations.insert(ANNOTATION_SOURCE_ID.to_string(), source.source_id());
    annotations.insert(
        ANNOTATION_SOURCE_LOCATION.to_string(),
        format!("url:{}/", url),
    );
    annotations.insert(
        ANNOTATION_COLLECTION_COUNT.to_string(),
        collection_count.to_string(),
    );

    Ok(EntityDescriptor {
        api_version: API_VERSION.to_string(),
        kind: "Component".to_string(),
        metadata: EntityMetadata {
            name,
            title: Some(repo.full_path.clone()),
            description: repo.description.clone(),
            tags: dedup_tags(["scm-repository", source.provider.as_str()]),
            annotations,
            links: vec![EntityLink {
                url: url.clone(),
                title: source
                    .provider
                    .flavor()
                    .repository_label()
                    .to_string(),
            }],
        },
        spec: json!({
            "type": "scm-repository",
            "lifecycle": "production",
            "owner": source.organization,
            "repositoryName": repo.name,
            "repositoryPath": repo.full_path,
            "defaultBranch": repo.default_branch,
            "collectionCount": collection_count,
            "hostLabel": source.host_label,
        }),
    })
}
