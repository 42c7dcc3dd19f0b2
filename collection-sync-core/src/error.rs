//! Error types shared across the discovery and sync pipeline.

use std::time::Duration;

use thiserror::Error;

/// Failure talking to an SCM host.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ScmError {
    #[error("request to {url} failed: {message}")]
    Transport { url: String, message: String },

    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("unexpected response: {0}")]
    Decode(String),

    #[error("{0}")]
    Other(String),
}

/// Failure applying a mutation to the catalog.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SinkError {
    #[error("catalog write failed: {0}")]
    Write(String),

    #[error("catalog rejected mutation: {0}")]
    Rejected(String),
}

/// A manifest that does not satisfy the collection schema.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("manifest is not a mapping")]
    NotAMapping,

    #[error("missing required field `{0}`")]
    MissingField(&'static str),

    #[error("invalid field `{field}`: {reason}")]
    InvalidField { field: &'static str, reason: String },
}

/// A discovery that cannot be turned into an entity descriptor.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MappingError {
    #[error("collection at {path} has an empty `{field}`")]
    MissingIdentity { path: String, field: &'static str },

    #[error("`{0}` does not produce a usable entity name")]
    EmptyName(String),
}

/// Caller errors raised by the orchestrator before a cycle starts.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SyncError {
    #[error("source {0} is not connected to a catalog sink")]
    NotConnected(String),

    #[error("source {0} is already syncing")]
    AlreadySyncing(String),
}

/// Everything that can end a sync cycle in failure.
#[derive(Debug, Error)]
pub enum CycleError {
    #[error("repository listing failed: {0}")]
    Scm(#[from] ScmError),

    #[error("entity mapping failed: {0}")]
    Mapping(#[from] MappingError),

    #[error("catalog mutation failed: {0}")]
    Sink(#[from] SinkError),

    #[error("timed out after {0:?}")]
    TimedOut(Duration),

    #[error("cycle panicked: {0}")]
    Panicked(String),
}

/// Invalid static source configuration.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("unknown provider `{0}` (expected `github` or `gitlab`)")]
    UnknownProvider(String),

    #[error("crawl depth for {0} must be at least 1")]
    InvalidCrawlDepth(String),
}

/// A sync filter that violates the provider → host → organization hierarchy.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FilterError {
    #[error("`organization` requires `host`")]
    OrganizationWithoutHost,

    #[error("`host` requires `provider`")]
    HostWithoutProvider,
}
