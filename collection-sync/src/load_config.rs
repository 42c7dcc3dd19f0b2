/// `load_config` module: Loads a static YAML config and resolves it into one
/// [`SourceSpec`] per organization, with SCM tokens injected from the environment.
///
/// This module is the only place where untrusted YAML is parsed and mapped to
/// the strongly-typed [`SourceConfig`] of `collection-sync-core`.
///
/// # Responsibilities
/// - Parse the `environments → providers → hosts → organizations` tree
/// - Resolve each organization's schedule (organization, then host, then environment)
/// - Apply discovery defaults and reject unusable sources at startup
/// - Read SCM tokens from the environment variables named by `token_env`
///
/// # Errors
/// All errors use `anyhow::Error` and name the offending source, so a bad
/// config fails startup with a message that points at the YAML.
use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Result};
use collection_sync_core::config::{Provider, Schedule, SourceConfig, DEFAULT_CRAWL_DEPTH};
use serde::Deserialize;
use tracing::{error, info};

pub const DEFAULT_CATALOG_PATH: &str = "./catalog/entities.json";

/// Fully resolved application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerSection,
    pub catalog: CatalogSection,
    pub sources: Vec<SourceSpec>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_bind")]
    pub bind: SocketAddr,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CatalogSection {
    #[serde(default = "default_catalog_path")]
    pub path: PathBuf,
}

impl Default for CatalogSection {
    fn default() -> Self {
        Self {
            path: default_catalog_path(),
        }
    }
}

fn default_bind() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 7007))
}

fn default_catalog_path() -> PathBuf {
    PathBuf::from(DEFAULT_CATALOG_PATH)
}

/// A source plus the connection details needed to build its SCM client.
#[derive(Debug, Clone)]
pub struct SourceSpec {
    pub config: SourceConfig,
    pub api_base_url: String,
    pub token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    #[serde(default)]
    server: ServerSection,
    #[serde(default)]
    catalog: CatalogSection,
    #[serde(default)]
    environments: BTreeMap<String, RawEnvironment>,
}

#[derive(Debug, Deserialize)]
struct RawEnvironment {
    schedule: Option<RawSchedule>,
    #[serde(default)]
    providers: BTreeMap<String, Vec<RawHost>>,
}

#[derive(Debug, Deserialize)]
struct RawHost {
    host: String,
    host_label: Option<String>,
    api_base_url: Option<String>,
    token_env: Option<String>,
    schedule: Option<RawSchedule>,
    #[serde(default)]
    organizations: Vec<RawOrganization>,
}

#[derive(Debug, Deserialize)]
struct RawOrganization {
    name: String,
    enabled: Option<bool>,
    #[serde(default)]
    branches: Vec<String>,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    galaxy_file_paths: Vec<String>,
    crawl_depth: Option<u32>,
    schedule: Option<RawSchedule>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawSchedule {
    frequency: RawDuration,
    timeout: RawDuration,
    initial_delay: Option<RawDuration>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct RawDuration {
    #[serde(default)]
    hours: u64,
    #[serde(default)]
    minutes: u64,
    #[serde(default)]
    seconds: u64,
}

impl RawDuration {
    fn to_duration(&self, source_id: &str, field: &str) -> Result<Duration> {
        self.hours
            .checked_mul(3600)
            .and_then(|secs| secs.checked_add(self.minutes.checked_mul(60)?))
            .and_then(|secs| secs.checked_add(self.seconds))
            .map(Duration::from_secs)
            .ok_or_else(|| anyhow!("schedule {} for {} is out of range", field, source_id))
    }
}

impl RawSchedule {
    fn resolve(&self, source_id: &str) -> Result<Schedule> {
        let frequency = self.frequency.to_duration(source_id, "frequency")?;
        let timeout = self.timeout.to_duration(source_id, "timeout")?;
        if frequency.is_zero() {
            return Err(anyhow!("schedule frequency for {} must be positive", source_id));
        }
        if timeout.is_zero() {
            return Err(anyhow!("schedule timeout for {} must be positive", source_id));
        }
        let initial_delay = self
            .initial_delay
            .as_ref()
            .map(|delay| delay.to_duration(source_id, "initial_delay"))
            .transpose()?;
        Ok(Schedule {
            frequency,
            timeout,
            initial_delay,
        })
    }
}

/// Loads a static YAML config file and injects SCM tokens from the environment.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<AppConfig> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let config_content = match fs::read_to_string(path_ref) {
        Ok(content) => {
            info!(config_path = ?path_ref, "Config file read successfully");
            content
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
            return Err(anyhow!("Failed to read config file {:?}: {}", path_ref, e));
        }
    };

    parse_config(&config_content)
}

/// Parses and resolves YAML config text.
pub fn parse_config(config_content: &str) -> Result<AppConfig> {
    let raw: RawConfig = match serde_yaml::from_str(config_content) {
        Ok(conf) => {
            info!("Parsed config YAML successfully");
            conf
        }
        Err(e) => {
            error!(error = ?e, "Failed to parse config YAML");
            return Err(anyhow!("Failed to parse config YAML: {e}"));
        }
    };

    let sources = resolve_sources(&raw.environments)?;
    info!(
        sources = sources.len(),
        bind = %raw.server.bind,
        catalog = ?raw.catalog.path,
        "Configuration resolved"
    );
    Ok(AppConfig {
        server: raw.server,
        catalog: raw.catalog,
        sources,
    })
}

fn resolve_sources(environments: &BTreeMap<String, RawEnvironment>) -> Result<Vec<SourceSpec>> {
    let mut sources = Vec::new();
    for (env_name, environment) in environments {
        for (provider_key, hosts) in &environment.providers {
            let provider: Provider = provider_key.parse().map_err(|e| {
                error!(env = %env_name, provider = %provider_key, "Unknown provider in config");
                anyhow!("environment {}: {}", env_name, e)
            })?;
            for host in hosts {
                let token = read_token(host)?;
                let api_base_url = host
                    .api_base_url
                    .clone()
                    .unwrap_or_else(|| default_api_base_url(provider, &host.host));
                for org in &host.organizations {
                    let mut config = SourceConfig::new(
                        env_name.as_str(),
                        provider,
                        host.host.as_str(),
                        org.name.as_str(),
                        Schedule {
                            frequency: Duration::ZERO,
                            timeout: Duration::ZERO,
                            initial_delay: None,
                        },
                    )
                    .with_enabled(org.enabled.unwrap_or(true))
                    .with_branches(org.branches.clone())
                    .with_tag_patterns(org.tags.clone())
                    .with_manifest_paths(org.galaxy_file_paths.clone())
                    .with_crawl_depth(org.crawl_depth.unwrap_or(DEFAULT_CRAWL_DEPTH));
                    if let Some(label) = &host.host_label {
                        config = config.with_host_label(label.as_str());
                    }

                    let source_id = config.source_id();
                    let raw_schedule = org
                        .schedule
                        .as_ref()
                        .or(host.schedule.as_ref())
                        .or(environment.schedule.as_ref())
                        .ok_or_else(|| {
                            error!(source_id = %source_id, "No schedule configured for source");
                            anyhow!(
                                "no schedule configured for {} (set one on the organization, host or environment)",
                                source_id
                            )
                        })?;
                    config.schedule = raw_schedule.resolve(&source_id)?;
                    config.validate().map_err(|e| anyhow!("{}", e))?;

                    config.trace_loaded();
                    sources.push(SourceSpec {
                        config,
                        api_base_url: api_base_url.clone(),
                        token: token.clone(),
                    });
                }
            }
        }
    }
    Ok(sources)
}

fn read_token(host: &RawHost) -> Result<Option<String>> {
    let Some(var) = &host.token_env else {
        return Ok(None);
    };
    match env::var(var) {
        Ok(token) => {
            info!(host = %host.host, token_env = %var, "SCM token loaded from environment");
            Ok(Some(token))
        }
        Err(e) => {
            error!(error = ?e, host = %host.host, token_env = %var, "SCM token missing in environment");
            Err(anyhow!(
                "environment variable {} (token for {}) is not set",
                var,
                host.host
            ))
        }
    }
}

/// Public API root for a host when the config does not name one.
pub fn default_api_base_url(provider: Provider, host: &str) -> String {
    match provider {
        Provider::Github if host == "github.com" => "https://api.github.com".to_string(),
        Provider::Github => format!("https://{}/api/v3", host),
        Provider::Gitlab => format!("https://{}/api/v4", host),
    }
}
