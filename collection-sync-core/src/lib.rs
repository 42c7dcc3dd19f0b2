#![doc = "collection-sync-core: discovery and sync engine for SCM-hosted collections."]

//! This crate holds the content-discovery crawler and the per-source sync
//! orchestration. It performs no process-level I/O of its own: the SCM client,
//! the catalog sink and the manifest validator are injected through the traits
//! in [`contract`].
//!
//! # Pipeline
//! dispatch / scheduler → [`orchestrator::SourceOrchestrator`] →
//! [`crawler::Crawler`] (refs → walker → manifest) → [`identity`] dedup →
//! [`entity`] mapping → [`contract::CatalogSink`].

pub mod config;
pub mod contract;
pub mod crawler;
pub mod dispatch;
pub mod entity;
pub mod error;
pub mod flavor;
pub mod identity;
pub mod manifest;
pub mod orchestrator;
pub mod refs;
pub mod registry;
pub mod walker;
