//! JSON-file catalog sink.
//!
//! [`JsonFileCatalog`] keeps `location key → entities` in memory and rewrites the
//! whole file after every mutation. The rewrite goes through a temporary file in
//! the same directory that is persisted over the target, so readers never see a
//! half-written catalog. Writes run on the blocking pool, one at a time, and the
//! in-memory view only changes once the file is on disk.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use collection_sync_core::contract::CatalogSink;
use collection_sync_core::entity::EntityDescriptor;
use collection_sync_core::error::SinkError;
use parking_lot::Mutex;
use tempfile::NamedTempFile;
use tokio::sync::Mutex as WriteLock;
use tracing::{error, info};

type Locations = BTreeMap<String, Vec<EntityDescriptor>>;

pub struct JsonFileCatalog {
    path: PathBuf,
    locations: Mutex<Locations>,
    write_lock: WriteLock<()>,
}

impl JsonFileCatalog {
    /// Opens the catalog at `path`, loading existing content if the file exists.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, SinkError> {
        let path = path.as_ref().to_path_buf();
        let locations = if path.exists() {
            let content = fs::read_to_string(&path).map_err(|e| {
                error!(error = ?e, catalog = ?path, "Failed to read catalog file");
                SinkError::Write(format!("{}: {}", path.display(), e))
            })?;
            serde_json::from_str(&content).map_err(|e| {
                error!(error = ?e, catalog = ?path, "Catalog file is not valid JSON");
                SinkError::Write(format!("{}: {}", path.display(), e))
            })?
        } else {
            Locations::new()
        };
        info!(catalog = ?path, locations = locations.len(), "Opened catalog file");
        Ok(Self {
            path,
            locations: Mutex::new(locations),
            write_lock: WriteLock::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn entities(&self, location_key: &str) -> Vec<EntityDescriptor> {
        self.locations
            .lock()
            .get(location_key)
            .cloned()
            .unwrap_or_default()
    }

    pub fn location_keys(&self) -> Vec<String> {
        self.locations.lock().keys().cloned().collect()
    }
}

fn write_catalog(path: &Path, locations: &Locations) -> Result<(), SinkError> {
    let write_err =
        |e: &dyn std::fmt::Display| SinkError::Write(format!("{}: {}", path.display(), e));
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&dir).map_err(|e| write_err(&e))?;

    let mut file = NamedTempFile::new_in(&dir).map_err(|e| write_err(&e))?;
    serde_json::to_writer_pretty(&mut file, locations).map_err(|e| write_err(&e))?;
    file.write_all(b"\n").map_err(|e| write_err(&e))?;
    file.persist(path).map_err(|e| write_err(&e.error))?;
    Ok(())
}

#[async_trait]
impl CatalogSink for JsonFileCatalog {
    async fn apply_full_mutation(
        &self,
        location_key: &str,
        entities: Vec<EntityDescriptor>,
    ) -> Result<(), SinkError> {
        let _writing = self.write_lock.lock().await;
        let count = entities.len();
        let mut next = self.locations.lock().clone();
        let replaced = next
            .insert(location_key.to_string(), entities)
            .map_or(0, |previous| previous.len());

        let path = self.path.clone();
        let written = tokio::task::spawn_blocking(move || {
            write_catalog(&path, &next).map(|()| next)
        })
        .await
        .map_err(|e| SinkError::Write(format!("{}: {}", self.path.display(), e)))
        .and_then(|result| result);

        match written {
            Ok(next) => {
                *self.locations.lock() = next;
                info!(
                    location_key,
                    entities = count,
                    replaced,
                    "Applied full catalog mutation"
                );
                Ok(())
            }
            Err(e) => {
                error!(location_key, error = %e, "Failed to persist catalog mutation");
                Err(e)
            }
        }
    }
}
