//! Resource catalogue: data files found in the sandbox roots plus the
//! server status document.

use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use super::CatalogError;
use crate::guard::PathGuard;

/// URI of the built-in status resource.
pub const STATUS_URI: &str = "system://status";

/// Where a resource's content comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceSource {
    /// A file inside a sandbox root. Re-guarded on every read.
    File(PathBuf),
    /// Generated server status.
    Status,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    pub uri: String,
    pub name: String,
    pub description: String,
    pub mime_type: String,
    pub source: ResourceSource,
}

impl Resource {
    pub fn file(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_string_lossy().into_owned();
        let extension = path.extension()?.to_string_lossy().to_ascii_lowercase();
        let (label, mime_type) = match extension.as_str() {
            "txt" => ("Text file", "text/plain"),
            "csv" => ("CSV data file", "text/csv"),
            "json" => ("JSON data file", "application/json"),
            _ => return None,
        };
        Some(Self {
            uri: format!("file://{}", path.display()),
            description: format!("{label}: {name}"),
            name,
            mime_type: mime_type.to_string(),
            source: ResourceSource::File(path.to_path_buf()),
        })
    }

    pub fn status() -> Self {
        Self {
            uri: STATUS_URI.to_string(),
            name: "System Status".to_string(),
            description: "Current server status and catalogue counts".to_string(),
            mime_type: "application/json".to_string(),
            source: ResourceSource::Status,
        }
    }

    pub fn to_listing(&self) -> Value {
        json!({
            "uri": self.uri,
            "name": self.name,
            "description": self.description,
            "mimeType": self.mime_type,
        })
    }
}

/// Ordered, uri-keyed resource registry.
#[derive(Debug, Default)]
pub struct ResourceCatalog {
    resources: Vec<Resource>,
    index: HashMap<String, usize>,
}

impl ResourceCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalogue of the `.txt`, `.csv` and `.json` files directly inside each
    /// root (sorted by name per root), followed by the status resource.
    pub fn discover(guard: &PathGuard) -> Self {
        let mut catalog = Self::new();
        for root in guard.roots() {
            for resource in scan_root(root) {
                if let Err(e) = catalog.register(resource) {
                    tracing::debug!("Skipping resource: {}", e);
                }
            }
        }
        // Status is registered last and the uri scheme cannot collide with files.
        let _ = catalog.register(Resource::status());
        tracing::info!(count = catalog.len(), "Resources discovered");
        catalog
    }

    pub fn register(&mut self, resource: Resource) -> Result<(), CatalogError> {
        if self.index.contains_key(&resource.uri) {
            return Err(CatalogError::DuplicateResource(resource.uri));
        }
        self.index.insert(resource.uri.clone(), self.resources.len());
        self.resources.push(resource);
        Ok(())
    }

    pub fn lookup(&self, uri: &str) -> Result<&Resource, CatalogError> {
        self.index
            .get(uri)
            .map(|&i| &self.resources[i])
            .ok_or_else(|| CatalogError::UnknownResource(uri.to_string()))
    }

    pub fn list(&self) -> impl Iterator<Item = &Resource> + Clone + '_ {
        self.resources.iter()
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

fn scan_root(root: &Path) -> Vec<Resource> {
    let entries = match std::fs::read_dir(root) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!("Cannot scan {} for resources: {}", root.display(), e);
            return Vec::new();
        }
    };

    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
        .map(|entry| entry.path())
        .collect();
    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));

    files.iter().filter_map(|path| Resource::file(path)).collect()
}
