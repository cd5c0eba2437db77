//! Resource sources: locating, reading and materializing them into loadable units.
//!
//! A resource source is a JSON manifest that exports catalog constructors under
//! resource names:
//!
//! ```json
//! { "exports": ["hello"] }
//! { "exports": { "hello": "greeting" } }
//! ```
//!
//! The first form exports constructor `hello` as `hello`; the second exports
//! constructor `greeting` as `hello`.

use crate::catalog::{ResourceCatalog, ResourceConstructor};
use crate::error::RegistryError;
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
pub enum ExportsConfig {
    Names(Vec<String>),
    Mapped(BTreeMap<String, String>),
}

#[derive(Clone, Debug, Deserialize)]
pub struct ResourceManifest {
    pub exports: ExportsConfig,
    #[serde(default)]
    pub description: Option<String>,
}

impl ResourceManifest {
    /// `(exported name, constructor name)` pairs.
    pub fn export_pairs(&self) -> Vec<(String, String)> {
        match &self.exports {
            ExportsConfig::Names(names) => names.iter().map(|n| (n.clone(), n.clone())).collect(),
            ExportsConfig::Mapped(map) => map.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        }
    }
}

/// A materialized resource source: the constructors it exports, by exported name.
#[derive(Clone, Default)]
pub struct LoadedUnit {
    exports: HashMap<String, ResourceConstructor>,
}

impl LoadedUnit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_export(mut self, name: impl Into<String>, ctor: ResourceConstructor) -> Self {
        self.exports.insert(name.into(), ctor);
        self
    }

    pub fn export(&self, name: &str) -> Option<&ResourceConstructor> {
        self.exports.get(name)
    }

    pub fn len(&self) -> usize {
        self.exports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exports.is_empty()
    }
}

#[async_trait]
pub trait ResourceLoader: Send + Sync {
    async fn load(&self, location: &Path) -> Result<LoadedUnit, RegistryError>;
}

/// Reads manifests from disk and binds their exports against a [`ResourceCatalog`].
pub struct ManifestLoader {
    catalog: Arc<ResourceCatalog>,
}

impl ManifestLoader {
    pub fn new(catalog: Arc<ResourceCatalog>) -> Self {
        Self { catalog }
    }
}

#[async_trait]
impl ResourceLoader for ManifestLoader {
    async fn load(&self, location: &Path) -> Result<LoadedUnit, RegistryError> {
        let text = tokio::fs::read_to_string(location)
            .await
            .map_err(|e| RegistryError::ResourceNotFound {
                location: location.to_path_buf(),
                reason: e.to_string(),
            })?;
        if text.trim().is_empty() {
            return Err(RegistryError::ResourceNotFound {
                location: location.to_path_buf(),
                reason: "source is empty".into(),
            });
        }

        let manifest: ResourceManifest = serde_json::from_str(&text).map_err(|e| RegistryError::Load {
            location: location.to_path_buf(),
            reason: e.to_string(),
        })?;

        let mut unit = LoadedUnit::new();
        for (export, ctor_name) in manifest.export_pairs() {
            match self.catalog.get(&ctor_name) {
                Some(ctor) => unit = unit.with_export(export, ctor.clone()),
                None => tracing::warn!(
                    location = %location.display(),
                    export = %export,
                    constructor = %ctor_name,
                    "export names an unregistered constructor"
                ),
            }
        }
        Ok(unit)
    }
}

/// Fill `{hostname}`, `{service}` and `{name}` (or `${...}`) in a location template.
pub fn resolve_location(template: &str, hostname: &str, service: &str, name: &str) -> PathBuf {
    let mut out = template.to_string();
    for (key, value) in [("hostname", hostname), ("service", service), ("name", name)] {
        out = out
            .replace(&format!("${{{}}}", key), value)
            .replace(&format!("{{{}}}", key), value);
    }
    PathBuf::from(out)
}
