//! Resource constructors registered by name before serving.

use crate::error::HandlerError;
use crate::resource::{Resource, ResourceContext};
use std::collections::BTreeMap;
use std::sync::Arc;

pub type ResourceConstructor =
    Arc<dyn Fn(ResourceContext) -> Result<Arc<dyn Resource>, HandlerError> + Send + Sync>;

/// Name-keyed constructors. Resource sources export entries of this catalog.
#[derive(Clone, Default)]
pub struct ResourceCatalog {
    constructors: BTreeMap<String, ResourceConstructor>,
}

impl ResourceCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<R, F>(&mut self, name: impl Into<String>, ctor: F) -> &mut Self
    where
        R: Resource,
        F: Fn(ResourceContext) -> R + Send + Sync + 'static,
    {
        self.register_fallible(name, move |ctx| Ok(ctor(ctx)))
    }

    /// Register a constructor that may refuse to build (bad config, missing dependency).
    pub fn register_fallible<R, F>(&mut self, name: impl Into<String>, ctor: F) -> &mut Self
    where
        R: Resource,
        F: Fn(ResourceContext) -> Result<R, HandlerError> + Send + Sync + 'static,
    {
        let name = name.into();
        tracing::debug!(constructor = %name, "resource constructor registered");
        self.constructors.insert(
            name,
            Arc::new(move |ctx| ctor(ctx).map(|r| Arc::new(r) as Arc<dyn Resource>)),
        );
        self
    }

    pub fn get(&self, name: &str) -> Option<&ResourceConstructor> {
        self.constructors.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.constructors.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.constructors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constructors.is_empty()
    }
}

impl std::fmt::Debug for ResourceCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceCatalog")
            .field("constructors", &self.names().collect::<Vec<_>>())
            .finish()
    }
}
