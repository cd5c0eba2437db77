//! Per-request configuration: the three config branches that apply to one resource.

use crate::config::{ConfigBranch, ConfigTree, DEFAULT_RESOURCE_PATH};
use serde::{Serialize, Serializer};
use serde_json::Value;

/// Config seen by a resource. Branches stay separate so a resource can tell where a value came from;
/// [`ResourceConfig::get`] resolves a key with `instance` over `service` over `global`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ResourceConfig {
    pub global: ConfigBranch,
    pub service: ConfigBranch,
    pub instance: ConfigBranch,
}

impl ResourceConfig {
    /// Overlay `global`, `services[service]` and `resources[resource]` from the tree.
    pub fn merge(tree: &ConfigTree, service: &str, resource: &str) -> Self {
        Self {
            global: tree.global.clone(),
            service: tree.service(service).cloned().unwrap_or_default(),
            instance: tree.resource(resource).cloned().unwrap_or_default(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.instance
            .get(key)
            .or_else(|| self.service.get(key))
            .or_else(|| self.global.get(key))
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(Value::as_bool)
    }

    /// Location template for resource sources. Only the global branch may set it.
    pub fn resource_path(&self) -> &str {
        self.global
            .get("resourcePath")
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_RESOURCE_PATH)
    }

    pub fn logging_enabled(&self) -> bool {
        self.get_bool("logging").unwrap_or(true)
    }

    /// Instance branch with `service` and `global` attached as nested objects.
    pub fn to_value(&self) -> Value {
        let mut out = self.instance.clone();
        out.insert("service".into(), Value::Object(self.service.clone()));
        out.insert("global".into(), Value::Object(self.global.clone()));
        Value::Object(out)
    }
}

impl Serialize for ResourceConfig {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}
