//! Raw config tree as read from `config.json`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 1111;
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_RESOURCE_PATH: &str = "services/{service}/resources/{name}";
pub const DEFAULT_MAX_BODY_BYTES: usize = 2 * 1024 * 1024;
pub const DEFAULT_SESSION_DIR: &str = "logs/sessions";

/// A free-form branch of the config tree.
pub type ConfigBranch = Map<String, Value>;

/// Whole configuration: `global`, per-service and per-resource branches, plus listener settings.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigTree {
    #[serde(default)]
    pub global: ConfigBranch,
    #[serde(default)]
    pub services: HashMap<String, ConfigBranch>,
    #[serde(default)]
    pub resources: HashMap<String, ConfigBranch>,
    #[serde(default)]
    pub port: Option<u16>,
    /// Seconds.
    #[serde(default)]
    pub idle_timeout: Option<u64>,
}

impl ConfigTree {
    pub fn port(&self) -> u16 {
        self.port.unwrap_or(DEFAULT_PORT)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout.unwrap_or(DEFAULT_IDLE_TIMEOUT_SECS))
    }

    pub fn service(&self, service: &str) -> Option<&ConfigBranch> {
        self.services.get(service)
    }

    pub fn resource(&self, name: &str) -> Option<&ConfigBranch> {
        self.resources.get(name)
    }

    pub fn max_body_bytes(&self) -> usize {
        self.global
            .get("maxBodyBytes")
            .and_then(Value::as_u64)
            .map(|n| n as usize)
            .unwrap_or(DEFAULT_MAX_BODY_BYTES)
    }

    /// Session logger settings from `global.sessionLogging`. Malformed settings fall back to defaults.
    pub fn session_logging(&self) -> SessionLoggingConfig {
        match self.global.get("sessionLogging") {
            None => SessionLoggingConfig::default(),
            Some(v) => serde_json::from_value(v.clone()).unwrap_or_else(|e| {
                tracing::warn!(error = %e, "invalid global.sessionLogging, using defaults");
                SessionLoggingConfig::default()
            }),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionLogLevel {
    #[default]
    Basic,
    Detailed,
    Verbose,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionLoggingConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub level: SessionLogLevel,
    #[serde(default = "default_session_dir")]
    pub session_dir: PathBuf,
}

impl Default for SessionLoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: SessionLogLevel::Basic,
            session_dir: default_session_dir(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_session_dir() -> PathBuf {
    PathBuf::from(DEFAULT_SESSION_DIR)
}
