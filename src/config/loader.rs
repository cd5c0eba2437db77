//! Load the config tree from `config.json` (or the file named by `CONFIG_PATH`).

use crate::config::{prune_document, sanitize, ConfigTree};
use crate::error::ConfigError;
use serde_json::Value;
use std::path::{Path, PathBuf};

pub const CONFIG_PATH_ENV: &str = "CONFIG_PATH";
pub const DEFAULT_CONFIG_FILE: &str = "config.json";

/// Config file location from env `CONFIG_PATH`, default `config.json` in the working directory.
pub fn config_path_from_env() -> PathBuf {
    std::env::var(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_FILE))
}

/// Parse config text. Only a document that is not valid JSON, or not a single object, is an
/// error; keys of the wrong shape are logged and dropped so their defaults apply.
pub fn parse_config(text: &str) -> Result<ConfigTree, ConfigError> {
    let value: Value = serde_json::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
    let Value::Object(mut doc) = value else {
        return Err(ConfigError::NotAnObject);
    };
    let mut problems = prune_document(&mut doc);
    let mut config: ConfigTree =
        serde_json::from_value(Value::Object(doc)).map_err(|e| ConfigError::Parse(e.to_string()))?;
    problems.extend(sanitize(&mut config));
    for problem in &problems {
        tracing::warn!(error = %problem, "ignoring invalid config value");
    }
    Ok(config)
}

pub async fn load_config(path: &Path) -> Result<ConfigTree, ConfigError> {
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| ConfigError::Load(format!("{}: {}", path.display(), e)))?;
    parse_config(&text)
}

/// Load config, falling back to an empty tree on any error so the server still starts.
pub async fn load_config_or_default(path: &Path) -> ConfigTree {
    match load_config(path).await {
        Ok(config) => {
            tracing::info!(path = %path.display(), "config loaded");
            config
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "config error, using empty configuration");
            ConfigTree::default()
        }
    }
}
