//! Config validation: shape of the keys the framework itself reads.
//!
//! A bad key never invalidates the rest of the tree. Each offending key is removed so its
//! accessor falls back to the default, and the problem is reported back to the caller.

use crate::config::ConfigTree;
use crate::error::ConfigError;
use serde_json::{Map, Value};

const PLACEHOLDERS: &[&str] = &["hostname", "service", "name"];
const BRANCH_MAPS: [&str; 2] = ["services", "resources"];

/// Drop top-level values whose JSON shape cannot deserialize into [`ConfigTree`]:
/// non-object `global`/`services`/`resources` (or entries of the latter two), and
/// `port`/`idleTimeout` that are not unsigned integers in range.
pub fn prune_document(doc: &mut Map<String, Value>) -> Vec<ConfigError> {
    let mut problems = Vec::new();

    if doc.get("global").is_some_and(|v| !v.is_object()) {
        doc.remove("global");
        problems.push(invalid("global must be an object"));
    }

    for map in BRANCH_MAPS {
        match doc.get_mut(map) {
            None => {}
            Some(Value::Object(branches)) => {
                let bad: Vec<String> = branches
                    .iter()
                    .filter(|(_, v)| !v.is_object())
                    .map(|(k, _)| k.clone())
                    .collect();
                for name in bad {
                    branches.remove(&name);
                    problems.push(invalid(format!("{}.{} must be an object", map, name)));
                }
            }
            Some(_) => {
                doc.remove(map);
                problems.push(invalid(format!("{} must be an object", map)));
            }
        }
    }

    if doc
        .get("port")
        .is_some_and(|v| !v.as_u64().is_some_and(|p| p <= u64::from(u16::MAX)))
    {
        doc.remove("port");
        problems.push(invalid("port must be an integer between 0 and 65535"));
    }
    if doc.get("idleTimeout").is_some_and(|v| !v.is_u64()) {
        doc.remove("idleTimeout");
        problems.push(invalid("idleTimeout must be a positive integer"));
    }

    problems
}

/// Remove keys the framework reads but cannot use. Returns one error per removed key.
pub fn sanitize(config: &mut ConfigTree) -> Vec<ConfigError> {
    let mut problems = Vec::new();

    if let Some(path) = config.global.get("resourcePath") {
        let checked = path
            .as_str()
            .ok_or_else(|| invalid("global.resourcePath must be a string"))
            .and_then(validate_template);
        if let Err(e) = checked {
            config.global.remove("resourcePath");
            problems.push(e);
        }
    }

    let branches = std::iter::once(("global".to_string(), &mut config.global))
        .chain(config.services.iter_mut().map(|(k, v)| (format!("services.{}", k), v)))
        .chain(config.resources.iter_mut().map(|(k, v)| (format!("resources.{}", k), v)));
    for (scope, branch) in branches {
        if branch.get("logging").is_some_and(|v| !v.is_boolean()) {
            branch.remove("logging");
            problems.push(invalid(format!("{}.logging must be a boolean", scope)));
        }
    }

    if config.idle_timeout == Some(0) {
        config.idle_timeout = None;
        problems.push(invalid("idleTimeout must be greater than 0"));
    }

    if config.global.get("maxBodyBytes").is_some_and(|v| !v.is_u64()) {
        config.global.remove("maxBodyBytes");
        problems.push(invalid("global.maxBodyBytes must be a positive integer"));
    }

    problems
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::Validation(message.into())
}

/// Every `{placeholder}` (or legacy `${placeholder}`) in a location template must be known.
fn validate_template(template: &str) -> Result<(), ConfigError> {
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        let after = &rest[start + 1..];
        let end = after
            .find('}')
            .ok_or_else(|| invalid(format!("unclosed placeholder in resourcePath: {}", template)))?;
        let name = &after[..end];
        if !PLACEHOLDERS.contains(&name) {
            return Err(invalid(format!(
                "unknown placeholder '{}' in resourcePath (expected hostname, service or name)",
                name
            )));
        }
        rest = &after[end + 1..];
    }
    Ok(())
}
