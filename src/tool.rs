//! Tools: named helpers with declared parameter schemas, registered at startup and
//! callable from resources through their context.

use crate::error::ToolError;
use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

/// JSON type a parameter must have.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Number,
    Boolean,
    Object,
    Array,
}

impl ParamType {
    fn matches(self, v: &Value) -> bool {
        match self {
            ParamType::String => v.is_string(),
            ParamType::Number => v.is_number(),
            ParamType::Boolean => v.is_boolean(),
            ParamType::Object => v.is_object(),
            ParamType::Array => v.is_array(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParamRule {
    #[serde(rename = "type")]
    pub type_: ParamType,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_length: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum: Option<f64>,
}

impl ParamRule {
    pub fn new(type_: ParamType) -> Self {
        Self {
            type_,
            required: false,
            max_length: None,
            min_length: None,
            pattern: None,
            allowed: None,
            minimum: None,
            maximum: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

pub type ParamSchema = BTreeMap<String, ParamRule>;

#[async_trait]
pub trait Tool: Send + Sync + 'static {
    fn about(&self) -> String {
        "A generic tool".into()
    }

    /// Parameters accepted when the tool is set up.
    fn init_schema(&self) -> ParamSchema {
        ParamSchema::new()
    }

    /// Parameters accepted by [`Tool::use_tool`].
    fn in_schema(&self) -> ParamSchema {
        ParamSchema::new()
    }

    fn out_schema(&self) -> ParamSchema {
        ParamSchema::new()
    }

    /// Run the tool with parameters already validated against `in_schema`.
    async fn use_tool(&self, params: Map<String, Value>) -> Result<Value, ToolError>;
}

/// Keep only the schema's parameters that are present with the declared type.
/// A required parameter that is missing or mistyped is an error; other mistyped ones are dropped.
pub fn validate_params(params: &Value, schema: &ParamSchema) -> Result<Map<String, Value>, ToolError> {
    let empty = Map::new();
    let params = params.as_object().unwrap_or(&empty);
    let mut valid = Map::new();
    for (key, rule) in schema {
        match params.get(key) {
            Some(v) if rule.type_.matches(v) => {
                check_rule(key, v, rule)?;
                valid.insert(key.clone(), v.clone());
            }
            _ if rule.required => return Err(ToolError::InvalidParameter(key.clone())),
            _ => {}
        }
    }
    Ok(valid)
}

fn check_rule(key: &str, v: &Value, rule: &ParamRule) -> Result<(), ToolError> {
    if let Some(s) = v.as_str() {
        if let Some(max) = rule.max_length {
            if s.chars().count() > max as usize {
                return Err(ToolError::Validation(format!("{} must be at most {} characters", key, max)));
            }
        }
        if let Some(min) = rule.min_length {
            if s.chars().count() < min as usize {
                return Err(ToolError::Validation(format!("{} must be at least {} characters", key, min)));
            }
        }
        if let Some(ref pattern) = rule.pattern {
            let re = Regex::new(pattern).map_err(|_| ToolError::Validation(format!("invalid pattern for {}", key)))?;
            if !re.is_match(s) {
                return Err(ToolError::Validation(format!("{} does not match required pattern", key)));
            }
        }
    }
    if let Some(ref allowed) = rule.allowed {
        if !allowed.iter().any(|a| value_eq(v, a)) {
            return Err(ToolError::Validation(format!(
                "{} must be one of: {:?}",
                key,
                allowed.iter().take(5).collect::<Vec<_>>()
            )));
        }
    }
    if let Some(n) = v.as_f64() {
        if let Some(min) = rule.minimum {
            if n < min {
                return Err(ToolError::Validation(format!("{} must be at least {}", key, min)));
            }
        }
        if let Some(max) = rule.maximum {
            if n > max {
                return Err(ToolError::Validation(format!("{} must be at most {}", key, max)));
            }
        }
    }
    Ok(())
}

fn value_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(n), Value::Number(m)) => n.as_f64() == m.as_f64(),
        _ => a == b,
    }
}

/// A registered tool with its schemas captured at registration time.
#[derive(Clone)]
pub struct ToolEntry {
    pub name: String,
    pub tool: Arc<dyn Tool>,
    pub about: String,
    pub init_schema: ParamSchema,
    pub input_schema: ParamSchema,
    pub output_schema: ParamSchema,
}

#[derive(Clone, Default)]
pub struct ToolCatalog {
    by_name: BTreeMap<String, ToolEntry>,
}

impl ToolCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<T: Tool>(&mut self, name: impl Into<String>, tool: T) -> &mut Self {
        let name = name.into();
        let entry = ToolEntry {
            name: name.clone(),
            about: tool.about(),
            init_schema: tool.init_schema(),
            input_schema: tool.in_schema(),
            output_schema: tool.out_schema(),
            tool: Arc::new(tool),
        };
        tracing::debug!(tool = %name, "tool registered");
        self.by_name.insert(name, entry);
        self
    }

    pub fn get(&self, name: &str) -> Option<&ToolEntry> {
        self.by_name.get(name)
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    /// Name, description and schemas of every tool, ordered by name.
    pub fn describe(&self) -> Vec<Value> {
        self.by_name
            .values()
            .map(|e| {
                serde_json::json!({
                    "name": e.name,
                    "about": e.about,
                    "initSchema": e.init_schema,
                    "inputSchema": e.input_schema,
                    "outputSchema": e.output_schema
                })
            })
            .collect()
    }

    /// Validate `params` against the tool's input schema and run it.
    pub async fn invoke(&self, name: &str, params: &Value) -> Result<Value, ToolError> {
        let entry = self.get(name).ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;
        let valid = validate_params(params, &entry.input_schema)?;
        entry.tool.use_tool(valid).await
    }
}

impl std::fmt::Debug for ToolCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolCatalog")
            .field("tools", &self.by_name.keys().collect::<Vec<_>>())
            .finish()
    }
}
