//! Demo server: a separate binary that serves one `hello` resource through duwende.
//!
//! Run from this directory so `config.json` and `services/` resolve: `cargo run`
//! (or from the repo root with `CONFIG_PATH=demo_server/config.json` and a matching `resourcePath`).
//! Then: `curl -H 'Accept: application/json' localhost:1111/test/hello/42`

use async_trait::async_trait;
use axum::http::StatusCode;
use duwende::error::ToolError;
use duwende::tool::{ParamRule, ParamSchema, ParamType};
use duwende::{
    config_path_from_env, init_tracing, load_config_or_default, response, HandlerResult, Resource,
    ResourceCatalog, ResourceContext, ResourceRequest, Server, Tool, ToolCatalog,
};
use serde_json::{json, Map, Value};

struct Hello {
    ctx: ResourceContext,
}

impl Hello {
    async fn greeting(&self, id: &str) -> Result<String, duwende::HandlerError> {
        let word = self.ctx.config().get_str("greeting").unwrap_or("Hello");
        let subject = self.ctx.config().get_str("subject").unwrap_or("World");
        let shout = self.ctx.config().get_bool("shout").unwrap_or(false);
        let text = format!("{} {}", word, subject);
        self.ctx.log("greeting", &(&text, id));
        if !shout {
            return Ok(text);
        }
        let loud = self.ctx.use_tool("upper", &json!({ "text": text })).await?;
        Ok(loud.as_str().unwrap_or_default().to_string())
    }
}

#[async_trait]
impl Resource for Hello {
    async fn handle_list(&self, _request: &ResourceRequest, _path: &str) -> HandlerResult {
        Ok(response(
            StatusCode::OK,
            json!({ "message": self.greeting("").await?, "config": self.ctx.config() }),
            &[],
        ))
    }

    async fn handle_get(&self, _request: &ResourceRequest, id: &str, path: &str) -> HandlerResult {
        Ok(response(
            StatusCode::OK,
            json!({ "message": self.greeting(id).await?, "id": id, "path": path }),
            &[],
        ))
    }

    async fn handle_post(&self, request: &ResourceRequest, _id: Option<&str>, _path: &str) -> HandlerResult {
        let body: Value = request.json()?;
        Ok(response(StatusCode::CREATED, json!({ "received": body }), &[]))
    }

    async fn render_get(&self, _request: &ResourceRequest, id: &str, _path: &str) -> HandlerResult {
        let html = format!("<!doctype html><h1>{} {}</h1>", self.greeting(id).await?, id);
        Ok(response(StatusCode::OK, html, &[("Content-Type", "text/html")]))
    }

    async fn render_list(&self, _request: &ResourceRequest, _path: &str) -> HandlerResult {
        let html = format!("<!doctype html><h1>{}</h1>", self.greeting("").await?);
        Ok(response(StatusCode::OK, html, &[("Content-Type", "text/html")]))
    }
}

struct Upper;

#[async_trait]
impl Tool for Upper {
    fn about(&self) -> String {
        "Upper-cases a text parameter".into()
    }

    fn in_schema(&self) -> ParamSchema {
        let mut schema = ParamSchema::new();
        schema.insert("text".into(), ParamRule::new(ParamType::String).required());
        schema
    }

    async fn use_tool(&self, params: Map<String, Value>) -> Result<Value, ToolError> {
        let text = params
            .get("text")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidParameter("text".into()))?;
        Ok(json!(text.to_uppercase()))
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    init_tracing("duwende=info,demo_server=info,tower_http=info");

    let config = load_config_or_default(&config_path_from_env()).await;

    let mut catalog = ResourceCatalog::new();
    catalog.register("hello", |ctx| Hello { ctx });
    let mut tools = ToolCatalog::new();
    tools.register("upper", Upper);

    let server = Server::new(config, catalog, tools);
    tracing::info!(port = server.config().port(), "demo server starting");
    server.run().await?;
    Ok(())
}
