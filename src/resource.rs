//! Resources: the routable units behind `/{service}/{resource}`.
//!
//! A resource implements only the entry points it supports. Every entry point it leaves
//! alone answers 404, verbs outside the table answer 405, and any failure inside an
//! entry point (returned error or panic) becomes a 500 at this boundary.

use crate::config::ResourceConfig;
use crate::error::{AppError, HandlerError, ToolError};
use crate::response::not_found;
use crate::route::OutputMode;
use crate::tool::ToolCatalog;
use async_trait::async_trait;
use axum::{
    body::Bytes,
    http::{header::COOKIE, request::Parts, HeaderMap, Method, Uri},
    response::{IntoResponse, Response},
};
use futures_util::FutureExt;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

pub type HandlerResult = Result<Response, HandlerError>;

/// Buffered request as seen by resources and the request logger.
#[derive(Clone, Debug)]
pub struct ResourceRequest {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl ResourceRequest {
    pub fn new(method: Method, uri: Uri, headers: HeaderMap, body: Bytes) -> Self {
        Self {
            method,
            uri,
            headers,
            body,
        }
    }

    pub fn from_parts(parts: &Parts, body: Bytes) -> Self {
        Self::new(parts.method.clone(), parts.uri.clone(), parts.headers.clone(), body)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Value of the named cookie across all `Cookie` headers.
    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.headers
            .get_all(COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|h| h.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(k, _)| *k == name)
            .map(|(_, v)| v)
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, HandlerError> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    pub fn text(&self) -> Result<&str, HandlerError> {
        std::str::from_utf8(&self.body).map_err(HandlerError::other)
    }
}

/// Identity and configuration handed to a resource constructor.
#[derive(Clone, Debug)]
pub struct ResourceContext {
    hostname: String,
    service: String,
    name: String,
    config: ResourceConfig,
    tools: Arc<ToolCatalog>,
}

impl ResourceContext {
    pub fn new(
        hostname: impl Into<String>,
        service: impl Into<String>,
        name: impl Into<String>,
        config: ResourceConfig,
        tools: Arc<ToolCatalog>,
    ) -> Self {
        Self {
            hostname: hostname.into(),
            service: service.into(),
            name: name.into(),
            config,
            tools,
        }
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &ResourceConfig {
        &self.config
    }

    pub fn tools(&self) -> &ToolCatalog {
        &self.tools
    }

    pub async fn use_tool(&self, tool: &str, params: &Value) -> Result<Value, ToolError> {
        self.tools.invoke(tool, params).await
    }

    /// Diagnostic line tagged with the resource name; silent when logging is off for this resource.
    pub fn log(&self, label: &str, value: &dyn std::fmt::Debug) {
        if self.config.logging_enabled() {
            tracing::info!(resource = %self.name, "{}: {:?}", label, value);
        }
    }

    pub fn log_assert(&self, label: &str, condition: bool) {
        if self.config.logging_enabled() && !condition {
            tracing::warn!(resource = %self.name, "assertion failed: {}", label);
        }
    }
}

#[async_trait]
pub trait Resource: Send + Sync + 'static {
    async fn handle_list(&self, _request: &ResourceRequest, _path: &str) -> HandlerResult {
        Ok(not_found())
    }

    async fn handle_get(&self, _request: &ResourceRequest, _id: &str, _path: &str) -> HandlerResult {
        Ok(not_found())
    }

    async fn handle_post(&self, _request: &ResourceRequest, _id: Option<&str>, _path: &str) -> HandlerResult {
        Ok(not_found())
    }

    async fn handle_put(&self, _request: &ResourceRequest, _id: Option<&str>, _path: &str) -> HandlerResult {
        Ok(not_found())
    }

    async fn handle_patch(&self, _request: &ResourceRequest, _id: Option<&str>, _path: &str) -> HandlerResult {
        Ok(not_found())
    }

    async fn handle_delete(&self, _request: &ResourceRequest, _id: Option<&str>, _path: &str) -> HandlerResult {
        Ok(not_found())
    }

    async fn render_list(&self, _request: &ResourceRequest, _path: &str) -> HandlerResult {
        Ok(not_found())
    }

    async fn render_get(&self, _request: &ResourceRequest, _id: &str, _path: &str) -> HandlerResult {
        Ok(not_found())
    }

    async fn render_post(&self, _request: &ResourceRequest, _id: Option<&str>, _path: &str) -> HandlerResult {
        Ok(not_found())
    }

    async fn render_put(&self, _request: &ResourceRequest, _id: Option<&str>, _path: &str) -> HandlerResult {
        Ok(not_found())
    }

    async fn render_patch(&self, _request: &ResourceRequest, _id: Option<&str>, _path: &str) -> HandlerResult {
        Ok(not_found())
    }

    async fn render_delete(&self, _request: &ResourceRequest, _id: Option<&str>, _path: &str) -> HandlerResult {
        Ok(not_found())
    }
}

/// Row of the entry-point table. `GET` splits on whether an id was given.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verb {
    List,
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Verb {
    pub fn resolve(method: &Method, has_id: bool) -> Option<Self> {
        match *method {
            Method::GET if has_id => Some(Verb::Get),
            Method::GET => Some(Verb::List),
            Method::POST => Some(Verb::Post),
            Method::PUT => Some(Verb::Put),
            Method::PATCH => Some(Verb::Patch),
            Method::DELETE => Some(Verb::Delete),
            _ => None,
        }
    }
}

/// Data-mode entry: route to the matching `handle_*` method.
pub async fn handle(resource: &dyn Resource, request: &ResourceRequest, id: Option<&str>, path: &str) -> Response {
    invoke(resource, OutputMode::Data, request, id, path).await
}

/// Presentation-mode entry: route to the matching `render_*` method.
pub async fn render(resource: &dyn Resource, request: &ResourceRequest, id: Option<&str>, path: &str) -> Response {
    invoke(resource, OutputMode::Presentation, request, id, path).await
}

pub async fn invoke(
    resource: &dyn Resource,
    mode: OutputMode,
    request: &ResourceRequest,
    id: Option<&str>,
    path: &str,
) -> Response {
    let Some(verb) = Verb::resolve(&request.method, id.is_some()) else {
        return AppError::MethodNotAllowed(request.method.to_string()).into_response();
    };

    let call = async move {
        let with_id = id.unwrap_or_default();
        match (mode, verb) {
            (OutputMode::Data, Verb::List) => resource.handle_list(request, path).await,
            (OutputMode::Data, Verb::Get) => resource.handle_get(request, with_id, path).await,
            (OutputMode::Data, Verb::Post) => resource.handle_post(request, id, path).await,
            (OutputMode::Data, Verb::Put) => resource.handle_put(request, id, path).await,
            (OutputMode::Data, Verb::Patch) => resource.handle_patch(request, id, path).await,
            (OutputMode::Data, Verb::Delete) => resource.handle_delete(request, id, path).await,
            (OutputMode::Presentation, Verb::List) => resource.render_list(request, path).await,
            (OutputMode::Presentation, Verb::Get) => resource.render_get(request, with_id, path).await,
            (OutputMode::Presentation, Verb::Post) => resource.render_post(request, id, path).await,
            (OutputMode::Presentation, Verb::Put) => resource.render_put(request, id, path).await,
            (OutputMode::Presentation, Verb::Patch) => resource.render_patch(request, id, path).await,
            (OutputMode::Presentation, Verb::Delete) => resource.render_delete(request, id, path).await,
        }
    };

    match AssertUnwindSafe(call).catch_unwind().await {
        Ok(Ok(response)) => response,
        Ok(Err(err)) => {
            tracing::error!(method = %request.method, uri = %request.uri, error = %err, "resource entry point failed");
            AppError::from(err).into_response()
        }
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            tracing::error!(method = %request.method, uri = %request.uri, panic = %message, "resource entry point panicked");
            AppError::HandlerFailure {
                trace: vec![format!("panicked: {}", message)],
                message,
            }
            .into_response()
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "resource panicked".to_string()
    }
}
