//! Request dispatch: route coordinates to a registered resource instance and call the
//! entry point chosen by verb and output mode.

use crate::config::{ConfigTree, ResourceConfig};
use crate::error::AppError;
use crate::registry::ResourceRegistry;
use crate::resource::{self, Resource, ResourceRequest};
use crate::route::{OutputMode, RouteCoordinates};
use crate::session::{LogContext, RequestLogger, RESPONSE_TIME_HEADER, SESSION_COOKIE};
use axum::{
    body::{Body, Bytes},
    http::{
        header::{ACCEPT, HOST, SET_COOKIE},
        request::Parts,
        HeaderValue, Request,
    },
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use std::time::Instant;

pub struct Dispatcher {
    config: Arc<ConfigTree>,
    registry: Arc<ResourceRegistry>,
    logger: Arc<dyn RequestLogger>,
}

impl Dispatcher {
    pub fn new(config: Arc<ConfigTree>, registry: Arc<ResourceRegistry>, logger: Arc<dyn RequestLogger>) -> Self {
        Self {
            config,
            registry,
            logger,
        }
    }

    pub fn config(&self) -> &ConfigTree {
        &self.config
    }

    pub fn registry(&self) -> &Arc<ResourceRegistry> {
        &self.registry
    }

    pub async fn handle_request(&self, request: Request<Body>) -> Response {
        let started = Instant::now();
        let (parts, body) = request.into_parts();
        let hostname = request_hostname(&parts);
        let route = RouteCoordinates::parse(parts.uri.path());
        let context = LogContext {
            service: route.service.clone(),
            resource: route.resource.clone(),
            id: route.id.clone(),
        };

        let limit = self.config.max_body_bytes();
        let body = match axum::body::to_bytes(body, limit).await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(uri = %parts.uri, limit, error = %e, "request body rejected");
                let request = ResourceRequest::from_parts(&parts, Bytes::new());
                return self
                    .finish(&request, AppError::PayloadTooLarge(limit).into_response(), &context)
                    .await;
            }
        };
        let request = ResourceRequest::from_parts(&parts, body);

        let config = ResourceConfig::merge(&self.config, &route.service, &route.resource);
        let Some(instance) = self
            .registry
            .register(&hostname, &route.service, &route.resource, &config)
            .await
        else {
            let response = AppError::NotFound(format!("{}/{}/{}", hostname, route.service, route.resource))
                .into_response();
            return self.finish(&request, response, &context).await;
        };

        let mode = OutputMode::negotiate(request.header(ACCEPT.as_str()), route.json_requested);
        let mut response = self.invoke_within_idle_timeout(instance, mode, &request, &route).await;

        if !response.headers().contains_key(RESPONSE_TIME_HEADER) {
            let elapsed = format!("{:.3}ms", started.elapsed().as_secs_f64() * 1000.0);
            if let Ok(value) = HeaderValue::from_str(&elapsed) {
                response.headers_mut().insert(RESPONSE_TIME_HEADER, value);
            }
        }
        tracing::debug!(
            method = %request.method,
            uri = %request.uri,
            mode = ?mode,
            status = response.status().as_u16(),
            "request dispatched"
        );
        self.finish(&request, response, &context).await
    }

    /// Run the entry point on its own task. Past the idle timeout the client gets a 408, but the
    /// entry point is never cancelled: it runs to completion and its response is discarded.
    async fn invoke_within_idle_timeout(
        &self,
        instance: Arc<dyn Resource>,
        mode: OutputMode,
        request: &ResourceRequest,
        route: &RouteCoordinates,
    ) -> Response {
        let limit = self.config.idle_timeout();
        let request = request.clone();
        let id = route.id.clone();
        let path = route.remaining_path.clone();
        let task = tokio::spawn(async move {
            resource::invoke(instance.as_ref(), mode, &request, id.as_deref(), &path).await
        });

        match tokio::time::timeout(limit, task).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                tracing::error!(error = %e, "resource task failed");
                AppError::HandlerFailure {
                    message: e.to_string(),
                    trace: vec![e.to_string()],
                }
                .into_response()
            }
            Err(_) => {
                tracing::warn!(
                    service = %route.service,
                    resource = %route.resource,
                    timeout_secs = limit.as_secs(),
                    "resource did not answer within idle timeout"
                );
                AppError::Timeout(limit).into_response()
            }
        }
    }

    /// Report the exchange and attach the session cookie when the session is new.
    async fn finish(&self, request: &ResourceRequest, response: Response, context: &LogContext) -> Response {
        let (mut head, body) = response.into_parts();
        if let Some(sid) = self.logger.log_request(request, &head, context).await {
            if request.cookie(SESSION_COOKIE) != Some(sid.as_str()) {
                let cookie = format!("{}={}; Path=/; HttpOnly; SameSite=Lax", SESSION_COOKIE, sid);
                match HeaderValue::from_str(&cookie) {
                    Ok(value) => {
                        head.headers.append(SET_COOKIE, value);
                    }
                    Err(e) => tracing::warn!(session = %sid, error = %e, "session cookie not set"),
                }
            }
        }
        Response::from_parts(head, body)
    }
}

/// Host header without its port, lowercased; falls back to the URI authority, then `localhost`.
pub fn request_hostname(parts: &Parts) -> String {
    let raw = parts
        .headers
        .get(HOST)
        .and_then(|v| v.to_str().ok())
        .or_else(|| parts.uri.host())
        .unwrap_or("localhost");
    strip_port(raw).to_ascii_lowercase()
}

fn strip_port(host: &str) -> &str {
    if let Some(rest) = host.strip_prefix('[') {
        // [::1]:8080
        return rest.split(']').next().unwrap_or(rest);
    }
    match host.rsplit_once(':') {
        Some((name, port)) if !name.contains(':') && port.chars().all(|c| c.is_ascii_digit()) => name,
        _ => host,
    }
}
