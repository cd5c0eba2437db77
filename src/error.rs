//! Typed errors and HTTP mapping.

use crate::response::{error_body, response};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("config load: {0}")]
    Load(String),
    #[error("config parse: {0}")]
    Parse(String),
    #[error("config must be a single top-level JSON object")]
    NotAnObject,
    #[error("validation: {0}")]
    Validation(String),
}

/// Failures while turning a routing key into a live resource instance.
/// Never surfaced to clients directly: the registry logs them and reports an absent instance.
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("resource not found at {location}: {reason}")]
    ResourceNotFound { location: PathBuf, reason: String },
    #[error("resource source {location} does not export '{export}'")]
    InvalidResourceExport { location: PathBuf, export: String },
    #[error("resource source {location} could not be loaded: {reason}")]
    Load { location: PathBuf, reason: String },
    #[error("constructing resource {key} failed: {source}")]
    Construct {
        key: String,
        #[source]
        source: HandlerError,
    },
    #[error("registry is closed")]
    Closed,
}

/// Failure raised inside a resource entry point or constructor.
#[derive(Error, Debug)]
pub enum HandlerError {
    #[error("{0}")]
    Failed(String),
    #[error("invalid request body: {0}")]
    InvalidBody(#[from] serde_json::Error),
    #[error(transparent)]
    Tool(#[from] ToolError),
    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl HandlerError {
    pub fn msg(message: impl Into<String>) -> Self {
        HandlerError::Failed(message.into())
    }

    pub fn other<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        HandlerError::Other(Box::new(err))
    }

    /// Error message followed by every cause in its source chain.
    pub fn trace(&self) -> Vec<String> {
        let mut trace = vec![self.to_string()];
        let mut cause = std::error::Error::source(self);
        while let Some(err) = cause {
            trace.push(format!("caused by: {}", err));
            cause = err.source();
        }
        trace
    }
}

#[derive(Error, Debug)]
pub enum ToolError {
    #[error("unknown tool: {0}")]
    UnknownTool(String),
    #[error("missing or invalid required parameter: {0}")]
    InvalidParameter(String),
    #[error("validation: {0}")]
    Validation(String),
    #[error("tool failed: {0}")]
    Failed(String),
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("resource not found: {0}")]
    NotFound(String),
    #[error("method not allowed: {0}")]
    MethodNotAllowed(String),
    #[error("request body exceeds {0} bytes")]
    PayloadTooLarge(usize),
    #[error("no response within {0:?}")]
    Timeout(std::time::Duration),
    #[error("handler failure: {message}")]
    HandlerFailure { message: String, trace: Vec<String> },
}

impl From<HandlerError> for AppError {
    fn from(err: HandlerError) -> Self {
        AppError::HandlerFailure {
            message: err.to_string(),
            trace: err.trace(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::NotFound(_) => response(StatusCode::NOT_FOUND, "Resource not found", &[]),
            AppError::MethodNotAllowed(_) => {
                response(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed", &[])
            }
            AppError::PayloadTooLarge(_) => {
                response(StatusCode::PAYLOAD_TOO_LARGE, "Payload Too Large", &[])
            }
            AppError::Timeout(_) => response(StatusCode::REQUEST_TIMEOUT, "Request Timeout", &[]),
            AppError::HandlerFailure { message, trace } => response(
                StatusCode::INTERNAL_SERVER_ERROR,
                error_body("Internal Server Error", message, trace),
                &[],
            ),
        }
    }
}
