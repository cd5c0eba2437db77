//! Standard response helpers shared by resources and the dispatcher.

use axum::{
    body::Body,
    http::{
        header::{HeaderName, HeaderValue, CONTENT_TYPE},
        HeaderMap, StatusCode,
    },
    response::Response,
};
use serde_json::Value;

pub const JSON_CONTENT_TYPE: &str = "application/json";
pub const TEXT_CONTENT_TYPE: &str = "text/plain";

/// Body content handed to [`response`]. Structured values become JSON; text stays text.
#[derive(Clone, Debug, PartialEq)]
pub enum Content {
    Json(Value),
    Text(String),
}

impl From<Value> for Content {
    fn from(value: Value) -> Self {
        match value {
            Value::String(s) => Content::Text(s),
            other => Content::Json(other),
        }
    }
}

impl From<&str> for Content {
    fn from(s: &str) -> Self {
        Content::Text(s.to_string())
    }
}

impl From<String> for Content {
    fn from(s: String) -> Self {
        Content::Text(s)
    }
}

/// Build a response. Content-Type defaults to `application/json` and may be overridden
/// through `headers`; text content that would still be labeled JSON is sent as `text/plain`.
pub fn response(status: StatusCode, content: impl Into<Content>, headers: &[(&str, &str)]) -> Response {
    let mut map = HeaderMap::new();
    map.insert(CONTENT_TYPE, HeaderValue::from_static(JSON_CONTENT_TYPE));
    for (name, value) in headers {
        match (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(value)) {
            (Ok(name), Ok(value)) => {
                map.insert(name, value);
            }
            _ => tracing::warn!(header = %name, "dropping invalid response header"),
        }
    }

    let body = match content.into() {
        Content::Json(value) => value.to_string(),
        Content::Text(text) => {
            let labeled_json = map
                .get(CONTENT_TYPE)
                .map(|v| v.as_bytes() == JSON_CONTENT_TYPE.as_bytes())
                .unwrap_or(false);
            if labeled_json {
                map.insert(CONTENT_TYPE, HeaderValue::from_static(TEXT_CONTENT_TYPE));
            }
            text
        }
    };

    let mut resp = Response::new(Body::from(body));
    *resp.status_mut() = status;
    *resp.headers_mut() = map;
    resp
}

/// Default reply of every entry point a resource does not override.
pub fn not_found() -> Response {
    response(StatusCode::NOT_FOUND, "Not Found", &[])
}

/// Structured body for failures contained at the resource boundary.
pub fn error_body(error: &str, message: String, trace: Vec<String>) -> Value {
    serde_json::json!({
        "error": error,
        "message": message,
        "trace": trace
    })
}
