//! Per-session request logging.
//!
//! Every dispatched request is reported exactly once to a [`RequestLogger`], which returns the
//! session id the response should carry. [`SessionLogger`] appends one JSON line per request to
//! `<session_dir>/<session id>.log`.

use crate::config::{SessionLogLevel, SessionLoggingConfig};
use crate::resource::ResourceRequest;
use async_trait::async_trait;
use axum::http::{response::Parts, HeaderMap, HeaderName};
use serde_json::{json, Map, Value};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

pub const SESSION_COOKIE: &str = "session_id";
pub const RESPONSE_TIME_HEADER: &str = "x-response-time";

const MAX_SESSION_ID_LEN: usize = 128;
const REDACTED_HEADERS: [&str; 3] = ["authorization", "cookie", "set-cookie"];

/// Which resource a request was routed to.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LogContext {
    pub service: String,
    pub resource: String,
    pub id: Option<String>,
}

#[async_trait]
pub trait RequestLogger: Send + Sync {
    /// Record the exchange; `None` means no session is tracked and no cookie should be set.
    /// The response is seen as its head only; its body may already be streaming.
    async fn log_request(&self, request: &ResourceRequest, response: &Parts, context: &LogContext) -> Option<String>;
}

/// Logger that records nothing.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopLogger;

#[async_trait]
impl RequestLogger for NoopLogger {
    async fn log_request(&self, _request: &ResourceRequest, _response: &Parts, _context: &LogContext) -> Option<String> {
        None
    }
}

#[derive(Clone, Debug)]
pub struct SessionLogger {
    enabled: bool,
    level: SessionLogLevel,
    session_dir: PathBuf,
}

impl SessionLogger {
    pub fn new(config: SessionLoggingConfig) -> Self {
        Self {
            enabled: config.enabled,
            level: config.level,
            session_dir: config.session_dir,
        }
    }

    pub fn session_dir(&self) -> &Path {
        &self.session_dir
    }

    pub fn log_path(&self, session_id: &str) -> PathBuf {
        self.session_dir.join(format!("{}.log", session_id))
    }

    fn event(&self, session_id: &str, request: &ResourceRequest, response: &Parts, context: &LogContext) -> Value {
        let mut event = json!({
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "sessionId": session_id,
            "method": request.method.as_str(),
            "url": request.uri.to_string(),
            "service": context.service,
            "resource": context.resource,
            "id": context.id,
            "status": response.status.as_u16(),
        });
        if self.level == SessionLogLevel::Basic {
            return event;
        }
        if let Some(obj) = event.as_object_mut() {
            obj.insert("accept".into(), json!(request.header("accept")));
            let elapsed = response
                .headers
                .get(RESPONSE_TIME_HEADER)
                .and_then(|v| v.to_str().ok());
            obj.insert("responseTime".into(), json!(elapsed));
            if self.level == SessionLogLevel::Verbose {
                obj.insert("requestHeaders".into(), Value::Object(sanitize_headers(&request.headers)));
            }
        }
        event
    }

    async fn append(&self, session_id: &str, event: &Value) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.session_dir).await?;
        let mut line = serde_json::to_string(event)?;
        line.push('\n');
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.log_path(session_id))
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await
    }
}

impl Default for SessionLogger {
    fn default() -> Self {
        Self::new(SessionLoggingConfig::default())
    }
}

#[async_trait]
impl RequestLogger for SessionLogger {
    async fn log_request(&self, request: &ResourceRequest, response: &Parts, context: &LogContext) -> Option<String> {
        if !self.enabled {
            return None;
        }
        let session_id = request
            .cookie(SESSION_COOKIE)
            .filter(|sid| is_valid_session_id(sid))
            .map(str::to_string)
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let event = self.event(&session_id, request, response, context);
        if let Err(e) = self.append(&session_id, &event).await {
            tracing::warn!(session = %session_id, error = %e, "session log write failed");
        }
        Some(session_id)
    }
}

/// Session ids become file names, so only short `[A-Za-z0-9_-]` values are accepted.
pub fn is_valid_session_id(sid: &str) -> bool {
    !sid.is_empty()
        && sid.len() <= MAX_SESSION_ID_LEN
        && sid.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

fn sanitize_headers(headers: &HeaderMap) -> Map<String, Value> {
    let mut out = Map::new();
    for (name, value) in headers {
        let shown = if is_redacted(name) {
            "[REDACTED]".to_string()
        } else {
            String::from_utf8_lossy(value.as_bytes()).into_owned()
        };
        out.insert(name.as_str().to_string(), Value::String(shown));
    }
    out
}

fn is_redacted(name: &HeaderName) -> bool {
    REDACTED_HEADERS.contains(&name.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Bytes;
    use axum::http::{header, HeaderValue, Method, StatusCode, Uri};

    fn request(cookie: Option<&str>) -> ResourceRequest {
        let mut headers = HeaderMap::new();
        headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer secret"));
        if let Some(c) = cookie {
            headers.insert(header::COOKIE, HeaderValue::from_str(c).unwrap());
        }
        ResourceRequest::new(Method::GET, Uri::from_static("/test/hello/1"), headers, Bytes::new())
    }

    fn ok_response() -> Parts {
        let (mut parts, _) = axum::http::Response::new(()).into_parts();
        parts.status = StatusCode::OK;
        parts
            .headers
            .insert(RESPONSE_TIME_HEADER, HeaderValue::from_static("1.250ms"));
        parts
    }

    fn context() -> LogContext {
        LogContext {
            service: "test".into(),
            resource: "hello".into(),
            id: Some("1".into()),
        }
    }

    fn logger(dir: &Path, level: SessionLogLevel) -> SessionLogger {
        SessionLogger::new(SessionLoggingConfig {
            enabled: true,
            level,
            session_dir: dir.join("sessions"),
        })
    }

    async fn read_events(path: PathBuf) -> Vec<Value> {
        tokio::fs::read_to_string(path)
            .await
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[test]
    fn session_id_shape() {
        assert!(is_valid_session_id("a1b2-c3_d4"));
        assert!(!is_valid_session_id(""));
        assert!(!is_valid_session_id("../etc/passwd"));
        assert!(!is_valid_session_id(&"x".repeat(129)));
    }

    #[tokio::test]
    async fn new_session_gets_fresh_id_and_log_file() {
        let dir = tempfile::tempdir().unwrap();
        let logger = logger(dir.path(), SessionLogLevel::Basic);

        let sid = logger.log_request(&request(None), &ok_response(), &context()).await.unwrap();
        assert!(uuid::Uuid::parse_str(&sid).is_ok());

        let events = read_events(logger.log_path(&sid)).await;
        assert_eq!(events.len(), 1);
        let e = &events[0];
        assert_eq!(e["sessionId"], sid.as_str());
        assert_eq!(e["method"], "GET");
        assert_eq!(e["url"], "/test/hello/1");
        assert_eq!(e["service"], "test");
        assert_eq!(e["resource"], "hello");
        assert_eq!(e["id"], "1");
        assert_eq!(e["status"], 200);
        assert!(e.get("accept").is_none());
    }

    #[tokio::test]
    async fn existing_cookie_is_reused_and_appended() {
        let dir = tempfile::tempdir().unwrap();
        let logger = logger(dir.path(), SessionLogLevel::Basic);
        let req = request(Some("session_id=abc-123"));

        let first = logger.log_request(&req, &ok_response(), &context()).await;
        let second = logger.log_request(&req, &ok_response(), &context()).await;
        assert_eq!(first.as_deref(), Some("abc-123"));
        assert_eq!(second.as_deref(), Some("abc-123"));
        assert_eq!(read_events(logger.log_path("abc-123")).await.len(), 2);
    }

    #[tokio::test]
    async fn unsafe_cookie_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let logger = logger(dir.path(), SessionLogLevel::Basic);
        let sid = logger
            .log_request(&request(Some("session_id=../../x")), &ok_response(), &context())
            .await
            .unwrap();
        assert_ne!(sid, "../../x");
    }

    #[tokio::test]
    async fn verbose_adds_timing_and_redacted_headers() {
        let dir = tempfile::tempdir().unwrap();
        let logger = logger(dir.path(), SessionLogLevel::Verbose);
        let sid = logger
            .log_request(&request(Some("session_id=v1")), &ok_response(), &context())
            .await
            .unwrap();

        let e = &read_events(logger.log_path(&sid)).await[0];
        assert_eq!(e["accept"], "application/json");
        assert_eq!(e["responseTime"], "1.250ms");
        assert_eq!(e["requestHeaders"]["authorization"], "[REDACTED]");
        assert_eq!(e["requestHeaders"]["cookie"], "[REDACTED]");
        assert_eq!(e["requestHeaders"]["accept"], "application/json");
    }

    #[tokio::test]
    async fn detailed_omits_headers() {
        let dir = tempfile::tempdir().unwrap();
        let logger = logger(dir.path(), SessionLogLevel::Detailed);
        let sid = logger.log_request(&request(None), &ok_response(), &context()).await.unwrap();
        let e = &read_events(logger.log_path(&sid)).await[0];
        assert_eq!(e["responseTime"], "1.250ms");
        assert!(e.get("requestHeaders").is_none());
    }

    #[tokio::test]
    async fn disabled_logger_tracks_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let logger = SessionLogger::new(SessionLoggingConfig {
            enabled: false,
            level: SessionLogLevel::Basic,
            session_dir: dir.path().join("sessions"),
        });
        assert!(logger.log_request(&request(None), &ok_response(), &context()).await.is_none());
        assert!(!dir.path().join("sessions").exists());
    }
}
