//! Routing coordinates and output mode derived from a request.
//!
//! Path scheme: `/{service}/{resource}[.json]/{id}/{remaining...}`.

pub const DEFAULT_RESOURCE: &str = "index";
pub const JSON_SUFFIX: &str = ".json";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RouteCoordinates {
    pub service: String,
    pub resource: String,
    pub id: Option<String>,
    pub remaining_path: String,
    /// Resource segment carried a `.json` suffix.
    pub json_requested: bool,
}

impl RouteCoordinates {
    pub fn parse(path: &str) -> Self {
        let segments: Vec<&str> = path.split('/').skip(1).collect();
        let segment = |i: usize| segments.get(i).copied().filter(|s| !s.is_empty());

        let service = segment(0).unwrap_or("").to_string();
        let (resource, json_requested) = match segment(1) {
            Some(raw) => match raw.strip_suffix(JSON_SUFFIX) {
                Some(stripped) => (stripped, true),
                None => (raw, false),
            },
            None => (DEFAULT_RESOURCE, false),
        };
        let resource = if resource.is_empty() { DEFAULT_RESOURCE } else { resource }.to_string();
        let id = segment(2).map(str::to_string);
        let remaining_path = segments.get(3..).map(|rest| rest.join("/")).unwrap_or_default();

        Self {
            service,
            resource,
            id,
            remaining_path,
            json_requested,
        }
    }
}

/// Which family of entry points answers a request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputMode {
    /// Machine-readable output through `handle_*`.
    Data,
    /// Human-facing output through `render_*`.
    Presentation,
}

impl OutputMode {
    pub fn negotiate(accept: Option<&str>, json_requested: bool) -> Self {
        if json_requested || accept.map(|a| a.contains("json")).unwrap_or(false) {
            OutputMode::Data
        } else {
            OutputMode::Presentation
        }
    }
}
