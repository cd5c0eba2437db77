//! Duwende: resource-routed HTTP application framework.
//!
//! Requests to `/{service}/{resource}/{id}/{rest...}` are routed to resource instances keyed by
//! `(hostname, service, resource)`. Each resource answers in data mode (JSON) or presentation
//! mode (rendered text/HTML) depending on the `Accept` header or a `.json` suffix.

pub mod catalog;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod handlers;
pub mod loader;
pub mod registry;
pub mod resource;
pub mod response;
pub mod route;
pub mod routes;
pub mod server;
pub mod session;
pub mod state;
pub mod tool;

pub use catalog::{ResourceCatalog, ResourceConstructor};
pub use config::{
    config_path_from_env, load_config, load_config_or_default, parse_config, ConfigTree, ResourceConfig,
};
pub use dispatch::Dispatcher;
pub use error::{AppError, ConfigError, HandlerError, RegistryError, ToolError};
pub use loader::{ManifestLoader, ResourceLoader, ResourceManifest};
pub use registry::{RegistryOptions, ResourceRegistry, RoutingKey};
pub use resource::{HandlerResult, Resource, ResourceContext, ResourceRequest};
pub use response::{response, Content};
pub use route::{OutputMode, RouteCoordinates};
pub use routes::resource_routes;
pub use server::{init_tracing, Server, ServerBuilder};
pub use session::{LogContext, RequestLogger, SessionLogger};
pub use state::AppState;
pub use tool::{ParamRule, ParamSchema, ParamType, Tool, ToolCatalog};
