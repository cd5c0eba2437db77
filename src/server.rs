//! Server lifecycle: assemble the registry, dispatcher and router, then serve until Ctrl-C.

use crate::catalog::ResourceCatalog;
use crate::config::ConfigTree;
use crate::dispatch::Dispatcher;
use crate::loader::{ManifestLoader, ResourceLoader};
use crate::registry::{RegistryOptions, ResourceRegistry};
use crate::routes::resource_routes;
use crate::session::{RequestLogger, SessionLogger};
use crate::state::AppState;
use crate::tool::ToolCatalog;
use axum::Router;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

pub struct Server {
    config: Arc<ConfigTree>,
    registry: Arc<ResourceRegistry>,
    state: AppState,
}

impl Server {
    /// Server with manifest loading from disk and session logging as configured.
    pub fn new(config: ConfigTree, catalog: ResourceCatalog, tools: ToolCatalog) -> Self {
        Self::builder(config).catalog(catalog).tools(tools).build()
    }

    pub fn builder(config: ConfigTree) -> ServerBuilder {
        ServerBuilder {
            config,
            catalog: ResourceCatalog::new(),
            tools: ToolCatalog::new(),
            loader: None,
            logger: None,
            registry_options: RegistryOptions::default(),
        }
    }

    pub fn config(&self) -> &ConfigTree {
        &self.config
    }

    pub fn registry(&self) -> &Arc<ResourceRegistry> {
        &self.registry
    }

    pub fn state(&self) -> AppState {
        self.state.clone()
    }

    pub fn addr(&self) -> SocketAddr {
        SocketAddr::from((Ipv4Addr::UNSPECIFIED, self.config.port()))
    }

    pub fn router(&self) -> Router {
        resource_routes(self.state.clone()).layer(TraceLayer::new_for_http())
    }

    /// Bind the configured port and serve.
    pub async fn run(self) -> std::io::Result<()> {
        let listener = TcpListener::bind(self.addr()).await?;
        self.serve(listener).await
    }

    pub async fn serve(self, listener: TcpListener) -> std::io::Result<()> {
        let addr = listener.local_addr()?;
        tracing::info!("listening on http://{}", addr);
        let result = axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown_signal())
            .await;
        self.close();
        result
    }

    /// Drop every cached resource instance. Later requests answer 404.
    pub fn close(&self) {
        self.registry.close();
    }
}

pub struct ServerBuilder {
    config: ConfigTree,
    catalog: ResourceCatalog,
    tools: ToolCatalog,
    loader: Option<Arc<dyn ResourceLoader>>,
    logger: Option<Arc<dyn RequestLogger>>,
    registry_options: RegistryOptions,
}

impl ServerBuilder {
    pub fn catalog(mut self, catalog: ResourceCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn tools(mut self, tools: ToolCatalog) -> Self {
        self.tools = tools;
        self
    }

    /// Replace manifest loading; the catalog is ignored then.
    pub fn loader(mut self, loader: Arc<dyn ResourceLoader>) -> Self {
        self.loader = Some(loader);
        self
    }

    pub fn logger(mut self, logger: Arc<dyn RequestLogger>) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn registry_options(mut self, options: RegistryOptions) -> Self {
        self.registry_options = options;
        self
    }

    pub fn build(self) -> Server {
        let config = Arc::new(self.config);
        let loader = self
            .loader
            .unwrap_or_else(|| Arc::new(ManifestLoader::new(Arc::new(self.catalog))));
        let logger = self
            .logger
            .unwrap_or_else(|| Arc::new(SessionLogger::new(config.session_logging())));
        let registry = Arc::new(
            ResourceRegistry::open(loader)
                .with_options(self.registry_options)
                .with_tools(Arc::new(self.tools)),
        );
        let dispatcher = Dispatcher::new(config.clone(), registry.clone(), logger);
        Server {
            config,
            registry,
            state: AppState::new(dispatcher),
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}

/// Install the fmt subscriber, filtered by `RUST_LOG` or `default_directive`.
pub fn init_tracing(default_directive: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));
    if tracing_subscriber::fmt().with_env_filter(filter).try_init().is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}
