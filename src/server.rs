//! HTTP Server
//!
//! Axum-based server wiring: shared state, CORS, request tracing, graceful
//! shutdown, and the unauthenticated liveness routes.

use axum::{
    extract::Request,
    http::{header, HeaderValue, Method},
    response::Json,
    routing::get,
    Router, ServiceExt,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::signal;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::normalize_path::NormalizePath;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::api;
use crate::auth::Keys;
use crate::config::{Config, Defaults};
use crate::panel::PanelApi;
use crate::store::Store;

/// Shared state handed to every request handler
pub struct AppState {
    pub store: Store,
    pub panel: Arc<dyn PanelApi>,
    pub auth: Keys,
    pub defaults: Defaults,
}

/// API server
pub struct ApiServer {
    config: Config,
    state: Arc<AppState>,
}

impl ApiServer {
    pub fn new(config: Config, state: Arc<AppState>) -> Self {
        Self { config, state }
    }

    /// Build the router with all routes and middleware.
    ///
    /// The documented API paths use trailing slashes (`/api/servers/`), while
    /// nested routers match the bare form, so the finished router is wrapped
    /// in trailing-slash normalization. Wrapping is required: a layer added
    /// via `Router::layer` would run after routing has already happened.
    pub fn build_router(&self) -> NormalizePath<Router> {
        let origins: Vec<HeaderValue> = self
            .config
            .cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();

        let cors = CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
            .allow_credentials(true);

        let router = Router::new()
            .route("/", get(root_handler))
            .route("/health", get(health_handler))
            .nest("/api/auth", api::auth::router())
            .nest("/api/users", api::users::router())
            .nest("/api/servers", api::servers::router())
            .layer(cors)
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone());

        NormalizePath::trim_trailing_slash(router)
    }

    /// Start the server and run until shutdown signal
    pub async fn run(self) -> anyhow::Result<()> {
        let addr = self.config.socket_addr();
        let app = self.build_router();

        info!("Starting MCHost Panel API on {addr}");

        let listener = tokio::net::TcpListener::bind(addr).await?;

        axum::serve(listener, ServiceExt::<Request>::into_make_service(app))
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        info!("Server shut down gracefully");
        Ok(())
    }
}

/// Service info
async fn root_handler() -> Json<Value> {
    Json(json!({
        "message": "Welcome to MCHostPanel API",
        "version": env!("CARGO_PKG_VERSION"),
        "docs": "/docs",
    }))
}

/// Liveness check
async fn health_handler() -> Json<Value> {
    Json(json!({ "status": "healthy" }))
}

/// Wait for Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
