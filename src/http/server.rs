//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the demo handlers
//! - Wire up middleware (tracing, status remapping, timeout)
//! - Bind server to listener
//! - Swap the status mapping when a new configuration arrives

use std::time::Duration;

use axum::{
    error_handling::HandleErrorLayer,
    extract::Path,
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{any, get},
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tower::ServiceBuilder;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::ServerConfig;
use crate::http::middleware::{RemapError, StatusRemapLayer};
use crate::lifecycle::{shutdown_signal, ShutdownSignal};
use crate::remap::{SharedMapping, StatusMapping};

/// HTTP server fronted by the status remapping middleware.
pub struct HttpServer {
    router: Router,
    mapping: SharedMapping,
    overrides: Vec<(String, String)>,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    pub fn new(config: ServerConfig) -> Self {
        Self::with_overrides(config, Vec::new())
    }

    /// Create a server whose mapping also includes `overrides`, applied after
    /// the configured codes and kept across reloads.
    pub fn with_overrides(config: ServerConfig, overrides: Vec<(String, String)>) -> Self {
        let mapping = SharedMapping::new(build_mapping(&config, &overrides));
        let router = build_router(&config, mapping.clone());
        Self {
            router,
            mapping,
            overrides,
        }
    }

    /// Run the server, accepting connections on the given listener.
    pub async fn run(
        self,
        listener: TcpListener,
        mut config_updates: mpsc::UnboundedReceiver<ServerConfig>,
        mut shutdown: ShutdownSignal,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            mappings = ?self.mapping.load().entries(),
            "HTTP server starting"
        );

        let mapping = self.mapping.clone();
        let overrides = self.overrides.clone();
        let reload = tokio::spawn(async move {
            while let Some(new_config) = config_updates.recv().await {
                let new_mapping = build_mapping(&new_config, &overrides);
                tracing::info!(mappings = ?new_mapping.entries(), "Applying reloaded status mapping");
                mapping.store(new_mapping);
            }
        });

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                tokio::select! {
                    _ = shutdown.recv() => {}
                    _ = shutdown_signal() => {}
                }
                tracing::info!("Shutdown signal received");
            })
            .await?;

        reload.abort();
        tracing::info!("HTTP server stopped");
        Ok(())
    }

    pub fn mapping(&self) -> &SharedMapping {
        &self.mapping
    }
}

/// Mapping from the configured codes followed by `overrides`.
pub fn build_mapping(config: &ServerConfig, overrides: &[(String, String)]) -> StatusMapping {
    StatusMapping::from_pairs(
        config
            .remap
            .status_pairs()
            .into_iter()
            .chain(overrides.iter().cloned()),
    )
}

/// Build the Axum router with all middleware layers.
///
/// The remap layer sits outside the timeout so a 408 can be remapped too.
pub fn build_router(config: &ServerConfig, mapping: SharedMapping) -> Router {
    let remap = ServiceBuilder::new()
        .layer(HandleErrorLayer::new(handle_remap_error))
        .layer(StatusRemapLayer::new(mapping, config.remap.max_body_bytes));

    Router::new()
        .route("/", get(index))
        .route("/status/{code}", any(status_handler))
        .route("/redirect/{*target}", any(redirect_handler))
        .route("/panic", any(panic_handler))
        .route("/delay/{secs}", any(delay_handler))
        .fallback(not_found)
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(config.timeouts.request_secs),
        ))
        .layer(remap)
        .layer(TraceLayer::new_for_http())
}

/// The response could not be committed; nothing more specific can be sent.
async fn handle_remap_error(err: RemapError) -> impl IntoResponse {
    tracing::error!(error = %err, "Status remapping failed");
    (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
}

async fn index() -> &'static str {
    "status-remap\n"
}

/// Respond with the requested status.
async fn status_handler(Path(code): Path<u16>) -> impl IntoResponse {
    match StatusCode::from_u16(code) {
        Ok(status) => (status, format!("status {}\n", code)),
        Err(_) => (StatusCode::BAD_REQUEST, "invalid status code\n".to_string()),
    }
}

async fn redirect_handler(Path(target): Path<String>) -> impl IntoResponse {
    (StatusCode::FOUND, [(header::LOCATION, format!("/{}", target))])
}

/// Sleep before answering, to exercise the request timeout.
async fn delay_handler(Path(secs): Path<u64>) -> &'static str {
    tokio::time::sleep(Duration::from_secs(secs)).await;
    "done\n"
}

async fn panic_handler() -> &'static str {
    panic!("handler panicked on request")
}

async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "not found\n")
}
