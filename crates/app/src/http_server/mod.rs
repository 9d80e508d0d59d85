use axum::routing::{get, post};
use axum::{Extension, Router};
use http::header::{ACCEPT, ORIGIN, RANGE};
use http::Method;
use tokio::sync::watch;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tower_http::trace::{DefaultOnFailure, DefaultOnResponse};
use tower_http::LatencyUnit;

mod config;
mod handlers;
mod health;

pub use config::{Config, ConfigError};

use crate::ServiceState;

const STATUS_PREFIX: &str = "/_status";

/// All routes served by the node
pub fn router(config: Config, state: ServiceState) -> Router {
    let log_level = config.log_level;
    let trace_layer = TraceLayer::new_for_http()
        .on_response(
            DefaultOnResponse::new()
                .include_headers(false)
                .level(log_level)
                .latency_unit(LatencyUnit::Micros),
        )
        .on_failure(DefaultOnFailure::new().latency_unit(LatencyUnit::Micros));

    // Players embed streams from other origins
    let stream_cors = CorsLayer::new()
        .allow_methods(vec![Method::GET])
        .allow_headers(vec![ACCEPT, ORIGIN, RANGE])
        .allow_origin(Any)
        .allow_credentials(false);

    let stream_routes = Router::new()
        .route("/:file_id", get(handlers::stream::handler))
        .with_state(state.clone())
        .layer(stream_cors);

    let file_routes = Router::new()
        .route("/", get(handlers::files::list_handler))
        .route("/:file_id/health", get(handlers::files::health_handler))
        .route("/:file_id/fetch", post(handlers::files::fetch_handler))
        .with_state(state.clone());

    Router::new()
        .nest(STATUS_PREFIX, health::router(state.clone()))
        .nest("/files", file_routes)
        .nest("/stream", stream_routes)
        .route("/channels", get(handlers::channels::list_handler))
        .fallback(handlers::not_found_handler)
        .layer(Extension(config))
        .with_state(state)
        .layer(trace_layer)
}

/// Run the HTTP server until `shutdown_rx` fires
pub async fn run(
    config: Config,
    state: ServiceState,
    mut shutdown_rx: watch::Receiver<()>,
) -> Result<(), HttpServerError> {
    let listen_addr = config.listen_addr;
    let router = router(config, state);

    tracing::info!(addr = ?listen_addr, "HTTP server listening");
    let listener = tokio::net::TcpListener::bind(listen_addr).await?;

    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.changed().await;
        })
        .await?;

    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum HttpServerError {
    #[error("invalid HTTP server configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("an error occurred running the HTTP server: {0}")]
    ServingFailed(#[from] std::io::Error),
}
