//! REST API server module
//!
//! Thin HTTP boundary over [`FileDownloader`]: request validation, JSON
//! bodies, error mapping and the OpenAPI document.

use crate::{FileDownloader, Result};
use axum::{
    Router,
    http::HeaderValue,
    routing::{get, post},
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub mod error_response;
pub mod openapi;
pub mod routes;
pub mod state;

pub use openapi::ApiDoc;
pub use state::AppState;

/// Create the API router with all route definitions
///
/// # Routes
///
/// ## Tasks
/// - `POST /api/v1/tasks` - Create a task from a list of URLs
/// - `GET /api/v1/tasks` - List all tasks
/// - `GET /api/v1/tasks/:id/status` - Get task status and per-file state
///
/// ## System
/// - `GET /api/v1/openapi.json` - OpenAPI specification
/// - `GET /health` - Health check
/// - `GET /` - Service banner
pub fn create_router(downloader: FileDownloader) -> Router {
    let config = downloader.config().clone();
    let state = AppState::new(downloader, config.clone());

    let api = Router::new()
        .route("/tasks", post(routes::create_task))
        .route("/tasks", get(routes::list_tasks))
        .route("/tasks/:id/status", get(routes::get_task_status))
        .route("/openapi.json", get(routes::openapi_spec));

    let router = Router::new()
        .nest("/api/v1", api)
        .route("/health", get(routes::health_check))
        .route("/", get(routes::root))
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    if config.server.api.cors_enabled {
        let cors = build_cors_layer(&config.server.api.cors_origins);
        router.layer(cors)
    } else {
        router
    }
}

/// Build a CORS layer based on configured origins
///
/// `"*"` (or an empty list) allows any origin; otherwise only the listed
/// origins that parse as header values are allowed.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    let allow_any = origins.iter().any(|o| o == "*");

    if allow_any || origins.is_empty() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let allowed: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();

        CorsLayer::new()
            .allow_origin(AllowOrigin::list(allowed))
            .allow_methods(Any)
            .allow_headers(Any)
    }
}

/// Serve the API on the configured bind address until `shutdown` is cancelled.
///
/// In-flight requests are allowed to finish once shutdown begins.
///
/// # Errors
///
/// Returns [`Error::Io`](crate::Error::Io) when the address cannot be bound
/// and [`Error::ApiServerError`](crate::Error::ApiServerError) when serving fails.
pub async fn start_api_server(downloader: FileDownloader, shutdown: CancellationToken) -> Result<()> {
    let bind_address = downloader.config().server.api.bind_address;

    tracing::info!(address = %bind_address, "Starting API server");

    let app = create_router(downloader);

    let listener = TcpListener::bind(bind_address)
        .await
        .map_err(crate::error::Error::Io)?;

    tracing::info!(
        address = %listener.local_addr().unwrap_or(bind_address),
        "API server listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(|e| crate::error::Error::ApiServerError(e.to_string()))?;

    tracing::info!("API server stopped");
    Ok(())
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
