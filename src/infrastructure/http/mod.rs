mod request_id;

pub use request_id::{request_id_middleware, RequestId};

use axum::{middleware, routing::get, Router};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::controllers::{health, PodcastController};
use crate::domain::pipeline::TaskRegistry;
use crate::infrastructure::config::Config;

/// Start the HTTP server with all routes configured
pub async fn start_http_server(
    config: Arc<Config>,
    registry: Arc<TaskRegistry>,
    podcast_controller: Arc<PodcastController>,
) -> Result<(), Box<dyn std::error::Error>> {
    // Podcast routes (public - submission is the whole surface)
    let podcast_routes = Router::new()
        .route(
            "/api/podcasts",
            axum::routing::post(PodcastController::submit),
        )
        .route(
            "/api/podcasts/:taskId",
            get(PodcastController::status).delete(PodcastController::cancel),
        )
        .route("/api/podcasts/:taskId/audio", get(PodcastController::audio))
        .with_state(podcast_controller.clone());

    // Build application routes
    let app = Router::new()
        .route("/health", get(health::health))
        .route("/health/ready", get(health::health_ready))
        .with_state(registry.clone())
        .merge(podcast_routes)
        .layer(middleware::from_fn(request_id_middleware))
        .layer(TraceLayer::new_for_http());

    // Start server
    let listener =
        tokio::net::TcpListener::bind(format!("{}:{}", config.host, config.port)).await?;

    tracing::info!("Server listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;

    Ok(())
}
