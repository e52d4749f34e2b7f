//! HTTP route definitions

use crate::api::handlers;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Create the main application router
pub fn create_router(state: Arc<crate::AppState>) -> Router {
    let api_routes = Router::new()
        // Host discovery
        .route("/hosts", get(handlers::list_hosts))
        .route("/hosts/stream", get(handlers::stream_hosts))
        .route("/hosts/online", get(handlers::online_hosts))
        .route("/hosts/best", get(handlers::best_host))
        .route("/hosts/:name", get(handlers::cached_host))
        // Model index
        .route("/models", get(handlers::list_models))
        .route("/models/:name/hosts", get(handlers::model_hosts))
        // Routed generation
        .route("/generate", post(handlers::generate))
        .route("/generate/stream", post(handlers::generate_stream));

    Router::new()
        .route("/health", get(handlers::health_check))
        .nest("/v1", api_routes)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
