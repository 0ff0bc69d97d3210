// Worker API surface

pub mod handlers;
pub mod models;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub use handlers::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    let body_limit = state.config.max_request_size_bytes();
    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/info", post(handlers::video_info))
        .route("/api/download", post(handlers::download_video))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
