//! Axum router: maps all URL paths to handlers.

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{
    compression::CompressionLayer,
    cors::CorsLayer,
    services::ServeDir,
    trace::TraceLayer,
};

use crate::handlers::{
    extract::{extract, extract_grouped},
    index::index,
    system::health,
};
use crate::state::{AppState, SharedState};

/// Build and return the full Axum router.
pub fn build_router(state: AppState) -> Router {
    let static_files = ServeDir::new(&state.static_dir);
    let shared: SharedState = Arc::new(state);

    Router::new()
        // Pages
        .route("/", get(index))

        // API endpoints
        .route("/extract",         post(extract))
        .route("/extract_grouped", post(extract_grouped))
        .route("/health",          get(health))

        // Static files
        .nest_service("/static", static_files)

        // Middleware
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CompressionLayer::new())
                .layer(CorsLayer::permissive()),
        )
        .with_state(shared)
}
