//! Liveness probe.

use axum::response::Json;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
}

/// GET /health: reports healthy whether or not the model has been loaded.
pub async fn health() -> Json<HealthStatus> {
    Json(HealthStatus { status: "healthy" })
}
