//! Entity extraction endpoints.

use axum::{
    extract::{rejection::JsonRejection, State},
    response::Json,
};
use clinex_ner::{ExtractionResult, GroupedExtractionResult};
use serde::Deserialize;

use crate::error::ApiError;
use crate::state::SharedState;

#[derive(Debug, Deserialize)]
pub struct TextInput {
    pub text: String,
    /// Overrides the configured default threshold for this request.
    #[serde(default)]
    pub threshold: Option<f32>,
}

/// POST /extract: flat list of entities in text order
pub async fn extract(
    State(state): State<SharedState>,
    payload: Result<Json<TextInput>, JsonRejection>,
) -> Result<Json<ExtractionResult>, ApiError> {
    let Json(input) = payload?;
    let result = state.service.extract(input.text, input.threshold).await?;
    Ok(Json(result))
}

/// POST /extract_grouped: entities keyed by type
pub async fn extract_grouped(
    State(state): State<SharedState>,
    payload: Result<Json<TextInput>, JsonRejection>,
) -> Result<Json<GroupedExtractionResult>, ApiError> {
    let Json(input) = payload?;
    let result = state
        .service
        .extract_grouped(input.text, input.threshold)
        .await?;
    Ok(Json(result))
}
