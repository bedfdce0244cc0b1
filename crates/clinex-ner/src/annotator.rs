//! The seam between entity extraction and the model that powers it.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::Result;

/// One aggregated prediction from a token-classification model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawPrediction {
    /// Surface text of the span.
    pub word: String,
    /// Bare label tag as the model names it, e.g. `Sign_symptom`.
    pub entity_group: String,
    /// Confidence in `[0, 1]`.
    pub score: f32,
    /// Character offset of the first character.
    pub start: usize,
    /// Character offset one past the last character.
    pub end: usize,
}

/// Turns text into raw entity predictions.
///
/// Implementations are synchronous and may be slow; async callers should run them
/// on the blocking pool.
pub trait Annotator: Send + Sync {
    fn annotate(&self, text: &str) -> Result<Vec<RawPrediction>>;
}

/// Produces an [`Annotator`], typically by fetching and building a checkpoint.
#[async_trait]
pub trait AnnotatorLoader: Send + Sync {
    async fn load(&self) -> Result<Arc<dyn Annotator>>;

    /// Human-readable name of what gets loaded, for logs.
    fn describe(&self) -> String;
}
