//! Clinical Named Entity Recognition using Candle.
//!
//! Loads a pre-trained token-classification checkpoint from the Hugging Face Hub
//! (by default `d4data/biomedical-ner-all`) and turns its token predictions into
//! character-offset entity spans: symptoms, diseases, medications, lab values and
//! the rest of the checkpoint's label vocabulary.
//!
//! The model sits behind the [`Annotator`] trait. Everything above it (threshold
//! filtering, grouping, load policy) works against that trait, so it can be driven
//! by a deterministic stub in tests.

mod aggregation;
mod annotator;
mod extraction;
mod labels;
mod model_handle;
mod ner_model;
mod service;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use aggregation::{aggregate, TokenPrediction};
pub use annotator::{Annotator, AnnotatorLoader, RawPrediction};
pub use clinex_config::{AggregationStrategy, LoadPolicy};
pub use extraction::{
    extract_entities, group_entities, validate_threshold, Entity, EntityGroups, ExtractionResult,
    GroupedExtractionResult,
};
pub use labels::{entity_type_label, split_tag, BioPrefix, OUTSIDE};
pub use model_handle::ModelHandle;
pub use ner_model::{HubLoader, NerConfig, NerModel};
pub use service::ExtractionService;

pub type Result<T> = std::result::Result<T, NerError>;

#[derive(Debug, thiserror::Error)]
pub enum NerError {
    #[error("Model loading failed: {0}")]
    ModelLoad(String),

    #[error("Tokenization failed: {0}")]
    Tokenization(String),

    #[error("Inference failed: {0}")]
    Inference(String),

    #[error("Download failed: {0}")]
    Download(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Coarse fault category, reported to HTTP clients alongside the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultKind {
    Load,
    Inference,
    Validation,
}

impl NerError {
    pub fn kind(&self) -> FaultKind {
        match self {
            NerError::ModelLoad(_) | NerError::Download(_) => FaultKind::Load,
            NerError::Tokenization(_) | NerError::Inference(_) => FaultKind::Inference,
            NerError::InvalidInput(_) => FaultKind::Validation,
        }
    }
}

impl From<candle_core::Error> for NerError {
    fn from(e: candle_core::Error) -> Self {
        NerError::Inference(e.to_string())
    }
}

impl From<std::io::Error> for NerError {
    fn from(e: std::io::Error) -> Self {
        NerError::Download(e.to_string())
    }
}

impl From<hf_hub::api::sync::ApiError> for NerError {
    fn from(e: hf_hub::api::sync::ApiError) -> Self {
        NerError::Download(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fault_kinds() {
        assert_eq!(NerError::ModelLoad("x".into()).kind(), FaultKind::Load);
        assert_eq!(NerError::Download("x".into()).kind(), FaultKind::Load);
        assert_eq!(NerError::Tokenization("x".into()).kind(), FaultKind::Inference);
        assert_eq!(NerError::Inference("x".into()).kind(), FaultKind::Inference);
        assert_eq!(NerError::InvalidInput("x".into()).kind(), FaultKind::Validation);
    }

    #[test]
    fn test_fault_kind_serializes_snake_case() {
        let json = serde_json::to_string(&FaultKind::Validation).unwrap();
        assert_eq!(json, "\"validation\"");
    }
}
