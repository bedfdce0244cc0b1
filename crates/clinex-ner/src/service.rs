//! Request-level extraction: threshold resolution, model access, blocking inference.

use std::sync::Arc;

use tracing::debug;

use crate::extraction::{
    extract_entities, group_entities, validate_threshold, ExtractionResult, GroupedExtractionResult,
};
use crate::{ModelHandle, NerError, Result};

/// Shared extraction entry point used by the HTTP handlers.
#[derive(Debug, Clone)]
pub struct ExtractionService {
    handle: Arc<ModelHandle>,
    default_threshold: f32,
}

impl ExtractionService {
    pub fn new(handle: Arc<ModelHandle>, default_threshold: f32) -> Self {
        Self { handle, default_threshold }
    }

    pub fn handle(&self) -> &Arc<ModelHandle> {
        &self.handle
    }

    pub fn default_threshold(&self) -> f32 {
        self.default_threshold
    }

    /// Extract entities scoring at least `threshold` (or the default threshold).
    ///
    /// The threshold is validated before the model is touched, so a bad request
    /// never triggers a load.
    pub async fn extract(&self, text: String, threshold: Option<f32>) -> Result<ExtractionResult> {
        let threshold = validate_threshold(threshold.unwrap_or(self.default_threshold))?;
        let annotator = self.handle.get().await?;

        let chars = text.chars().count();
        let entities = tokio::task::spawn_blocking(move || {
            extract_entities(annotator.as_ref(), &text, Some(threshold))
        })
        .await
        .map_err(|e| NerError::Inference(format!("inference task failed: {}", e)))??;

        debug!(
            "Extracted {} entities from {} chars (threshold {})",
            entities.len(),
            chars,
            threshold
        );
        Ok(ExtractionResult { entities })
    }

    /// Like [`extract`](Self::extract), grouped by entity type.
    pub async fn extract_grouped(&self, text: String, threshold: Option<f32>) -> Result<GroupedExtractionResult> {
        let ExtractionResult { entities } = self.extract(text, threshold).await?;
        Ok(GroupedExtractionResult {
            groups: group_entities(entities),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FailingAnnotator, KeywordAnnotator, ScriptedLoader};
    use crate::FaultKind;

    fn service(default_threshold: f32) -> ExtractionService {
        let handle = ModelHandle::ready(Arc::new(KeywordAnnotator::clinical()));
        ExtractionService::new(Arc::new(handle), default_threshold)
    }

    #[tokio::test]
    async fn test_default_threshold_applies() {
        let text = "mild fever".to_string();
        let result = service(0.6).extract(text.clone(), None).await.unwrap();
        assert_eq!(result.entities.len(), 1);
        assert_eq!(result.entities[0].text, "fever");

        let result = service(0.0).extract(text, None).await.unwrap();
        assert_eq!(result.entities.len(), 2);
    }

    #[tokio::test]
    async fn test_request_threshold_overrides_default() {
        let result = service(0.6)
            .extract("mild fever".to_string(), Some(0.0))
            .await
            .unwrap();
        assert_eq!(result.entities.len(), 2);
    }

    #[tokio::test]
    async fn test_bad_threshold_does_not_load() {
        let loader = Arc::new(ScriptedLoader::new(Arc::new(KeywordAnnotator::clinical())));
        let service = ExtractionService::new(Arc::new(ModelHandle::lazy(loader.clone())), 0.6);

        let err = service.extract("fever".to_string(), Some(2.0)).await.unwrap_err();
        assert_eq!(err.kind(), FaultKind::Validation);
        assert_eq!(loader.attempts(), 0);
    }

    #[tokio::test]
    async fn test_inference_fault_kind() {
        let handle = ModelHandle::ready(Arc::new(FailingAnnotator));
        let service = ExtractionService::new(Arc::new(handle), 0.6);
        let err = service.extract("fever".to_string(), None).await.unwrap_err();
        assert_eq!(err.kind(), FaultKind::Inference);
    }

    #[tokio::test]
    async fn test_grouped() {
        let result = service(0.6)
            .extract_grouped("fever, cough and ibuprofen".to_string(), None)
            .await
            .unwrap();
        assert_eq!(
            result.groups.labels().collect::<Vec<_>>(),
            vec!["SIGN_SYMPTOM", "MEDICATION"]
        );
        assert_eq!(result.groups.get("SIGN_SYMPTOM").unwrap().len(), 2);
    }
}
