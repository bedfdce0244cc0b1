//! Deterministic annotators and loaders for tests.
//!
//! Enabled inside this crate's tests and, for downstream crates, with the `testing`
//! feature.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::{Annotator, AnnotatorLoader, NerError, RawPrediction, Result};

pub fn prediction(word: &str, entity_group: &str, score: f32, start: usize, end: usize) -> RawPrediction {
    RawPrediction {
        word: word.to_string(),
        entity_group: entity_group.to_string(),
        score,
        start,
        end,
    }
}

/// Returns the same predictions for every input.
pub struct StubAnnotator {
    predictions: Vec<RawPrediction>,
    calls: AtomicUsize,
}

impl StubAnnotator {
    pub fn new(predictions: Vec<RawPrediction>) -> Self {
        Self { predictions, calls: AtomicUsize::new(0) }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Annotator for StubAnnotator {
    fn annotate(&self, _text: &str) -> Result<Vec<RawPrediction>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.predictions.clone())
    }
}

/// Tags every occurrence of known words, emitting predictions left to right.
pub struct KeywordAnnotator {
    keywords: Vec<(String, String, f32)>,
}

impl KeywordAnnotator {
    /// `keywords` are `(word, label, score)` triples.
    pub fn new(keywords: &[(&str, &str, f32)]) -> Self {
        Self {
            keywords: keywords
                .iter()
                .map(|(w, l, s)| (w.to_string(), l.to_string(), *s))
                .collect(),
        }
    }

    /// Fever/ibuprofen/hypertension vocabulary used across the test suites.
    pub fn clinical() -> Self {
        Self::new(&[
            ("fever", "Sign_symptom", 0.97),
            ("cough", "Sign_symptom", 0.91),
            ("ibuprofen", "Medication", 0.88),
            ("hypertension", "Disease_disorder", 0.93),
            ("mild", "Severity", 0.42),
        ])
    }
}

impl Annotator for KeywordAnnotator {
    fn annotate(&self, text: &str) -> Result<Vec<RawPrediction>> {
        let mut found = Vec::new();
        for (word, label, score) in &self.keywords {
            for (byte_start, _) in text.match_indices(word.as_str()) {
                let start = text[..byte_start].chars().count();
                let end = start + word.chars().count();
                found.push(prediction(word, label, *score, start, end));
            }
        }
        found.sort_by_key(|p| p.start);
        Ok(found)
    }
}

/// Fails every call with an inference fault.
pub struct FailingAnnotator;

impl Annotator for FailingAnnotator {
    fn annotate(&self, _text: &str) -> Result<Vec<RawPrediction>> {
        Err(NerError::Inference("tensor shape mismatch".to_string()))
    }
}

/// Loader that fails a set number of times before handing out its annotator.
pub struct ScriptedLoader {
    annotator: Arc<dyn Annotator>,
    failures_left: AtomicUsize,
    attempts: AtomicUsize,
    delay: Duration,
}

impl ScriptedLoader {
    pub fn new(annotator: Arc<dyn Annotator>) -> Self {
        Self {
            annotator,
            failures_left: AtomicUsize::new(0),
            attempts: AtomicUsize::new(0),
            delay: Duration::ZERO,
        }
    }

    pub fn failing_first(mut self, failures: usize) -> Self {
        self.failures_left = AtomicUsize::new(failures);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Number of times `load` has been called.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AnnotatorLoader for ScriptedLoader {
    async fn load(&self) -> Result<Arc<dyn Annotator>> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let remaining = self.failures_left.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures_left.store(remaining - 1, Ordering::SeqCst);
            return Err(NerError::Download("checkpoint unavailable: connection refused".to_string()));
        }
        Ok(Arc::clone(&self.annotator))
    }

    fn describe(&self) -> String {
        "scripted-test-model".to_string()
    }
}
