//! Merging per-token predictions into entity spans.

use crate::annotator::RawPrediction;
use crate::labels::{is_outside, split_tag, BioPrefix};
use crate::AggregationStrategy;

/// Argmax prediction for a single (non-special) token.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenPrediction {
    /// Full model label, e.g. `B-Medication` or `O`.
    pub label: String,
    pub score: f32,
    /// Character span of the token in the input text.
    pub start: usize,
    pub end: usize,
}

/// Aggregate token predictions (in input order) into entity predictions.
///
/// With [`AggregationStrategy::Simple`] a token joins the running group when it has
/// the same tag and is not a `B-` token; the group score is the mean of its members.
/// Groups (or tokens, for [`AggregationStrategy::None`]) tagged `O` are dropped.
pub fn aggregate(
    tokens: &[TokenPrediction],
    text: &str,
    strategy: AggregationStrategy,
) -> Vec<RawPrediction> {
    let surface = Surface::new(text);

    match strategy {
        AggregationStrategy::None => tokens
            .iter()
            .filter(|t| !is_outside(&t.label))
            .map(|t| surface.prediction(split_tag(&t.label).1, t.score, t.start, t.end))
            .collect(),
        AggregationStrategy::Simple => {
            let mut entities = Vec::new();
            let mut group: Vec<&TokenPrediction> = Vec::new();

            for token in tokens {
                if let Some(last) = group.last() {
                    let (bi, tag) = split_tag(&token.label);
                    let (_, last_tag) = split_tag(&last.label);
                    if tag != last_tag || bi == BioPrefix::Begin {
                        entities.extend(surface.group(&group));
                        group.clear();
                    }
                }
                group.push(token);
            }
            entities.extend(surface.group(&group));

            entities
        }
    }
}

/// Character-offset view of the input text.
struct Surface<'a> {
    text: &'a str,
    /// Byte index of every char boundary, including `text.len()`.
    boundaries: Vec<usize>,
}

impl<'a> Surface<'a> {
    fn new(text: &'a str) -> Self {
        let boundaries = text
            .char_indices()
            .map(|(i, _)| i)
            .chain(std::iter::once(text.len()))
            .collect();
        Self { text, boundaries }
    }

    fn slice(&self, start: usize, end: usize) -> String {
        match (self.boundaries.get(start), self.boundaries.get(end)) {
            (Some(&s), Some(&e)) if s <= e => self.text[s..e].to_string(),
            _ => String::new(),
        }
    }

    fn prediction(&self, tag: &str, score: f32, start: usize, end: usize) -> RawPrediction {
        RawPrediction {
            word: self.slice(start, end),
            entity_group: tag.to_string(),
            score,
            start,
            end,
        }
    }

    fn group(&self, members: &[&TokenPrediction]) -> Option<RawPrediction> {
        let (first, last) = (members.first()?, members.last()?);
        let (_, tag) = split_tag(&first.label);
        if is_outside(tag) {
            return None;
        }
        let score = members.iter().map(|t| t.score).sum::<f32>() / members.len() as f32;
        Some(self.prediction(tag, score, first.start, last.end))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tok(label: &str, score: f32, start: usize, end: usize) -> TokenPrediction {
        TokenPrediction { label: label.to_string(), score, start, end }
    }

    // "Patient reports fever and was given ibuprofen."
    //  0       8       16    22  26  30    36       45
    fn fever_tokens() -> Vec<TokenPrediction> {
        vec![
            tok("O", 0.99, 0, 7),
            tok("O", 0.98, 8, 15),
            tok("B-Sign_symptom", 0.95, 16, 21),
            tok("O", 0.99, 22, 25),
            tok("O", 0.99, 26, 29),
            tok("O", 0.97, 30, 35),
            tok("B-Medication", 0.90, 36, 39),
            tok("I-Medication", 0.80, 39, 45),
            tok("O", 0.99, 45, 46),
        ]
    }

    #[test]
    fn test_simple_merges_subwords() {
        let text = "Patient reports fever and was given ibuprofen.";
        let entities = aggregate(&fever_tokens(), text, AggregationStrategy::Simple);

        assert_eq!(entities.len(), 2);
        assert_eq!(entities[0].word, "fever");
        assert_eq!(entities[0].entity_group, "Sign_symptom");
        assert_eq!((entities[0].start, entities[0].end), (16, 21));

        assert_eq!(entities[1].word, "ibuprofen");
        assert_eq!(entities[1].entity_group, "Medication");
        assert_eq!((entities[1].start, entities[1].end), (36, 45));
        assert!((entities[1].score - 0.85).abs() < 1e-6);
    }

    #[test]
    fn test_simple_splits_on_begin() {
        let text = "aspirin heparin";
        let tokens = vec![tok("B-Medication", 0.9, 0, 7), tok("B-Medication", 0.8, 8, 15)];
        let entities = aggregate(&tokens, text, AggregationStrategy::Simple);
        assert_eq!(entities.len(), 2);
        assert_eq!(entities[0].word, "aspirin");
        assert_eq!(entities[1].word, "heparin");
    }

    #[test]
    fn test_simple_splits_on_tag_change() {
        let text = "chest pain";
        let tokens = vec![
            tok("B-Biological_structure", 0.9, 0, 5),
            tok("I-Sign_symptom", 0.7, 6, 10),
        ];
        let entities = aggregate(&tokens, text, AggregationStrategy::Simple);
        assert_eq!(entities.len(), 2);
        assert_eq!(entities[0].entity_group, "Biological_structure");
        assert_eq!(entities[1].entity_group, "Sign_symptom");
        assert_eq!(entities[1].word, "pain");
    }

    #[test]
    fn test_dangling_inside_starts_group() {
        let text = "severe cough";
        let tokens = vec![tok("O", 0.9, 0, 6), tok("I-Sign_symptom", 0.6, 7, 12)];
        let entities = aggregate(&tokens, text, AggregationStrategy::Simple);
        assert_eq!(entities.len(), 1);
        assert_eq!(entities[0].word, "cough");
    }

    #[test]
    fn test_none_strategy_keeps_tokens() {
        let text = "Patient reports fever and was given ibuprofen.";
        let entities = aggregate(&fever_tokens(), text, AggregationStrategy::None);
        assert_eq!(entities.len(), 3);
        assert_eq!(entities[1].word, "ibu");
        assert_eq!(entities[2].word, "profen");
        assert_eq!(entities[2].entity_group, "Medication");
    }

    #[test]
    fn test_offsets_are_characters() {
        let text = "Fièvre élevée";
        let tokens = vec![tok("B-Sign_symptom", 0.9, 0, 6), tok("I-Sign_symptom", 0.9, 7, 13)];
        let entities = aggregate(&tokens, text, AggregationStrategy::Simple);
        assert_eq!(entities.len(), 1);
        assert_eq!(entities[0].word, "Fièvre élevée");
        assert_eq!(entities[0].end, text.chars().count());
    }

    #[test]
    fn test_empty_input() {
        assert!(aggregate(&[], "", AggregationStrategy::Simple).is_empty());
        assert!(aggregate(&[], "", AggregationStrategy::None).is_empty());
    }
}
