//! Entity schema, threshold filtering and grouping by type.

use std::collections::HashMap;
use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::annotator::{Annotator, RawPrediction};
use crate::labels::entity_type_label;
use crate::{NerError, Result};

/// A labeled span of the input text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Entity {
    pub text: String,
    #[serde(rename = "type")]
    pub entity_type: String,
    /// Character offset, inclusive.
    pub start: usize,
    /// Character offset, exclusive.
    pub end: usize,
    /// UMLS concept identifier. Never populated: no ontology linking is performed.
    pub umls_code: Option<String>,
}

impl From<RawPrediction> for Entity {
    fn from(pred: RawPrediction) -> Self {
        Self {
            text: pred.word,
            entity_type: entity_type_label(&pred.entity_group),
            start: pred.start,
            end: pred.end,
            umls_code: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub entities: Vec<Entity>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupedExtractionResult {
    pub groups: EntityGroups,
}

/// Entities keyed by type, in first-seen type order.
///
/// Serializes as a JSON object whose keys keep that order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntityGroups(Vec<(String, Vec<Entity>)>);

impl EntityGroups {
    pub fn get(&self, entity_type: &str) -> Option<&[Entity]> {
        self.0
            .iter()
            .find(|(label, _)| label == entity_type)
            .map(|(_, entities)| entities.as_slice())
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(label, _)| label.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[Entity])> {
        self.0.iter().map(|(label, entities)| (label.as_str(), entities.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Total number of entities across all groups.
    pub fn entity_count(&self) -> usize {
        self.0.iter().map(|(_, entities)| entities.len()).sum()
    }
}

impl Serialize for EntityGroups {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (label, entities) in &self.0 {
            map.serialize_entry(label, entities)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for EntityGroups {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct GroupsVisitor;

        impl<'de> Visitor<'de> for GroupsVisitor {
            type Value = EntityGroups;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of entity type to entity list")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> std::result::Result<Self::Value, A::Error> {
                let mut groups = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((label, entities)) = access.next_entry::<String, Vec<Entity>>()? {
                    groups.push((label, entities));
                }
                Ok(EntityGroups(groups))
            }
        }

        deserializer.deserialize_map(GroupsVisitor)
    }
}

/// Reject thresholds outside `[0, 1]` (and NaN).
pub fn validate_threshold(threshold: f32) -> Result<f32> {
    if threshold.is_finite() && (0.0..=1.0).contains(&threshold) {
        Ok(threshold)
    } else {
        Err(NerError::InvalidInput(format!(
            "threshold must be within [0, 1], got {}",
            threshold
        )))
    }
}

/// Run the annotator over `text` and keep predictions scoring at least `threshold`.
///
/// `None` keeps everything. Order follows the annotator.
pub fn extract_entities(
    annotator: &dyn Annotator,
    text: &str,
    threshold: Option<f32>,
) -> Result<Vec<Entity>> {
    let threshold = threshold.map(validate_threshold).transpose()?;

    let entities = annotator
        .annotate(text)?
        .into_iter()
        .filter(|pred| threshold.map_or(true, |t| pred.score >= t))
        .map(Entity::from)
        .collect();

    Ok(entities)
}

/// Partition entities by type, keeping relative order within each group.
pub fn group_entities(entities: Vec<Entity>) -> EntityGroups {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut groups: Vec<(String, Vec<Entity>)> = Vec::new();

    for entity in entities {
        match index.get(&entity.entity_type) {
            Some(&i) => groups[i].1.push(entity),
            None => {
                index.insert(entity.entity_type.clone(), groups.len());
                groups.push((entity.entity_type.clone(), vec![entity]));
            }
        }
    }

    EntityGroups(groups)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{prediction, StubAnnotator};

    fn fever() -> StubAnnotator {
        StubAnnotator::new(vec![
            prediction("fever", "Sign_symptom", 0.95, 16, 21),
            prediction("and", "Detailed_description", 0.41, 22, 25),
            prediction("ibuprofen", "Medication", 0.85, 36, 45),
        ])
    }

    #[test]
    fn test_threshold_filters_low_scores() {
        let entities = extract_entities(&fever(), "ignored", Some(0.6)).unwrap();
        assert_eq!(entities.len(), 2);
        assert_eq!(entities[0].entity_type, "SIGN_SYMPTOM");
        assert_eq!(entities[1].entity_type, "MEDICATION");
    }

    #[test]
    fn test_no_threshold_keeps_all() {
        let entities = extract_entities(&fever(), "ignored", None).unwrap();
        assert_eq!(entities.len(), 3);
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let entities = extract_entities(&fever(), "ignored", Some(0.85)).unwrap();
        assert_eq!(entities.len(), 2);
    }

    #[test]
    fn test_invalid_threshold() {
        let annotator = fever();
        for bad in [-0.1, 1.01, f32::NAN, f32::INFINITY] {
            let err = extract_entities(&annotator, "ignored", Some(bad)).unwrap_err();
            assert!(matches!(err, NerError::InvalidInput(_)), "{bad} accepted");
        }
        assert_eq!(annotator.calls(), 0);
    }

    #[test]
    fn test_single_annotator_call() {
        let annotator = fever();
        extract_entities(&annotator, "ignored", Some(0.5)).unwrap();
        assert_eq!(annotator.calls(), 1);
    }

    #[test]
    fn test_umls_code_absent() {
        let entities = extract_entities(&fever(), "ignored", None).unwrap();
        assert!(entities.iter().all(|e| e.umls_code.is_none()));
    }

    #[test]
    fn test_entity_json_shape() {
        let entity = Entity {
            text: "fever".into(),
            entity_type: "SIGN_SYMPTOM".into(),
            start: 16,
            end: 21,
            umls_code: None,
        };
        let json = serde_json::to_value(&entity).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "text": "fever",
                "type": "SIGN_SYMPTOM",
                "start": 16,
                "end": 21,
                "umls_code": null
            })
        );
    }

    #[test]
    fn test_group_preserves_first_seen_order() {
        let entities = vec![
            Entity::from(prediction("cough", "Sign_symptom", 0.9, 0, 5)),
            Entity::from(prediction("aspirin", "Medication", 0.9, 6, 13)),
            Entity::from(prediction("fever", "Sign_symptom", 0.9, 14, 19)),
        ];
        let groups = group_entities(entities);

        assert_eq!(groups.labels().collect::<Vec<_>>(), vec!["SIGN_SYMPTOM", "MEDICATION"]);
        let symptoms = groups.get("SIGN_SYMPTOM").unwrap();
        assert_eq!(symptoms[0].text, "cough");
        assert_eq!(symptoms[1].text, "fever");
        assert_eq!(groups.entity_count(), 3);
        assert!(groups.get("DISEASE_DISORDER").is_none());
    }

    #[test]
    fn test_group_empty() {
        let groups = group_entities(Vec::new());
        assert!(groups.is_empty());
        assert_eq!(serde_json::to_string(&groups).unwrap(), "{}");
    }

    #[test]
    fn test_groups_serialize_in_order() {
        let groups = group_entities(vec![
            Entity::from(prediction("wheeze", "Sign_symptom", 0.9, 0, 6)),
            Entity::from(prediction("asthma", "Disease_disorder", 0.9, 7, 13)),
        ]);
        let json = serde_json::to_string(&groups).unwrap();
        let symptom = json.find("SIGN_SYMPTOM").unwrap();
        let disease = json.find("DISEASE_DISORDER").unwrap();
        assert!(symptom < disease);

        let back: EntityGroups = serde_json::from_str(&json).unwrap();
        assert_eq!(back, groups);
    }
}
