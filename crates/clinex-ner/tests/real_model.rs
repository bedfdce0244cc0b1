//! Against the real checkpoint. Downloads from the Hugging Face Hub:
//! ```bash
//! cargo test -p clinex-ner --test real_model -- --ignored --nocapture
//! ```

use clinex_ner::{extract_entities, group_entities, NerConfig, NerModel};

#[tokio::test(flavor = "multi_thread")]
#[ignore] // Requires network access to the Hugging Face Hub
async fn test_fever_ibuprofen() {
    let _ = tracing_subscriber::fmt::try_init();

    let model = NerModel::new(NerConfig::default()).await.expect("model should load");
    let text = "Patient reports fever and was given ibuprofen.";
    let entities = extract_entities(&model, text, Some(0.6)).unwrap();

    for e in &entities {
        println!("  {} [{}..{}] '{}'", e.entity_type, e.start, e.end, e.text);
    }

    let fever = entities
        .iter()
        .find(|e| e.text.to_lowercase() == "fever")
        .expect("fever should be tagged");
    assert_eq!((fever.start, fever.end), (16, 21));
    assert!(fever.entity_type.contains("SYMPTOM"), "{}", fever.entity_type);

    let ibuprofen = entities
        .iter()
        .find(|e| e.text.to_lowercase() == "ibuprofen")
        .expect("ibuprofen should be tagged");
    assert_eq!((ibuprofen.start, ibuprofen.end), (36, 45));
    assert!(ibuprofen.entity_type.contains("MEDICATION"), "{}", ibuprofen.entity_type);

    // Deterministic for a fixed checkpoint
    assert_eq!(entities, extract_entities(&model, text, Some(0.6)).unwrap());
    assert_eq!(group_entities(entities.clone()).entity_count(), entities.len());
}

#[tokio::test(flavor = "multi_thread")]
#[ignore] // Requires network access to the Hugging Face Hub
async fn test_empty_text() {
    let model = NerModel::new(NerConfig::default()).await.expect("model should load");
    assert!(extract_entities(&model, "", None).unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
#[ignore] // Requires network access to the Hugging Face Hub
async fn test_text_longer_than_one_window() {
    let config = NerConfig {
        max_length: 64,
        ..Default::default()
    };
    let model = NerModel::new(config).await.expect("model should load");

    let filler = "The patient was seen in clinic today for a routine follow up visit. ".repeat(20);
    let text = format!("{}Patient reports fever and was given ibuprofen.", filler);
    let entities = extract_entities(&model, &text, Some(0.6)).unwrap();

    let offset = filler.chars().count();
    let ibuprofen = entities
        .iter()
        .find(|e| e.text.to_lowercase() == "ibuprofen")
        .expect("entities past the first window should be found");
    assert_eq!((ibuprofen.start, ibuprofen.end), (offset + 36, offset + 45));
}
