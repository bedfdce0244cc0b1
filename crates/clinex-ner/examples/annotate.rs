//! Annotate text from the command line with the configured checkpoint.
//!
//! ```bash
//! cargo run -p clinex-ner --example annotate -- "Patient reports fever and was given ibuprofen."
//! ```

use clinex_ner::{extract_entities, group_entities, NerConfig, NerModel};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let text = std::env::args()
        .skip(1)
        .collect::<Vec<_>>()
        .join(" ");
    let text = if text.is_empty() {
        "Patient reports fever and was given ibuprofen.".to_string()
    } else {
        text
    };

    let start = std::time::Instant::now();
    let model = NerModel::new(NerConfig::default()).await?;
    println!("Model loaded in {:?} ({} labels)", start.elapsed(), model.labels().len());

    let start = std::time::Instant::now();
    let entities = extract_entities(&model, &text, None)?;
    println!("Extraction took {:?}\n", start.elapsed());

    for (label, group) in group_entities(entities).iter() {
        println!("{}:", label);
        for e in group {
            println!("  '{}' [{}..{}]", e.text, e.start, e.end);
        }
    }

    Ok(())
}
