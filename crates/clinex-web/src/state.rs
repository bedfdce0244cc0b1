//! Shared application state for the web server.

use std::path::PathBuf;
use std::sync::Arc;

use clinex_config::Config;
use clinex_ner::{ExtractionService, HubLoader, ModelHandle, NerConfig};
use minijinja::Environment;

pub const INDEX_TEMPLATE: &str = "index.html";

/// Shared state injected into every Axum handler.
pub struct AppState {
    pub service: ExtractionService,
    pub model_id: String,
    pub static_dir: PathBuf,
    pub templates: Environment<'static>,
}

impl AppState {
    pub fn new(service: ExtractionService, config: &Config) -> anyhow::Result<Self> {
        let mut templates = Environment::new();
        templates.add_template(INDEX_TEMPLATE, include_str!("../templates/index.html"))?;

        Ok(Self {
            service,
            model_id: config.model.model_id.clone(),
            static_dir: config.server.static_dir.clone(),
            templates,
        })
    }

    /// Build the model handle for the Hugging Face checkpoint named in `config`,
    /// honouring its load policy.
    pub async fn from_config(config: &Config) -> anyhow::Result<Self> {
        let loader = Arc::new(HubLoader::new(NerConfig::from(&config.model)));
        let handle = ModelHandle::with_policy(loader, config.model.load_policy).await?;
        let service = ExtractionService::new(handle, config.extraction.default_threshold);
        Self::new(service, config)
    }
}

pub type SharedState = Arc<AppState>;
