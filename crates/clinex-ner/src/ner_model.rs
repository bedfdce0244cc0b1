//! Token-classification model loaded from the Hugging Face Hub.

use std::collections::HashMap;
use std::ops::Range;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use candle_core::{DType, Device, Tensor, D};
use candle_nn::{Linear, Module, VarBuilder};
use candle_transformers::models::bert::{BertModel, Config as BertConfig};
use candle_transformers::models::distilbert::{Config as DistilBertConfig, DistilBertModel};
use hf_hub::api::sync::ApiBuilder;
use hf_hub::{Repo, RepoType};
use tokenizers::Tokenizer;
use tracing::{debug, info};

use crate::aggregation::{aggregate, TokenPrediction};
use crate::annotator::{Annotator, AnnotatorLoader, RawPrediction};
use crate::{AggregationStrategy, NerError, Result};

/// NER configuration.
#[derive(Debug, Clone)]
pub struct NerConfig {
    pub model_id: String,
    pub revision: Option<String>,
    pub cache_dir: Option<PathBuf>,
    /// Encoder window in tokens, `[CLS]` and `[SEP]` included. Longer inputs are
    /// classified window by window.
    pub max_length: usize,
    pub use_gpu: bool,
    pub aggregation: AggregationStrategy,
}

impl Default for NerConfig {
    fn default() -> Self {
        Self {
            model_id: "d4data/biomedical-ner-all".to_string(),
            revision: None,
            cache_dir: None,
            max_length: 512,
            use_gpu: false,
            aggregation: AggregationStrategy::Simple,
        }
    }
}

impl From<&clinex_config::ModelConfig> for NerConfig {
    fn from(cfg: &clinex_config::ModelConfig) -> Self {
        Self {
            model_id: cfg.model_id.clone(),
            revision: cfg.revision.clone(),
            cache_dir: cfg.cache_dir.clone(),
            max_length: cfg.max_length,
            use_gpu: cfg.use_gpu,
            aggregation: cfg.aggregation,
        }
    }
}

enum Encoder {
    Bert(BertModel),
    DistilBert(DistilBertModel),
}

impl Encoder {
    /// `input_ids` is `[1, seq]`; returns hidden states `[1, seq, hidden]`.
    fn forward(&self, input_ids: &Tensor) -> candle_core::Result<Tensor> {
        match self {
            Encoder::Bert(model) => {
                let token_type_ids = input_ids.zeros_like()?;
                let attention_mask = input_ids.ones_like()?;
                model.forward(input_ids, &token_type_ids, Some(&attention_mask))
            }
            Encoder::DistilBert(model) => {
                // Nonzero entries are masked out; a single unpadded sequence masks nothing.
                let seq_len = input_ids.dim(1)?;
                let mask = Tensor::zeros((seq_len, seq_len), DType::U8, input_ids.device())?;
                model.forward(input_ids, &mask)
            }
        }
    }
}

/// Files fetched from the hub for one checkpoint.
struct Checkpoint {
    config_json: String,
    tokenizer: Tokenizer,
    weights: PathBuf,
}

/// NER model wrapper: tokenizer, encoder and classification head.
pub struct NerModel {
    encoder: Encoder,
    classifier: Linear,
    tokenizer: Tokenizer,
    cls_id: u32,
    sep_id: u32,
    labels: Vec<String>,
    config: NerConfig,
    device: Device,
}

impl NerModel {
    /// Fetch the checkpoint and build the model. Runs on the blocking pool.
    pub async fn new(config: NerConfig) -> Result<Self> {
        tokio::task::spawn_blocking(move || Self::load(config))
            .await
            .map_err(|e| NerError::ModelLoad(e.to_string()))?
    }

    /// Blocking variant of [`NerModel::new`].
    pub fn load(config: NerConfig) -> Result<Self> {
        let start = Instant::now();
        info!("Loading NER model: {}", config.model_id);

        let device = if config.use_gpu {
            Device::cuda_if_available(0).unwrap_or(Device::Cpu)
        } else {
            Device::Cpu
        };
        debug!("Using device: {:?}", device);

        let mut checkpoint = Self::download(&config)?;
        // Windowing replaces any truncation or padding baked into tokenizer.json
        checkpoint
            .tokenizer
            .with_truncation(None)
            .map_err(|e| NerError::Tokenization(e.to_string()))?;
        checkpoint.tokenizer.with_padding(None);
        let (cls_id, sep_id) = frame_ids(&checkpoint.tokenizer)?;
        let config_json: serde_json::Value = serde_json::from_str(&checkpoint.config_json)
            .map_err(|e| NerError::ModelLoad(format!("Parse config: {}", e)))?;
        let labels = parse_labels(&config_json)?;

        info!("Loading model weights from {:?}", checkpoint.weights);
        let is_safetensors = checkpoint
            .weights
            .extension()
            .map(|e| e == "safetensors")
            .unwrap_or(false);
        let vb = if is_safetensors {
            unsafe { VarBuilder::from_mmaped_safetensors(&[&checkpoint.weights], DType::F32, &device) }
        } else {
            VarBuilder::from_pth(&checkpoint.weights, DType::F32, &device)
        };
        let vb = vb.map_err(|e| NerError::ModelLoad(e.to_string()))?;

        let model_type = config_json["model_type"].as_str().unwrap_or("bert");
        let (encoder, hidden_size) = match model_type {
            "distilbert" => {
                let cfg: DistilBertConfig = serde_json::from_str(&checkpoint.config_json)
                    .map_err(|e| NerError::ModelLoad(format!("DistilBERT config: {}", e)))?;
                let model = DistilBertModel::load(vb.clone(), &cfg)
                    .or_else(|_| DistilBertModel::load(vb.pp("distilbert"), &cfg))
                    .map_err(|e| NerError::ModelLoad(format!("DistilBertModel: {}", e)))?;
                (Encoder::DistilBert(model), dimension(&config_json, "dim")?)
            }
            _ => {
                let cfg: BertConfig = serde_json::from_str(&checkpoint.config_json)
                    .map_err(|e| NerError::ModelLoad(format!("BERT config: {}", e)))?;
                let model = BertModel::load(vb.clone(), &cfg)
                    .or_else(|_| BertModel::load(vb.pp("bert"), &cfg))
                    .map_err(|e| NerError::ModelLoad(format!("BertModel: {}", e)))?;
                (Encoder::Bert(model), dimension(&config_json, "hidden_size")?)
            }
        };

        // Weight is [num_labels, hidden], bias is [num_labels]
        let classifier = candle_nn::linear(hidden_size, labels.len(), vb.pp("classifier"))
            .map_err(|e| NerError::ModelLoad(format!("Classifier: {}", e)))?;

        info!(
            "NER model loaded in {:?} ({} encoder, {} labels)",
            start.elapsed(),
            model_type,
            labels.len()
        );

        Ok(Self {
            encoder,
            classifier,
            tokenizer: checkpoint.tokenizer,
            cls_id,
            sep_id,
            labels,
            config,
            device,
        })
    }

    fn download(config: &NerConfig) -> Result<Checkpoint> {
        let mut builder = ApiBuilder::new();
        if let Some(dir) = &config.cache_dir {
            builder = builder.with_cache_dir(dir.clone());
        }
        let api = builder
            .build()
            .map_err(|e| NerError::Download(format!("API init: {}", e)))?;

        let repo = match &config.revision {
            Some(rev) => Repo::with_revision(config.model_id.clone(), RepoType::Model, rev.clone()),
            None => Repo::new(config.model_id.clone(), RepoType::Model),
        };
        let api_repo = api.repo(repo);

        let config_path = api_repo
            .get("config.json")
            .map_err(|e| NerError::Download(format!("config.json: {}", e)))?;
        let config_json = std::fs::read_to_string(&config_path)?;

        // Prefer tokenizer.json which carries normalizer and post-processor
        let tokenizer = if let Ok(tok_path) = api_repo.get("tokenizer.json") {
            info!("Loading tokenizer from: {:?}", tok_path);
            Tokenizer::from_file(&tok_path).map_err(|e| NerError::Tokenization(e.to_string()))?
        } else if let Ok(vocab_path) = api_repo.get("vocab.txt") {
            info!("Building tokenizer from vocab.txt");
            wordpiece_tokenizer(&std::fs::read_to_string(&vocab_path)?)?
        } else {
            return Err(NerError::Download(format!("No tokenizer found for {}", config.model_id)));
        };

        let weights = api_repo
            .get("model.safetensors")
            .or_else(|_| api_repo.get("pytorch_model.bin"))
            .map_err(|e| NerError::Download(format!("Model weights: {}", e)))?;

        Ok(Checkpoint {
            config_json,
            tokenizer,
            weights,
        })
    }

    /// Classify every token of `text` and aggregate into entity predictions.
    ///
    /// Text longer than one encoder window is split into consecutive windows,
    /// each framed with `[CLS]`/`[SEP]`. Offsets always refer to `text`.
    pub fn predict(&self, text: &str) -> Result<Vec<RawPrediction>> {
        let start = Instant::now();

        let encoding = self
            .tokenizer
            .encode_char_offsets(text, false)
            .map_err(|e| NerError::Tokenization(e.to_string()))?;
        let ids = encoding.get_ids();
        let offsets = encoding.get_offsets();

        let windows = token_windows(ids.len(), self.config.max_length);
        if windows.len() > 1 {
            debug!("Classifying {} tokens in {} windows", ids.len(), windows.len());
        }

        let mut tokens = Vec::with_capacity(ids.len());
        for window in windows {
            let probs = self.classify(&framed(&ids[window.clone()], self.cls_id, self.sep_id))?;
            // Row 0 is [CLS]
            for (i, row) in window.zip(probs.iter().skip(1)) {
                let (token_start, token_end) = offsets[i];
                if token_start >= token_end {
                    continue;
                }
                let (label_id, score) = argmax(row);
                tokens.push(TokenPrediction {
                    label: self.labels[label_id].clone(),
                    score,
                    start: token_start,
                    end: token_end,
                });
            }
        }

        let entities = aggregate(&tokens, text, self.config.aggregation);
        debug!(
            "Classified {} tokens into {} entities in {:?}",
            tokens.len(),
            entities.len(),
            start.elapsed()
        );
        Ok(entities)
    }

    /// Per-token label probabilities for one framed window, `[seq, labels]`.
    fn classify(&self, ids: &[u32]) -> Result<Vec<Vec<f32>>> {
        let input_ids = Tensor::new(ids, &self.device)?.unsqueeze(0)?;
        let hidden_states = self.encoder.forward(&input_ids)?;
        let logits = self.classifier.forward(&hidden_states)?.squeeze(0)?;
        let probs = candle_nn::ops::softmax(&logits, D::Minus1)?
            .to_dtype(DType::F32)?
            .to_vec2::<f32>()?;
        Ok(probs)
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }
}

impl Annotator for NerModel {
    fn annotate(&self, text: &str) -> Result<Vec<RawPrediction>> {
        self.predict(text)
    }
}

/// Loads a [`NerModel`] from the hub.
#[derive(Debug, Clone)]
pub struct HubLoader {
    config: NerConfig,
}

impl HubLoader {
    pub fn new(config: NerConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl AnnotatorLoader for HubLoader {
    async fn load(&self) -> Result<Arc<dyn Annotator>> {
        let model = NerModel::new(self.config.clone()).await?;
        Ok(Arc::new(model))
    }

    fn describe(&self) -> String {
        match &self.config.revision {
            Some(rev) => format!("{}@{}", self.config.model_id, rev),
            None => self.config.model_id.clone(),
        }
    }
}

/// Ordered label vocabulary from the `id2label` map of `config.json`.
fn parse_labels(config_json: &serde_json::Value) -> Result<Vec<String>> {
    let id2label: HashMap<usize, String> = config_json["id2label"]
        .as_object()
        .map(|obj| {
            obj.iter()
                .filter_map(|(k, v)| Some((k.parse().ok()?, v.as_str()?.to_string())))
                .collect()
        })
        .unwrap_or_default();

    if id2label.is_empty() {
        return Err(NerError::ModelLoad("config.json has no id2label map".to_string()));
    }

    (0..id2label.len())
        .map(|id| {
            id2label
                .get(&id)
                .cloned()
                .ok_or_else(|| NerError::ModelLoad(format!("id2label is missing id {}", id)))
        })
        .collect()
}

/// Ids of the `[CLS]` and `[SEP]` tokens that frame every window.
fn frame_ids(tokenizer: &Tokenizer) -> Result<(u32, u32)> {
    let id = |token: &str| {
        tokenizer
            .token_to_id(token)
            .ok_or_else(|| NerError::ModelLoad(format!("tokenizer has no {} token", token)))
    };
    Ok((id("[CLS]")?, id("[SEP]")?))
}

/// Consecutive ranges over `len` content tokens, each short enough to fit
/// `max_length` once framed.
fn token_windows(len: usize, max_length: usize) -> Vec<Range<usize>> {
    let size = max_length.saturating_sub(2).max(1);
    (0..len)
        .step_by(size)
        .map(|start| start..(start + size).min(len))
        .collect()
}

fn framed(ids: &[u32], cls: u32, sep: u32) -> Vec<u32> {
    let mut framed = Vec::with_capacity(ids.len() + 2);
    framed.push(cls);
    framed.extend_from_slice(ids);
    framed.push(sep);
    framed
}

fn dimension(config_json: &serde_json::Value, key: &str) -> Result<usize> {
    config_json[key]
        .as_u64()
        .map(|v| v as usize)
        .ok_or_else(|| NerError::ModelLoad(format!("config.json is missing {}", key)))
}

fn argmax(row: &[f32]) -> (usize, f32) {
    row.iter()
        .copied()
        .enumerate()
        .fold((0, f32::NEG_INFINITY), |best, (i, p)| if p > best.1 { (i, p) } else { best })
}

/// BERT-style uncased WordPiece tokenizer for checkpoints that ship only `vocab.txt`.
fn wordpiece_tokenizer(vocab_content: &str) -> Result<Tokenizer> {
    use tokenizers::models::wordpiece::WordPieceBuilder;
    use tokenizers::normalizers::bert::BertNormalizer;
    use tokenizers::pre_tokenizers::bert::BertPreTokenizer;
    use tokenizers::processors::bert::BertProcessing;

    let vocab: ahash::AHashMap<String, u32> = vocab_content
        .lines()
        .enumerate()
        .map(|(i, line)| (line.trim_end().to_string(), i as u32))
        .collect();

    let special = |token: &str| {
        vocab
            .get(token)
            .copied()
            .ok_or_else(|| NerError::Tokenization(format!("vocab.txt has no {}", token)))
    };
    let cls = special("[CLS]")?;
    let sep = special("[SEP]")?;

    let wordpiece = WordPieceBuilder::new()
        .vocab(vocab)
        .continuing_subword_prefix("##".to_string())
        .max_input_chars_per_word(100)
        .unk_token("[UNK]".to_string())
        .build()
        .map_err(|e| NerError::Tokenization(format!("WordPiece: {}", e)))?;

    let mut tokenizer = Tokenizer::new(wordpiece);
    tokenizer
        .with_normalizer(Some(BertNormalizer::default()))
        .with_pre_tokenizer(Some(BertPreTokenizer))
        .with_post_processor(Some(BertProcessing::new(
            ("[SEP]".to_string(), sep),
            ("[CLS]".to_string(), cls),
        )));
    Ok(tokenizer)
}
