//! Configuration loading for Clinex.
//! Reads clinex.toml from the current directory or the path in the CLINEX_CONFIG env var,
//! then applies CLINEX_* environment overrides.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub type Result<T> = std::result::Result<T, ConfigError>;

pub const DEFAULT_CONFIG_FILE: &str = "clinex.toml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for {key}: {value}")]
    InvalidOverride { key: &'static str, value: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub extraction: ExtractionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_static_dir")]
    pub static_dir: PathBuf,
}

fn default_host()       -> String  { "127.0.0.1".to_string() }
fn default_port()       -> u16     { 8000 }
fn default_static_dir() -> PathBuf { PathBuf::from("static") }

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            static_dir: default_static_dir(),
        }
    }
}

/// When the checkpoint gets loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadPolicy {
    /// Load before binding the listener; a failure aborts startup.
    Eager,
    /// Load on the first extraction request, retrying on the next request after a failure.
    #[default]
    Lazy,
    /// Start loading in the background at boot and behave like `Lazy` if that fails.
    Warm,
}

impl std::str::FromStr for LoadPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "eager" => Ok(LoadPolicy::Eager),
            "lazy" => Ok(LoadPolicy::Lazy),
            "warm" => Ok(LoadPolicy::Warm),
            other => Err(format!("unknown load policy '{}'", other)),
        }
    }
}

/// How sub-token predictions are merged into entity spans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationStrategy {
    /// Every non-O token is its own entity.
    None,
    /// Adjacent tokens with the same tag merge unless the next one opens a new `B-` span.
    #[default]
    Simple,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_model_id")]
    pub model_id: String,
    /// Hub revision (branch, tag or commit). `None` means `main`.
    #[serde(default)]
    pub revision: Option<String>,
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,
    #[serde(default = "default_max_length")]
    pub max_length: usize,
    #[serde(default)]
    pub use_gpu: bool,
    #[serde(default)]
    pub aggregation: AggregationStrategy,
    #[serde(default)]
    pub load_policy: LoadPolicy,
}

fn default_model_id()   -> String { "d4data/biomedical-ner-all".to_string() }
fn default_max_length() -> usize  { 512 }

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model_id: default_model_id(),
            revision: None,
            cache_dir: None,
            max_length: default_max_length(),
            use_gpu: false,
            aggregation: AggregationStrategy::default(),
            load_policy: LoadPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionConfig {
    /// Minimum confidence for an entity to be returned when a request does not set one.
    /// `0.0` disables filtering.
    #[serde(default = "default_threshold")]
    pub default_threshold: f32,
}

fn default_threshold() -> f32 { 0.6 }

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self { default_threshold: default_threshold() }
    }
}

impl Config {
    /// Load configuration from clinex.toml (or CLINEX_CONFIG) and the process environment.
    pub fn load() -> Result<Self> {
        Self::load_with(|key| std::env::var(key).ok())
    }

    /// Like [`Config::load`], resolving variables through `lookup`.
    ///
    /// A missing ./clinex.toml means defaults; a missing file named by
    /// CLINEX_CONFIG is a read error.
    pub fn load_with<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match lookup("CLINEX_CONFIG") {
            Some(path) => Self::from_file(path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => Self::from_file(DEFAULT_CONFIG_FILE)?,
            None => Self::default(),
        };

        config.apply_overrides(&lookup)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Apply CLINEX_* overrides. `lookup` resolves a variable name to its value.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("CLINEX_HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("CLINEX_PORT") {
            self.server.port = port.trim().parse().map_err(|_| ConfigError::InvalidOverride {
                key: "CLINEX_PORT",
                value: port.clone(),
            })?;
        }
        if let Some(model_id) = lookup("CLINEX_MODEL_ID") {
            self.model.model_id = model_id;
        }
        if let Some(policy) = lookup("CLINEX_LOAD_POLICY") {
            self.model.load_policy = policy.parse().map_err(|_| ConfigError::InvalidOverride {
                key: "CLINEX_LOAD_POLICY",
                value: policy.clone(),
            })?;
        }
        if let Some(threshold) = lookup("CLINEX_THRESHOLD") {
            self.extraction.default_threshold =
                threshold.trim().parse().map_err(|_| ConfigError::InvalidOverride {
                    key: "CLINEX_THRESHOLD",
                    value: threshold.clone(),
                })?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let t = self.extraction.default_threshold;
        if !t.is_finite() || !(0.0..=1.0).contains(&t) {
            return Err(ConfigError::Invalid(format!(
                "extraction.default_threshold must be within [0, 1], got {}",
                t
            )));
        }
        // Each encoder window carries [CLS] and [SEP] plus at least one token
        if self.model.max_length < 3 {
            return Err(ConfigError::Invalid(format!(
                "model.max_length must be at least 3, got {}",
                self.model.max_length
            )));
        }
        if self.model.model_id.trim().is_empty() {
            return Err(ConfigError::Invalid("model.model_id must not be empty".to_string()));
        }
        Ok(())
    }

    /// Socket address string for the listener.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
