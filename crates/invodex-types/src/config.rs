//! Configuration loading.
//!
//! Layered precedence: built-in defaults -> config file
//! (~/.config/invodex/config.toml) -> CLI-specified file -> INVODEX_* env
//! vars. CLI flags are applied by the caller after loading.

use config::{Config, Environment, File};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::InvodexError;

/// Extraction pipeline settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionSettings {
    /// Template-stage confidence at or above this skips the generative
    /// fallback entirely.
    #[serde(default = "default_template_threshold")]
    pub template_confidence_threshold: f32,

    /// OpenAI-compatible chat endpoint for the generative extractor.
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Model used for generative extraction.
    #[serde(default = "default_extraction_model")]
    pub model: String,

    /// API key (loaded from env var, not stored in config file).
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_template_threshold() -> f32 {
    0.8
}

fn default_api_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_extraction_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    3
}

impl Default for ExtractionSettings {
    fn default() -> Self {
        Self {
            template_confidence_threshold: default_template_threshold(),
            api_base_url: default_api_base_url(),
            model: default_extraction_model(),
            api_key: None,
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
        }
    }
}

/// Vendor normalization settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VendorSettings {
    /// Similarity in [0, 1] at or above which a raw name reuses an existing
    /// canonical vendor instead of creating a new one.
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,
}

fn default_similarity_threshold() -> f32 {
    0.85
}

impl Default for VendorSettings {
    fn default() -> Self {
        Self {
            similarity_threshold: default_similarity_threshold(),
        }
    }
}

/// Embedding provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingSettings {
    /// Primary provider: "local" (candle BGE) or "api".
    #[serde(default = "default_embedding_provider")]
    pub provider: String,

    /// Optional secondary provider tried when the primary is exhausted.
    #[serde(default)]
    pub fallback_provider: Option<String>,

    /// HuggingFace repo for the local model.
    #[serde(default = "default_local_model")]
    pub model: String,

    /// Vector dimension. Fixed per provider; both built-in providers are
    /// configured to 1024 so a deployment can switch without reindexing
    /// dimension mismatches.
    #[serde(default = "default_dimension")]
    pub dimension: usize,

    /// OpenAI-compatible embeddings endpoint for the "api" provider.
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    #[serde(default = "default_api_model")]
    pub api_model: String,

    /// API key (loaded from env var, not stored in config file).
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_embedding_provider() -> String {
    "local".to_string()
}

fn default_local_model() -> String {
    "BAAI/bge-large-en-v1.5".to_string()
}

fn default_dimension() -> usize {
    1024
}

fn default_api_model() -> String {
    "text-embedding-3-small".to_string()
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            fallback_provider: None,
            model: default_local_model(),
            dimension: default_dimension(),
            api_base_url: default_api_base_url(),
            api_model: default_api_model(),
            api_key: None,
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
        }
    }
}

/// ANN index settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexSettings {
    /// Distance metric: "cosine", "l2" or "ip". Applied consistently within
    /// one index; changing it requires a rebuild.
    #[serde(default = "default_metric")]
    pub metric: String,

    /// Maintenance loop interval.
    #[serde(default = "default_rebuild_interval")]
    pub rebuild_interval_secs: u64,

    /// Rebuild when the corpus has grown by this factor since the last
    /// rebuild.
    #[serde(default = "default_rebuild_growth_factor")]
    pub rebuild_growth_factor: f32,

    /// HNSW connections per layer (M).
    #[serde(default = "default_connectivity")]
    pub connectivity: usize,

    /// Build-time search depth (ef_construction).
    #[serde(default = "default_expansion_add")]
    pub expansion_add: usize,

    /// Query-time search depth (ef_search).
    #[serde(default = "default_expansion_search")]
    pub expansion_search: usize,
}

fn default_metric() -> String {
    "cosine".to_string()
}

fn default_rebuild_interval() -> u64 {
    300
}

fn default_rebuild_growth_factor() -> f32 {
    1.5
}

fn default_connectivity() -> usize {
    16
}

fn default_expansion_add() -> usize {
    200
}

fn default_expansion_search() -> usize {
    100
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self {
            metric: default_metric(),
            rebuild_interval_secs: default_rebuild_interval(),
            rebuild_growth_factor: default_rebuild_growth_factor(),
            connectivity: default_connectivity(),
            expansion_add: default_expansion_add(),
            expansion_search: default_expansion_search(),
        }
    }
}

/// Main application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Path to the RocksDB storage directory.
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// Directory of learned extraction templates. Defaults next to db_path.
    #[serde(default)]
    pub template_dir: Option<String>,

    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub extraction: ExtractionSettings,

    #[serde(default)]
    pub vendors: VendorSettings,

    #[serde(default)]
    pub embedding: EmbeddingSettings,

    #[serde(default)]
    pub index: IndexSettings,
}

fn default_db_path() -> String {
    ProjectDirs::from("", "", "invodex")
        .map(|p| p.data_local_dir().join("db"))
        .unwrap_or_else(|| PathBuf::from("./data"))
        .to_string_lossy()
        .to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            template_dir: None,
            log_level: default_log_level(),
            extraction: ExtractionSettings::default(),
            vendors: VendorSettings::default(),
            embedding: EmbeddingSettings::default(),
            index: IndexSettings::default(),
        }
    }
}

impl Settings {
    /// Load settings with layered precedence:
    /// 1. Built-in defaults
    /// 2. Config file (~/.config/invodex/config.toml)
    /// 3. CLI-specified config file (optional)
    /// 4. Environment variables (INVODEX_*)
    pub fn load(cli_config_path: Option<&str>) -> Result<Self, InvodexError> {
        let config_dir = ProjectDirs::from("", "", "invodex")
            .map(|p| p.config_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));

        let default_config_path = config_dir.join("config");

        let mut builder = Config::builder()
            .set_default("db_path", default_db_path())
            .map_err(|e| InvodexError::Config(e.to_string()))?
            .set_default("log_level", default_log_level())
            .map_err(|e| InvodexError::Config(e.to_string()))?
            .add_source(File::with_name(&default_config_path.to_string_lossy()).required(false));

        if let Some(path) = cli_config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // INVODEX_DB_PATH, INVODEX_EMBEDDING_PROVIDER, etc.
        builder = builder.add_source(
            Environment::with_prefix("INVODEX")
                .separator("_")
                .try_parsing(true),
        );

        let config = builder
            .build()
            .map_err(|e| InvodexError::Config(e.to_string()))?;

        let settings: Settings = config
            .try_deserialize()
            .map_err(|e| InvodexError::Config(e.to_string()))?;

        settings.validate()?;
        Ok(settings)
    }

    /// Validate cross-field constraints.
    pub fn validate(&self) -> Result<(), InvodexError> {
        if !(0.0..=1.0).contains(&self.extraction.template_confidence_threshold) {
            return Err(InvodexError::Config(format!(
                "template_confidence_threshold must be 0.0-1.0, got {}",
                self.extraction.template_confidence_threshold
            )));
        }
        if !(0.0..=1.0).contains(&self.vendors.similarity_threshold) {
            return Err(InvodexError::Config(format!(
                "similarity_threshold must be 0.0-1.0, got {}",
                self.vendors.similarity_threshold
            )));
        }
        if self.embedding.dimension == 0 {
            return Err(InvodexError::Config(
                "embedding dimension must be > 0".to_string(),
            ));
        }
        match self.index.metric.as_str() {
            "cosine" | "l2" | "ip" => {}
            other => {
                return Err(InvodexError::Config(format!(
                    "unknown index metric {:?} (expected cosine, l2 or ip)",
                    other
                )))
            }
        }
        if self.index.rebuild_growth_factor <= 1.0 {
            return Err(InvodexError::Config(
                "rebuild_growth_factor must be > 1.0".to_string(),
            ));
        }
        Ok(())
    }

    /// Template directory, defaulting to a sibling of the database.
    pub fn template_dir_path(&self) -> PathBuf {
        match &self.template_dir {
            Some(dir) => PathBuf::from(dir),
            None => PathBuf::from(&self.db_path)
                .parent()
                .map(|p| p.join("templates"))
                .unwrap_or_else(|| PathBuf::from("./templates")),
        }
    }
}
