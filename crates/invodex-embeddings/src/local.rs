//! Local BGE embedding provider via Candle.
//!
//! Loads BAAI/bge-large-en-v1.5 (BERT, CLS pooling, 1024 dimensions) from a
//! local file cache, downloading from HuggingFace Hub on first use. The
//! loaded model is process-wide state: initialized lazily exactly once,
//! shared read-only behind an `Arc`, and released explicitly on shutdown.

use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config as BertConfig};
use tokenizers::Tokenizer;
use tracing::{debug, info};

use async_trait::async_trait;

use crate::embedding::Embedding;
use crate::error::EmbeddingError;
use crate::provider::{EmbeddingProvider, EncodeMode};

/// Default model repository on HuggingFace
pub const DEFAULT_MODEL_REPO: &str = "BAAI/bge-large-en-v1.5";

/// Required model files
pub const MODEL_FILES: &[&str] = &["config.json", "tokenizer.json", "model.safetensors"];

/// BGE instruction prefix applied to query-mode text. Document-mode text is
/// encoded verbatim, which is why the two modes produce different vectors
/// for the same input.
pub const BGE_QUERY_PREFIX: &str = "Represent this sentence for searching relevant passages: ";

/// Maximum sequence length
pub const MAX_SEQ_LENGTH: usize = 512;

/// Model cache configuration
#[derive(Debug, Clone)]
pub struct ModelCache {
    /// Cache directory path
    pub cache_dir: PathBuf,
    /// Model repository ID
    pub repo_id: String,
}

impl Default for ModelCache {
    fn default() -> Self {
        let cache_dir = dirs::cache_dir()
            .unwrap_or_else(|| PathBuf::from(".cache"))
            .join("invodex")
            .join("models");

        Self {
            cache_dir,
            repo_id: DEFAULT_MODEL_REPO.to_string(),
        }
    }
}

impl ModelCache {
    /// Create a new model cache with custom settings
    pub fn new(cache_dir: impl Into<PathBuf>, repo_id: impl Into<String>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            repo_id: repo_id.into(),
        }
    }

    /// Get the model directory path
    pub fn model_dir(&self) -> PathBuf {
        self.cache_dir.join(self.repo_id.replace('/', "_"))
    }

    /// Check if all model files are cached
    pub fn is_cached(&self) -> bool {
        let model_dir = self.model_dir();
        MODEL_FILES.iter().all(|f| model_dir.join(f).exists())
    }

    /// Get path to a specific model file
    pub fn file_path(&self, filename: &str) -> PathBuf {
        self.model_dir().join(filename)
    }
}

/// Paths to model files
#[derive(Debug, Clone)]
pub struct ModelPaths {
    pub config: PathBuf,
    pub tokenizer: PathBuf,
    pub weights: PathBuf,
}

/// Get or download model files.
pub fn get_or_download_model(cache: &ModelCache) -> Result<ModelPaths, EmbeddingError> {
    let model_dir = cache.model_dir();

    if cache.is_cached() {
        debug!(path = ?model_dir, "Using cached model");
    } else {
        info!(repo = %cache.repo_id, "Downloading model files...");
        download_model_files(cache)?;
    }

    Ok(ModelPaths {
        config: model_dir.join("config.json"),
        tokenizer: model_dir.join("tokenizer.json"),
        weights: model_dir.join("model.safetensors"),
    })
}

/// Download model files from HuggingFace Hub
fn download_model_files(cache: &ModelCache) -> Result<(), EmbeddingError> {
    use hf_hub::api::sync::Api;

    let api = Api::new().map_err(|e| EmbeddingError::Download(e.to_string()))?;
    let repo = api.model(cache.repo_id.clone());

    std::fs::create_dir_all(cache.model_dir())?;

    for filename in MODEL_FILES {
        info!(file = filename, "Downloading...");
        let source_path = repo
            .get(filename)
            .map_err(|e| EmbeddingError::Download(format!("{}: {}", filename, e)))?;

        let dest_path = cache.file_path(filename);
        std::fs::copy(&source_path, &dest_path)?;
        debug!(file = filename, "Downloaded to {:?}", dest_path);
    }

    Ok(())
}

/// Loaded BGE model. Expensive to construct; see [`BgeModel::acquire`].
pub struct BgeModel {
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
    dimension: usize,
}

/// Process-wide model slot. Not a hidden global: callers go through
/// `BgeModel::acquire` / [`release_process_model`], and the slot only ever
/// holds a model that every handle shares read-only.
static PROCESS_MODEL: RwLock<Option<Arc<BgeModel>>> = RwLock::new(None);

impl BgeModel {
    /// Get the shared process-wide model, loading it on first use.
    ///
    /// Initialization is guarded: concurrent first callers block on the
    /// write lock and the second one finds the model already loaded.
    pub fn acquire(cache: &ModelCache) -> Result<Arc<Self>, EmbeddingError> {
        if let Some(model) = PROCESS_MODEL
            .read()
            .map_err(|e| EmbeddingError::Internal(e.to_string()))?
            .as_ref()
        {
            return Ok(model.clone());
        }

        let mut slot = PROCESS_MODEL
            .write()
            .map_err(|e| EmbeddingError::Internal(e.to_string()))?;
        if let Some(model) = slot.as_ref() {
            return Ok(model.clone());
        }

        let model = Arc::new(Self::load(cache)?);
        *slot = Some(model.clone());
        Ok(model)
    }

    /// Load the model from cache (downloading if needed), bypassing the
    /// process-wide slot. Used by `acquire` and by tests.
    pub fn load(cache: &ModelCache) -> Result<Self, EmbeddingError> {
        let paths = get_or_download_model(cache)?;
        Self::load_from_paths(&paths.config, &paths.tokenizer, &paths.weights)
    }

    /// Load from explicit file paths
    pub fn load_from_paths(
        config_path: &std::path::Path,
        tokenizer_path: &std::path::Path,
        weights_path: &std::path::Path,
    ) -> Result<Self, EmbeddingError> {
        info!("Loading embedding model...");

        let device = Device::Cpu;

        let config_str = std::fs::read_to_string(config_path)?;
        let config: BertConfig = serde_json::from_str(&config_str)
            .map_err(|e| EmbeddingError::ModelNotFound(format!("invalid config: {}", e)))?;

        let tokenizer = Tokenizer::from_file(tokenizer_path)
            .map_err(|e| EmbeddingError::Tokenizer(e.to_string()))?;

        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&[weights_path.to_path_buf()], DType::F32, &device)?
        };

        let dimension = config.hidden_size;
        let model = BertModel::load(vb, &config)?;

        info!(dim = dimension, max_seq = MAX_SEQ_LENGTH, "Model loaded successfully");

        Ok(Self {
            model,
            tokenizer,
            device,
            dimension,
        })
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Encode a single text. CLS pooling per the BGE model card, then unit
    /// normalization.
    pub fn embed(&self, text: &str) -> Result<Embedding, EmbeddingError> {
        let embeddings = self.embed_batch(&[text])?;
        embeddings
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::Internal("empty batch result".to_string()))
    }

    /// Encode a batch of texts.
    pub fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        debug!(count = texts.len(), "Embedding batch");

        let encodings = self
            .tokenizer
            .encode_batch(texts.to_vec(), true)
            .map_err(|e| EmbeddingError::Tokenizer(e.to_string()))?;

        // Pad to same length
        let max_len = encodings
            .iter()
            .map(|e| e.get_ids().len())
            .max()
            .unwrap_or(0)
            .min(MAX_SEQ_LENGTH);

        let mut input_ids: Vec<Vec<u32>> = Vec::new();
        let mut attention_masks: Vec<Vec<u32>> = Vec::new();

        for encoding in &encodings {
            let ids = encoding.get_ids();
            let mask = encoding.get_attention_mask();

            let truncated_len = ids.len().min(max_len);
            let mut padded_ids = ids[..truncated_len].to_vec();
            let mut padded_mask = mask[..truncated_len].to_vec();

            padded_ids.resize(max_len, 0);
            padded_mask.resize(max_len, 0);

            input_ids.push(padded_ids);
            attention_masks.push(padded_mask);
        }

        let batch_size = texts.len();
        let input_ids_flat: Vec<u32> = input_ids.into_iter().flatten().collect();
        let mask_flat: Vec<u32> = attention_masks.into_iter().flatten().collect();

        let input_ids = Tensor::from_vec(input_ids_flat, (batch_size, max_len), &self.device)?;
        let attention_mask = Tensor::from_vec(mask_flat, (batch_size, max_len), &self.device)?;
        let token_type_ids = Tensor::zeros_like(&input_ids)?;

        let output = self
            .model
            .forward(&input_ids, &token_type_ids, Some(&attention_mask))?;

        // CLS pooling: first token's hidden state
        let cls = output.narrow(1, 0, 1)?.squeeze(1)?;
        let cls_vec: Vec<Vec<f32>> = cls.to_vec2()?;

        let embeddings: Vec<Embedding> = cls_vec.into_iter().map(Embedding::new).collect();

        debug!(count = embeddings.len(), dim = self.dimension, "Batch complete");
        Ok(embeddings)
    }
}

/// Drop the process-wide model, releasing its memory. Handles already held
/// by providers keep working; the next `acquire` reloads.
pub fn release_process_model() {
    if let Ok(mut slot) = PROCESS_MODEL.write() {
        if slot.take().is_some() {
            info!("Released process-wide embedding model");
        }
    }
}

/// Embedding provider backed by the shared local BGE model.
pub struct LocalProvider {
    model: Arc<BgeModel>,
    id: String,
}

impl LocalProvider {
    /// Create a provider over the process-wide model, loading it if this is
    /// the first use.
    pub fn new(cache: &ModelCache) -> Result<Self, EmbeddingError> {
        let model = BgeModel::acquire(cache)?;
        Ok(Self {
            model,
            id: "bge-local".to_string(),
        })
    }

    /// Wrap an already loaded model (tests).
    pub fn from_model(model: Arc<BgeModel>) -> Self {
        Self {
            model,
            id: "bge-local".to_string(),
        }
    }

    fn apply_mode(text: &str, mode: EncodeMode) -> String {
        match mode {
            EncodeMode::Document => text.to_string(),
            EncodeMode::Query => format!("{}{}", BGE_QUERY_PREFIX, text),
        }
    }
}

#[async_trait]
impl EmbeddingProvider for LocalProvider {
    fn id(&self) -> &str {
        &self.id
    }

    fn dimension(&self) -> usize {
        self.model.dimension()
    }

    async fn encode(&self, text: &str, mode: EncodeMode) -> Result<Embedding, EmbeddingError> {
        let model = self.model.clone();
        let input = Self::apply_mode(text, mode);

        // Inference is CPU-bound; keep it off the async executor.
        tokio::task::spawn_blocking(move || model.embed(&input))
            .await
            .map_err(|e| EmbeddingError::Internal(e.to_string()))?
    }

    async fn health_check(&self) -> Result<(), EmbeddingError> {
        // The model is resident once the provider exists.
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_cache_default() {
        let cache = ModelCache::default();
        assert!(cache.cache_dir.to_string_lossy().contains("invodex"));
        assert_eq!(cache.repo_id, DEFAULT_MODEL_REPO);
    }

    #[test]
    fn test_is_cached_empty() {
        let temp = TempDir::new().unwrap();
        let cache = ModelCache::new(temp.path(), "test/model");
        assert!(!cache.is_cached());
    }

    #[test]
    fn test_query_prefix_applied() {
        let doc = LocalProvider::apply_mode("invoice text", EncodeMode::Document);
        let query = LocalProvider::apply_mode("invoice text", EncodeMode::Query);

        assert_eq!(doc, "invoice text");
        assert!(query.starts_with(BGE_QUERY_PREFIX));
        assert!(query.ends_with("invoice text"));
        assert_ne!(doc, query);
    }

    // Integration tests below require a model download; run with --ignored.

    #[test]
    #[ignore = "requires model download"]
    fn test_load_model() {
        let model = BgeModel::load(&ModelCache::default()).unwrap();
        assert_eq!(model.dimension(), 1024);
    }

    #[test]
    #[ignore = "requires model download"]
    fn test_document_mode_is_deterministic() {
        let model = BgeModel::load(&ModelCache::default()).unwrap();
        let a = model.embed("Invoice from AWS for cloud hosting").unwrap();
        let b = model.embed("Invoice from AWS for cloud hosting").unwrap();
        assert_eq!(a.values, b.values);
    }

    #[test]
    #[ignore = "requires model download"]
    fn test_query_and_document_vectors_differ() {
        let model = BgeModel::load(&ModelCache::default()).unwrap();
        let text = "cloud computing costs";
        let doc = model.embed(text).unwrap();
        let query = model
            .embed(&format!("{}{}", BGE_QUERY_PREFIX, text))
            .unwrap();
        assert_ne!(doc.values, query.values);
    }
}
