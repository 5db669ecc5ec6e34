//! BERT-family sentence encoder on candle.
//!
//! Models come either from a local directory (`config.json`, `tokenizer.json`,
//! and `model.safetensors` or `pytorch_model.bin`) or from the Hugging Face hub.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

use candle_core::{Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config as BertConfig, DTYPE};
use embedkit_core::config::expand_path;
use embedkit_core::{Embeddings, Error, Result};
use hf_hub::api::sync::{Api, ApiBuilder};
use hf_hub::{Repo, RepoType};
use serde::Deserialize;
use tokenizers::{PaddingStrategy, Tokenizer, TruncationParams};
use tracing::{debug, info};

use crate::pooling::Pooling;
use crate::sentence::SentenceEncoder;
use crate::tokenize::encodings_to_tensors;

const POOLING_CONFIG: &str = "1_Pooling/config.json";

/// Paths of the files making up a model.
#[derive(Debug, Clone)]
pub struct ModelFiles {
    pub config: PathBuf,
    pub tokenizer: PathBuf,
    pub weights: PathBuf,
    pub tokenizer_config: Option<PathBuf>,
    /// sentence-transformers pooling settings, `1_Pooling/config.json`.
    pub pooling_config: Option<PathBuf>,
}

impl ModelFiles {
    /// Use `model_name` as a local directory if it is one, otherwise fetch it
    /// from the hub into `cache_dir` (or the default hub cache).
    pub fn resolve(model_name: &str, cache_dir: Option<&Path>) -> Result<Self> {
        let local = expand_path(model_name);
        if local.is_dir() {
            info!(dir = %local.display(), "Using local model directory");
            return Self::from_dir(&local);
        }

        let api = match cache_dir {
            Some(dir) => ApiBuilder::new().with_cache_dir(expand_path(dir.to_string_lossy())).build(),
            None => Api::new(),
        }
        .map_err(|e| Error::Backend(format!("Failed to initialize model hub client: {e}")))?;
        let repo = api.repo(Repo::new(model_name.to_string(), RepoType::Model));
        let fetch = |file: &str| {
            repo.get(file).map_err(|e| Error::Backend(format!("Failed to fetch {file} for {model_name}: {e}")))
        };
        info!(model = model_name, "Fetching model files");
        Ok(Self {
            config: fetch("config.json")?,
            tokenizer: fetch("tokenizer.json")?,
            weights: fetch("model.safetensors")?,
            tokenizer_config: repo.get("tokenizer_config.json").ok(),
            pooling_config: repo.get(POOLING_CONFIG).ok(),
        })
    }

    pub fn from_dir(dir: &Path) -> Result<Self> {
        let safetensors = dir.join("model.safetensors");
        let weights = if safetensors.exists() { safetensors } else { dir.join("pytorch_model.bin") };
        let files = Self {
            config: dir.join("config.json"),
            tokenizer: dir.join("tokenizer.json"),
            weights,
            tokenizer_config: Some(dir.join("tokenizer_config.json")).filter(|p| p.exists()),
            pooling_config: Some(dir.join(POOLING_CONFIG)).filter(|p| p.exists()),
        };
        for path in [&files.config, &files.tokenizer, &files.weights] {
            if !path.exists() {
                return Err(Error::InvalidConfig(format!("model file missing: {}", path.display())));
            }
        }
        Ok(files)
    }
}

/// The few `config.json` fields needed besides what candle reads.
#[derive(Debug, Deserialize)]
struct ModelShape {
    hidden_size: usize,
    max_position_embeddings: usize,
}

#[derive(Debug, Deserialize)]
struct TokenizerLimits {
    model_max_length: Option<f64>,
}

/// Context length from `tokenizer_config.json`, never above the position table.
pub fn context_length(tokenizer_config: Option<&str>, max_position_embeddings: usize) -> usize {
    tokenizer_config
        .and_then(|raw| serde_json::from_str::<TokenizerLimits>(raw).ok())
        .and_then(|limits| limits.model_max_length)
        .filter(|len| *len >= 1.0)
        .map_or(max_position_embeddings, |len| (len.min(max_position_embeddings as f64)) as usize)
}

pub struct BertEncoder {
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
    dims: usize,
    max_len: usize,
    pooling: Pooling,
}

impl BertEncoder {
    pub fn load(files: &ModelFiles, device: Device) -> Result<Self> {
        let start = Instant::now();
        let raw_config = std::fs::read_to_string(&files.config)
            .map_err(|e| Error::InvalidConfig(format!("Failed to read {}: {e}", files.config.display())))?;
        let config: BertConfig = serde_json::from_str(&raw_config)
            .map_err(|e| Error::InvalidConfig(format!("Unsupported model config {}: {e}", files.config.display())))?;
        let shape: ModelShape = serde_json::from_str(&raw_config)
            .map_err(|e| Error::InvalidConfig(format!("Unsupported model config {}: {e}", files.config.display())))?;

        let raw_tokenizer_config = files.tokenizer_config.as_ref().and_then(|p| std::fs::read_to_string(p).ok());
        let max_len = context_length(raw_tokenizer_config.as_deref(), shape.max_position_embeddings);
        let raw_pooling_config = files.pooling_config.as_ref().and_then(|p| std::fs::read_to_string(p).ok());
        let pooling = Pooling::from_config(raw_pooling_config.as_deref());

        let mut tokenizer = Tokenizer::from_file(&files.tokenizer)
            .map_err(|e| Error::Tokenizer(format!("Failed to load tokenizer from {}: {e}", files.tokenizer.display())))?;
        let mut padding = tokenizer.get_padding().cloned().unwrap_or_default();
        padding.strategy = PaddingStrategy::BatchLongest;
        tokenizer.with_padding(Some(padding));
        tokenizer
            .with_truncation(Some(TruncationParams { max_length: max_len, ..Default::default() }))
            .map_err(|e| Error::Tokenizer(e.to_string()))?;

        let vb = load_weights(&files.weights, &device)?;
        let model = BertModel::load(vb, &config).map_err(|e| Error::Backend(format!("Failed to build model: {e}")))?;

        info!(dims = shape.hidden_size, max_len, ?pooling, elapsed_ms = start.elapsed().as_millis() as u64, "BERT encoder loaded");
        Ok(Self { model, tokenizer, device, dims: shape.hidden_size, max_len, pooling })
    }

    fn forward(&self, input_ids: &Tensor, attention_mask: &Tensor) -> candle_core::Result<Embeddings> {
        let token_type_ids = input_ids.zeros_like()?;
        let hidden = self.model.forward(input_ids, &token_type_ids, Some(attention_mask))?;
        let pooled = self.pooling.apply(&hidden, attention_mask)?;
        pooled.to_device(&Device::Cpu)?.to_vec2::<f32>()
    }
}

fn load_weights(path: &Path, device: &Device) -> Result<VarBuilder<'static>> {
    let is_safetensors = path.extension().is_some_and(|ext| ext == "safetensors");
    let vb = if is_safetensors {
        // SAFETY: the weights file is not modified while mapped.
        unsafe { VarBuilder::from_mmaped_safetensors(&[path], DTYPE, device) }
    } else {
        candle_core::pickle::read_all(path).map(|weights| {
            let weights: HashMap<String, Tensor> = weights.into_iter().collect();
            VarBuilder::from_tensors(weights, DTYPE, device)
        })
    };
    vb.map_err(|e| Error::Backend(format!("Failed to load weights from {}: {e}", path.display())))
}

impl SentenceEncoder for BertEncoder {
    fn encode(&self, texts: &[String]) -> Result<Embeddings> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let inputs: Vec<&str> = texts.iter().map(String::as_str).collect();
        let encodings = self.tokenizer.encode_batch(inputs, true).map_err(|e| Error::Tokenizer(e.to_string()))?;
        let (input_ids, attention_mask) =
            encodings_to_tensors(&encodings, &self.device).map_err(|e| Error::Backend(e.to_string()))?;
        debug!(batch = texts.len(), seq_len = input_ids.dims().get(1).copied().unwrap_or(0), "encoding batch");
        self.forward(&input_ids, &attention_mask).map_err(|e| Error::Backend(e.to_string()))
    }

    fn dims(&self) -> Option<usize> {
        Some(self.dims).filter(|d| *d > 0)
    }

    fn max_seq_length(&self) -> usize {
        self.max_len
    }
}
