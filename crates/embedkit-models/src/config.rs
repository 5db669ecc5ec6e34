//! Per-provider configuration records.
//!
//! Records are plain data, deserializable from the `embedding` section of the
//! layered [`Config`]. The `model_type` field selects the variant.

use std::collections::HashMap;
use std::path::PathBuf;

use embedkit_core::config::Config;
use embedkit_core::retry::RetryPolicy;
use embedkit_core::{Error, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "model_type")]
pub enum EmbeddingModelConfig {
    #[serde(rename = "openai")]
    OpenAi(OpenAiEmbeddingsConfig),
    #[serde(rename = "sentence-transformer", alias = "sentencetransformer")]
    SentenceTransformer(SentenceTransformerEmbeddingsConfig),
    #[serde(rename = "fastembed")]
    FastEmbed(FastEmbedEmbeddingsConfig),
    #[serde(rename = "llamacppserver")]
    LlamaCppServer(LlamaCppServerEmbeddingsConfig),
}

impl EmbeddingModelConfig {
    /// Read the `embedding` section of a loaded configuration.
    pub fn from_config(config: &Config) -> Result<Self> {
        let parsed: Self = config.get("embedding")?;
        parsed.validate()?;
        Ok(parsed)
    }

    pub fn model_type(&self) -> &'static str {
        match self {
            Self::OpenAi(_) => "openai",
            Self::SentenceTransformer(_) => "sentence-transformer",
            Self::FastEmbed(_) => "fastembed",
            Self::LlamaCppServer(_) => "llamacppserver",
        }
    }

    pub fn model_name(&self) -> &str {
        match self {
            Self::OpenAi(c) => &c.model_name,
            Self::SentenceTransformer(c) => &c.model_name,
            Self::FastEmbed(c) => &c.model_name,
            Self::LlamaCppServer(c) => &c.model_name,
        }
    }

    pub fn batch_size(&self) -> usize {
        match self {
            Self::OpenAi(c) => c.batch_size,
            Self::SentenceTransformer(c) => c.batch_size,
            Self::FastEmbed(c) => c.batch_size,
            Self::LlamaCppServer(c) => c.batch_size,
        }
    }

    pub fn context_length(&self) -> usize {
        match self {
            Self::OpenAi(c) => c.context_length,
            Self::SentenceTransformer(c) => c.context_length,
            Self::FastEmbed(c) => c.context_length,
            Self::LlamaCppServer(c) => c.context_length,
        }
    }

    /// Reject limits that would make truncation or batching meaningless.
    pub fn validate(&self) -> Result<()> {
        validate_limits(self.model_type(), self.batch_size(), self.context_length())?;
        match self {
            Self::OpenAi(c) => validate_dims(self.model_type(), c.dims),
            Self::LlamaCppServer(c) => validate_dims(self.model_type(), c.dims),
            Self::SentenceTransformer(_) | Self::FastEmbed(_) => Ok(()),
        }
    }
}

/// Remote providers report the configured dimensionality without asking the server.
pub(crate) fn validate_dims(kind: &str, dims: usize) -> Result<()> {
    if dims == 0 {
        return Err(Error::InvalidConfig(format!("{kind}: dims must be set to the model's embedding size")));
    }
    Ok(())
}

pub(crate) fn validate_limits(kind: &str, batch_size: usize, context_length: usize) -> Result<()> {
    if batch_size == 0 {
        return Err(Error::InvalidConfig(format!("{kind}: batch_size must be positive")));
    }
    if context_length == 0 {
        return Err(Error::InvalidConfig(format!("{kind}: context_length must be positive")));
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OpenAiEmbeddingsConfig {
    pub model_name: String,
    /// Falls back to `OPENAI_API_KEY` when empty.
    pub api_key: String,
    /// Defaults to the public OpenAI endpoint.
    pub api_base: Option<String>,
    /// Falls back to `OPENAI_ORGANIZATION` when empty.
    pub organization: String,
    pub dims: usize,
    pub context_length: usize,
    pub batch_size: usize,
    pub retry: RetryPolicy,
}

impl Default for OpenAiEmbeddingsConfig {
    fn default() -> Self {
        Self {
            model_name: "text-embedding-ada-002".to_string(),
            api_key: String::new(),
            api_base: None,
            organization: String::new(),
            dims: 1536,
            context_length: 8192,
            batch_size: 512,
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SentenceTransformerEmbeddingsConfig {
    /// Hugging Face repo id, or a local directory holding `config.json`,
    /// `tokenizer.json` and `model.safetensors`.
    pub model_name: String,
    /// Replaced by the tokenizer's limit once the model is loaded.
    pub context_length: usize,
    pub batch_size: usize,
    pub data_parallel: bool,
    /// Device for single-process mode (`cpu`, `cuda:0`, `metal`).
    pub device: Option<String>,
    /// Devices for data-parallel mode, one worker per entry.
    pub devices: Option<Vec<String>>,
    pub cache_dir: Option<PathBuf>,
}

impl Default for SentenceTransformerEmbeddingsConfig {
    fn default() -> Self {
        Self {
            model_name: "BAAI/bge-large-en-v1.5".to_string(),
            context_length: 512,
            batch_size: 512,
            data_parallel: false,
            device: None,
            devices: None,
            cache_dir: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FastEmbedEmbeddingsConfig {
    pub model_name: String,
    pub context_length: usize,
    pub batch_size: usize,
    pub cache_dir: Option<PathBuf>,
    pub threads: Option<usize>,
    pub parallel: Option<usize>,
    /// Passed through to the engine's init options.
    pub additional_options: HashMap<String, serde_json::Value>,
}

impl Default for FastEmbedEmbeddingsConfig {
    fn default() -> Self {
        Self {
            model_name: "BAAI/bge-small-en-v1.5".to_string(),
            context_length: 512,
            batch_size: 256,
            cache_dir: None,
            threads: None,
            parallel: None,
            additional_options: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LlamaCppServerEmbeddingsConfig {
    pub model_name: String,
    /// Required; e.g. `http://localhost:8080`.
    pub api_base: String,
    pub dims: usize,
    pub context_length: usize,
    pub batch_size: usize,
}

impl Default for LlamaCppServerEmbeddingsConfig {
    fn default() -> Self {
        Self {
            model_name: "llamacpp-server".to_string(),
            api_base: String::new(),
            dims: 0,
            context_length: 8192,
            batch_size: 512,
        }
    }
}
