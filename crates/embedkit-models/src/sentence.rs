//! Local sentence-embedding models run in-process.
//!
//! With the `hf-embeddings` feature, BERT-family models are loaded through
//! candle (see `bert.rs`). Any other [`SentenceEncoder`] can be plugged in via
//! [`SentenceTransformerEmbeddings::from_encoders`].

use std::sync::Arc;

use embedkit_core::{batched, EmbeddingModel, Embeddings, Error, Result};
use tracing::{info, instrument};

use crate::config::{validate_limits, SentenceTransformerEmbeddingsConfig};
use crate::workers::WorkerPool;

/// Number of CPU workers started when data-parallel mode names no devices.
pub const DEFAULT_CPU_WORKERS: usize = 4;

/// A loaded model that turns a batch of texts into vectors.
pub trait SentenceEncoder: Send + Sync {
    fn encode(&self, texts: &[String]) -> Result<Embeddings>;
    /// Output dimensionality, if the model can report it.
    fn dims(&self) -> Option<usize>;
    /// Longest input, in tokens, the model accepts.
    fn max_seq_length(&self) -> usize;
}

/// Encode one batch, rejecting results that do not line up with the input.
pub(crate) fn encode_checked(encoder: &dyn SentenceEncoder, batch: &[String]) -> Result<Embeddings> {
    let embeds = encoder.encode(batch)?;
    if embeds.len() != batch.len() {
        return Err(Error::Backend(format!("encoder returned {} embeddings for {} texts", embeds.len(), batch.len())));
    }
    Ok(embeds)
}

pub struct SentenceTransformerEmbeddings {
    config: SentenceTransformerEmbeddingsConfig,
    encoder: Arc<dyn SentenceEncoder>,
    pool: Option<WorkerPool>,
}

impl SentenceTransformerEmbeddings {
    /// Load `config.model_name` onto the configured device, plus one replica
    /// per device when `data_parallel` is set.
    #[cfg(feature = "hf-embeddings")]
    pub fn new(config: SentenceTransformerEmbeddingsConfig) -> Result<Self> {
        use crate::bert::{BertEncoder, ModelFiles};
        use crate::device::parse_device;

        validate_limits("sentence-transformer", config.batch_size, config.context_length)?;
        let files = ModelFiles::resolve(&config.model_name, config.cache_dir.as_deref())?;
        let encoder = Arc::new(BertEncoder::load(&files, parse_device(config.device.as_deref())?)?);

        let mut replicas: Vec<Arc<dyn SentenceEncoder>> = Vec::new();
        if config.data_parallel {
            for device in data_parallel_devices(&config) {
                replicas.push(Arc::new(BertEncoder::load(&files, parse_device(Some(device.as_str()))?)?));
            }
        }
        Self::from_encoders(config, encoder, replicas)
    }

    #[cfg(not(feature = "hf-embeddings"))]
    pub fn new(config: SentenceTransformerEmbeddingsConfig) -> Result<Self> {
        validate_limits("sentence-transformer", config.batch_size, config.context_length)?;
        Err(Error::missing_capability("Sentence-transformer embeddings", "hf-embeddings"))
    }

    /// Wrap already loaded encoders. `replicas` back the worker pool and are
    /// only used when `config.data_parallel` is set.
    pub fn from_encoders(
        mut config: SentenceTransformerEmbeddingsConfig,
        encoder: Arc<dyn SentenceEncoder>,
        replicas: Vec<Arc<dyn SentenceEncoder>>,
    ) -> Result<Self> {
        validate_limits("sentence-transformer", config.batch_size, config.context_length)?;
        config.context_length = encoder.max_seq_length();
        let pool = if config.data_parallel { Some(WorkerPool::start(replicas)?) } else { None };
        info!(
            model = %config.model_name,
            context_length = config.context_length,
            workers = pool.as_ref().map_or(0, WorkerPool::size),
            "sentence-transformer embeddings ready"
        );
        Ok(Self { config, encoder, pool })
    }

    pub fn config(&self) -> &SentenceTransformerEmbeddingsConfig {
        &self.config
    }

    pub fn is_data_parallel(&self) -> bool {
        self.pool.is_some()
    }

    /// Stop the data-parallel workers. Safe to call repeatedly; returns
    /// whether this call did the stopping.
    pub fn stop_pool(&self) -> bool {
        self.pool.as_ref().is_some_and(WorkerPool::stop)
    }
}

/// Devices for the worker pool; defaults to a few CPU workers.
pub fn data_parallel_devices(config: &SentenceTransformerEmbeddingsConfig) -> Vec<String> {
    match &config.devices {
        Some(devices) if !devices.is_empty() => devices.clone(),
        _ => vec!["cpu".to_string(); DEFAULT_CPU_WORKERS],
    }
}

impl EmbeddingModel for SentenceTransformerEmbeddings {
    fn model_name(&self) -> &str {
        &self.config.model_name
    }

    fn context_length(&self) -> usize {
        self.config.context_length
    }

    fn embedding_dims(&self) -> Result<usize> {
        self.encoder
            .dims()
            .ok_or_else(|| Error::Backend(format!("Could not get embedding dimension for model {}", self.config.model_name)))
    }

    #[instrument(skip(self, texts), fields(model = %self.config.model_name, count = texts.len()))]
    fn embed(&self, texts: &[String]) -> Result<Embeddings> {
        if let Some(pool) = &self.pool {
            return pool.encode(texts, self.config.batch_size);
        }
        let mut embeds = Vec::with_capacity(texts.len());
        for batch in batched(texts.iter().cloned(), self.config.batch_size)? {
            embeds.extend(encode_checked(self.encoder.as_ref(), &batch)?);
        }
        Ok(embeds)
    }
}
