//! Embeddings from the fastembed ONNX engine (feature `fastembed`).
//!
//! Batching and parallelism are left to the engine; the provider hands it the
//! whole input list per call. Dimensionality is measured once by embedding a
//! probe string.

use embedkit_core::{EmbeddingModel, Embeddings, Error, Result};
use once_cell::sync::OnceCell;
use serde::Deserialize;
use tracing::{info, instrument};

use crate::config::{validate_limits, FastEmbedEmbeddingsConfig};

const DIMS_PROBE: &str = "text";

/// Passthrough options understood by the engine.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineOptions {
    pub max_length: Option<usize>,
    pub show_download_progress: Option<bool>,
}

impl EngineOptions {
    pub fn from_config(config: &FastEmbedEmbeddingsConfig) -> Result<Self> {
        let map = config.additional_options.clone().into_iter().collect();
        serde_json::from_value(serde_json::Value::Object(map))
            .map_err(|e| Error::InvalidConfig(format!("fastembed additional_options: {e}")))
    }
}

/// An embedding engine that batches and parallelizes internally.
pub trait TextEngine: Send + Sync {
    fn embed(&self, texts: &[String], batch_size: usize) -> Result<Embeddings>;
}

pub struct FastEmbedEmbeddings {
    config: FastEmbedEmbeddingsConfig,
    engine: Box<dyn TextEngine>,
    dims: OnceCell<usize>,
}

impl FastEmbedEmbeddings {
    #[cfg(feature = "fastembed")]
    pub fn new(config: FastEmbedEmbeddingsConfig) -> Result<Self> {
        validate_limits("fastembed", config.batch_size, config.context_length)?;
        let engine = engine::FastEmbedEngine::new(&config)?;
        Ok(Self::from_engine(config, Box::new(engine)))
    }

    #[cfg(not(feature = "fastembed"))]
    pub fn new(config: FastEmbedEmbeddingsConfig) -> Result<Self> {
        validate_limits("fastembed", config.batch_size, config.context_length)?;
        EngineOptions::from_config(&config)?;
        Err(Error::missing_capability("fastembed embeddings", "fastembed"))
    }

    pub fn from_engine(config: FastEmbedEmbeddingsConfig, engine: Box<dyn TextEngine>) -> Self {
        info!(model = %config.model_name, batch_size = config.batch_size, "fastembed embeddings ready");
        Self { config, engine, dims: OnceCell::new() }
    }

    pub fn config(&self) -> &FastEmbedEmbeddingsConfig {
        &self.config
    }
}

impl EmbeddingModel for FastEmbedEmbeddings {
    fn model_name(&self) -> &str {
        &self.config.model_name
    }

    fn context_length(&self) -> usize {
        self.config.context_length
    }

    fn embedding_dims(&self) -> Result<usize> {
        self.dims
            .get_or_try_init(|| {
                let probe = self.embed(&[DIMS_PROBE.to_string()])?;
                probe
                    .first()
                    .map(Vec::len)
                    .ok_or_else(|| Error::Backend("engine returned no embedding for the probe text".to_string()))
            })
            .copied()
    }

    #[instrument(skip(self, texts), fields(model = %self.config.model_name, count = texts.len()))]
    fn embed(&self, texts: &[String]) -> Result<Embeddings> {
        self.engine.embed(texts, self.config.batch_size)
    }
}

#[cfg(feature = "fastembed")]
mod engine {
    use embedkit_core::config::expand_path;
    use embedkit_core::{Embeddings, Error, Result};
    use ::fastembed::{InitOptions, TextEmbedding};
    use tracing::info;

    use super::{EngineOptions, TextEngine};
    use crate::config::FastEmbedEmbeddingsConfig;

    pub struct FastEmbedEngine {
        model: TextEmbedding,
        pool: Option<rayon::ThreadPool>,
    }

    impl FastEmbedEngine {
        pub fn new(config: &FastEmbedEmbeddingsConfig) -> Result<Self> {
            let options = EngineOptions::from_config(config)?;
            let model = TextEmbedding::list_supported_models()
                .into_iter()
                .find(|info| info.model_code.eq_ignore_ascii_case(&config.model_name))
                .map(|info| info.model)
                .ok_or_else(|| Error::InvalidConfig(format!("fastembed does not support model '{}'", config.model_name)))?;

            let mut init = InitOptions::new(model);
            if let Some(dir) = &config.cache_dir {
                init = init.with_cache_dir(expand_path(dir.to_string_lossy()));
            }
            if let Some(max_length) = options.max_length {
                init = init.with_max_length(max_length);
            }
            init = init.with_show_download_progress(options.show_download_progress.unwrap_or(false));

            let model = TextEmbedding::try_new(init)
                .map_err(|e| Error::Backend(format!("Failed to initialize fastembed model '{}': {e}", config.model_name)))?;

            let workers = config.parallel.or(config.threads).filter(|n| *n > 0);
            let pool = workers
                .map(|n| rayon::ThreadPoolBuilder::new().num_threads(n).thread_name(|i| format!("fastembed-{i}")).build())
                .transpose()
                .map_err(|e| Error::Backend(format!("Failed to build fastembed thread pool: {e}")))?;
            info!(model = %config.model_name, workers = ?workers, cache_dir = ?config.cache_dir, "fastembed engine loaded");
            Ok(Self { model, pool })
        }
    }

    impl TextEngine for FastEmbedEngine {
        fn embed(&self, texts: &[String], batch_size: usize) -> Result<Embeddings> {
            let run = || {
                self.model
                    .embed(texts.to_vec(), Some(batch_size))
                    .map_err(|e| Error::Backend(e.to_string()))
            };
            match &self.pool {
                Some(pool) => pool.install(run),
                None => run(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingEngine {
        calls: Arc<AtomicUsize>,
        dim: usize,
    }

    impl TextEngine for CountingEngine {
        fn embed(&self, texts: &[String], _batch_size: usize) -> Result<Embeddings> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(texts.iter().map(|_| vec![0.5; self.dim]).collect())
        }
    }

    #[test]
    fn dims_are_probed_once_and_cached() {
        let calls = Arc::new(AtomicUsize::new(0));
        let provider = FastEmbedEmbeddings::from_engine(
            FastEmbedEmbeddingsConfig::default(),
            Box::new(CountingEngine { calls: calls.clone(), dim: 384 }),
        );
        assert_eq!(provider.embedding_dims().unwrap(), 384);
        assert_eq!(provider.embedding_dims().unwrap(), 384);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn passthrough_options_are_checked() {
        let mut config = FastEmbedEmbeddingsConfig::default();
        config.additional_options.insert("max_length".into(), serde_json::json!(128));
        assert_eq!(EngineOptions::from_config(&config).unwrap().max_length, Some(128));

        config.additional_options.insert("providers".into(), serde_json::json!(["cuda"]));
        assert!(matches!(EngineOptions::from_config(&config), Err(Error::InvalidConfig(_))));
    }
}
