//! Embedding providers behind the [`EmbeddingModel`] contract.
//!
//! - [`OpenAiEmbeddings`]: OpenAI-compatible `/embeddings` API, local tiktoken truncation.
//! - [`SentenceTransformerEmbeddings`]: in-process candle model, optional data-parallel workers.
//! - [`FastEmbedEmbeddings`]: fastembed ONNX engine.
//! - [`LlamaCppServerEmbeddings`]: self-hosted llama.cpp server.
//!
//! Pick one by name with [`dispatch`], or straight from a config with [`embedding_model`].

pub mod config;
pub mod dispatch;
pub mod fastembed;
pub mod llamacpp;
pub mod openai;
pub mod sentence;
pub mod workers;

#[cfg(feature = "hf-embeddings")]
pub mod bert;
#[cfg(feature = "hf-embeddings")]
pub mod device;
#[cfg(feature = "hf-embeddings")]
mod pooling;
#[cfg(feature = "hf-embeddings")]
mod tokenize;

pub use config::{
    EmbeddingModelConfig, FastEmbedEmbeddingsConfig, LlamaCppServerEmbeddingsConfig, OpenAiEmbeddingsConfig,
    SentenceTransformerEmbeddingsConfig,
};
pub use dispatch::{dispatch, embedding_model, ModelKind};
pub use embedkit_core::{EmbeddingFn, EmbeddingModel, Embeddings, Error, Result};
pub use self::fastembed::FastEmbedEmbeddings;
pub use llamacpp::LlamaCppServerEmbeddings;
pub use openai::OpenAiEmbeddings;
pub use sentence::{SentenceEncoder, SentenceTransformerEmbeddings};
pub use workers::WorkerPool;
