//! Embeddings from the OpenAI `/embeddings` API (or any compatible endpoint).
//!
//! Inputs are tokenized locally with the model's tiktoken encoding and cut to
//! `context_length` tokens, then sent as token-id arrays in batches of
//! `batch_size`. Each batch request is retried with exponential backoff.

use std::time::Instant;

use embedkit_core::retry::retry;
use embedkit_core::{batched, EmbeddingModel, Embeddings, Error, Result, TokenIds};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use tiktoken_rs::CoreBPE;
use tracing::{debug, info, instrument, warn};

use crate::config::{validate_dims, validate_limits, OpenAiEmbeddingsConfig};

pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";
pub const ORGANIZATION_ENV: &str = "OPENAI_ORGANIZATION";

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [TokenIds],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

pub struct OpenAiEmbeddings {
    config: OpenAiEmbeddingsConfig,
    client: Client,
    endpoint: String,
    tokenizer: CoreBPE,
}

impl OpenAiEmbeddings {
    /// Build the provider. Fails with [`Error::InvalidConfig`] when no API key is
    /// configured or present in `OPENAI_API_KEY`; no request is made here.
    pub fn new(mut config: OpenAiEmbeddingsConfig) -> Result<Self> {
        validate_limits("openai", config.batch_size, config.context_length)?;
        validate_dims("openai", config.dims)?;
        if config.api_key.is_empty() {
            config.api_key = std::env::var(API_KEY_ENV).unwrap_or_default();
        }
        if config.api_key.trim().is_empty() {
            return Err(Error::InvalidConfig(format!(
                "{API_KEY_ENV} must be set (or api_key configured) to use OpenAI embeddings"
            )));
        }
        if config.organization.is_empty() {
            config.organization = std::env::var(ORGANIZATION_ENV).unwrap_or_default();
        }

        let base = config.api_base.as_deref().filter(|s| !s.is_empty()).unwrap_or(DEFAULT_API_BASE);
        let endpoint = format!("{}/embeddings", base.trim_end_matches('/'));
        let tokenizer = tokenizer_for_model(&config.model_name)?;
        let client = Client::builder()
            .build()
            .map_err(|e| Error::InvalidConfig(format!("Failed to build HTTP client: {e}")))?;

        info!(model = %config.model_name, endpoint = %endpoint, batch_size = config.batch_size, "OpenAI embeddings ready");
        Ok(Self { config, client, endpoint, tokenizer })
    }

    pub fn config(&self) -> &OpenAiEmbeddingsConfig {
        &self.config
    }

    /// Token ids of each text, keeping at most `context_length` leading tokens.
    /// Special-token text is encoded as ordinary text.
    pub fn truncate_texts(&self, texts: &[String]) -> Vec<TokenIds> {
        texts
            .iter()
            .map(|text| {
                self.tokenizer
                    .encode_ordinary(text)
                    .into_iter()
                    .take(self.config.context_length)
                    .map(|t| t as u32)
                    .collect()
            })
            .collect()
    }

    fn request_batch(&self, batch: &[TokenIds]) -> Result<Embeddings> {
        let body = EmbeddingRequest { model: &self.config.model_name, input: batch };
        let mut request = self.client.post(&self.endpoint).bearer_auth(&self.config.api_key).json(&body);
        if !self.config.organization.is_empty() {
            request = request.header("OpenAI-Organization", &self.config.organization);
        }

        let response = request.send().map_err(|e| Error::transport(&self.endpoint, None, e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let detail = response.text().unwrap_or_default();
            return Err(Error::transport(&self.endpoint, Some(status.as_u16()), detail));
        }
        let parsed: EmbeddingResponse = response
            .json()
            .map_err(|e| Error::transport(&self.endpoint, Some(status.as_u16()), format!("unexpected response format: {e}")))?;

        if parsed.data.len() != batch.len() {
            warn!(expected = batch.len(), got = parsed.data.len(), "embedding count mismatch");
            return Err(Error::Backend(format!("expected {} embeddings, got {}", batch.len(), parsed.data.len())));
        }
        let mut data = parsed.data;
        data.sort_by_key(|d| d.index);
        if data.iter().enumerate().any(|(i, d)| d.index != i) {
            warn!(count = data.len(), "embedding indices do not cover the batch");
            return Err(Error::Backend(format!("response indices are not 0..{}", batch.len())));
        }
        Ok(data.into_iter().map(|d| d.embedding).collect())
    }
}

impl EmbeddingModel for OpenAiEmbeddings {
    fn model_name(&self) -> &str {
        &self.config.model_name
    }

    fn context_length(&self) -> usize {
        self.config.context_length
    }

    fn embedding_dims(&self) -> Result<usize> {
        Ok(self.config.dims)
    }

    #[instrument(skip(self, texts), fields(model = %self.config.model_name, count = texts.len()))]
    fn embed(&self, texts: &[String]) -> Result<Embeddings> {
        let start = Instant::now();
        let tokenized = self.truncate_texts(texts);
        let mut embeds = Vec::with_capacity(texts.len());
        for (i, batch) in batched(tokenized, self.config.batch_size)?.enumerate() {
            debug!(batch = i, size = batch.len(), "requesting embeddings");
            let batch_embeds = retry(&self.config.retry, || self.request_batch(&batch))?;
            embeds.extend(batch_embeds);
        }
        info!(count = embeds.len(), elapsed_ms = start.elapsed().as_millis() as u64, "OpenAI embeddings done");
        Ok(embeds)
    }
}

fn tokenizer_for_model(model_name: &str) -> Result<CoreBPE> {
    match tiktoken_rs::get_bpe_from_model(model_name) {
        Ok(bpe) => Ok(bpe),
        Err(_) => {
            debug!(model = model_name, "no tiktoken mapping for model, using cl100k_base");
            tiktoken_rs::cl100k_base().map_err(|e| Error::Tokenizer(e.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_models_fall_back_to_cl100k() {
        let known = tokenizer_for_model("text-embedding-ada-002").unwrap();
        let fallback = tokenizer_for_model("my-private-embedder").unwrap();
        assert_eq!(known.encode_ordinary("hello world"), fallback.encode_ordinary("hello world"));
    }
}
