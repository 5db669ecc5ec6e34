//! Embeddings from a self-hosted llama.cpp server.
//!
//! Truncation round-trips through the server's own `/tokenize` and
//! `/detokenize` endpoints, since its vocabulary need not match any local
//! tokenizer. Texts are embedded one request at a time.

use embedkit_core::{Embedding, EmbeddingModel, Embeddings, Error, Result, TokenIds};
use reqwest::blocking::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::config::{validate_dims, validate_limits, LlamaCppServerEmbeddingsConfig};

#[derive(Debug, Serialize)]
struct TokenizeRequest<'a> {
    content: &'a str,
    add_special: bool,
    with_pieces: bool,
}

#[derive(Debug, Deserialize)]
struct TokenizeResponse {
    tokens: TokenIds,
}

#[derive(Debug, Serialize)]
struct DetokenizeRequest<'a> {
    tokens: &'a [u32],
}

#[derive(Debug, Deserialize)]
struct DetokenizeResponse {
    content: String,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    embedding: Embedding,
}

pub struct LlamaCppServerEmbeddings {
    config: LlamaCppServerEmbeddingsConfig,
    client: Client,
    tokenize_url: String,
    detokenize_url: String,
    embedding_url: String,
}

impl LlamaCppServerEmbeddings {
    pub fn new(config: LlamaCppServerEmbeddingsConfig) -> Result<Self> {
        validate_limits("llamacppserver", config.batch_size, config.context_length)?;
        validate_dims("llamacppserver", config.dims)?;
        let base = config.api_base.trim().trim_end_matches('/');
        if base.is_empty() {
            return Err(Error::InvalidConfig("api_base must be set for llama.cpp server embeddings".to_string()));
        }
        let tokenize_url = format!("{base}/tokenize");
        let detokenize_url = format!("{base}/detokenize");
        let embedding_url = format!("{base}/embeddings");
        let client = Client::builder()
            .build()
            .map_err(|e| Error::InvalidConfig(format!("Failed to build HTTP client: {e}")))?;

        info!(api_base = base, context_length = config.context_length, "llama.cpp server embeddings ready");
        Ok(Self { config, client, tokenize_url, detokenize_url, embedding_url })
    }

    pub fn config(&self) -> &LlamaCppServerEmbeddingsConfig {
        &self.config
    }

    pub fn tokenize(&self, text: &str) -> Result<TokenIds> {
        let body = TokenizeRequest { content: text, add_special: false, with_pieces: false };
        let parsed: TokenizeResponse = self.post(&self.tokenize_url, &body)?;
        Ok(parsed.tokens)
    }

    pub fn detokenize(&self, tokens: &[u32]) -> Result<String> {
        let parsed: DetokenizeResponse = self.post(&self.detokenize_url, &DetokenizeRequest { tokens })?;
        Ok(parsed.content)
    }

    /// Keep the first `context_length` server tokens of `text`.
    pub fn truncate_to_context(&self, text: &str) -> Result<String> {
        let mut tokens = self.tokenize(text)?;
        tokens.truncate(self.config.context_length);
        self.detokenize(&tokens)
    }

    /// Embed a single, already truncated, text.
    pub fn generate_embedding(&self, text: &str) -> Result<Embedding> {
        let parsed: EmbeddingResponse = self.post(&self.embedding_url, &EmbeddingRequest { content: text })?;
        Ok(parsed.embedding)
    }

    fn post<B: Serialize, R: DeserializeOwned>(&self, url: &str, body: &B) -> Result<R> {
        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .map_err(|e| Error::transport(url, None, e.to_string()))?;
        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(Error::transport(url, Some(status.as_u16()), "server returned a non-success status"));
        }
        response
            .json::<R>()
            .map_err(|e| Error::transport(url, Some(status.as_u16()), format!("unexpected response format, is the URL correct? ({e})")))
    }
}

impl EmbeddingModel for LlamaCppServerEmbeddings {
    fn model_name(&self) -> &str {
        &self.config.model_name
    }

    fn context_length(&self) -> usize {
        self.config.context_length
    }

    fn embedding_dims(&self) -> Result<usize> {
        Ok(self.config.dims)
    }

    #[instrument(skip(self, texts), fields(count = texts.len()))]
    fn embed(&self, texts: &[String]) -> Result<Embeddings> {
        texts
            .iter()
            .map(|text| {
                let truncated = self.truncate_to_context(text)?;
                debug!(chars = text.len(), truncated_chars = truncated.len(), "embedding text");
                self.generate_embedding(&truncated)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoints_derive_from_base_without_double_slash() {
        let cfg = LlamaCppServerEmbeddingsConfig { api_base: "http://localhost:8080/".to_string(), dims: 8, ..Default::default() };
        let provider = LlamaCppServerEmbeddings::new(cfg).unwrap();
        assert_eq!(provider.tokenize_url, "http://localhost:8080/tokenize");
        assert_eq!(provider.detokenize_url, "http://localhost:8080/detokenize");
        assert_eq!(provider.embedding_url, "http://localhost:8080/embeddings");
    }

    #[test]
    fn empty_base_is_a_config_error() {
        let err = LlamaCppServerEmbeddings::new(LlamaCppServerEmbeddingsConfig { dims: 8, ..Default::default() }).err().unwrap();
        assert!(matches!(err, Error::InvalidConfig(_)));
        assert!(err.to_string().contains("api_base"), "{err}");
    }
}
