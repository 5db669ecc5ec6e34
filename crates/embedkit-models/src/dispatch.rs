//! Provider selection by kind name.

use std::fmt;

use embedkit_core::{EmbeddingModel, Error, Result};

use crate::config::EmbeddingModelConfig;
use crate::fastembed::FastEmbedEmbeddings;
use crate::llamacpp::LlamaCppServerEmbeddings;
use crate::openai::OpenAiEmbeddings;
use crate::sentence::SentenceTransformerEmbeddings;

/// The closed set of embedding providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelKind {
    OpenAi,
    SentenceTransformer,
    FastEmbed,
    LlamaCppServer,
}

impl ModelKind {
    pub const ALL: [ModelKind; 4] = [Self::OpenAi, Self::SentenceTransformer, Self::FastEmbed, Self::LlamaCppServer];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::SentenceTransformer => "sentence-transformer",
            Self::FastEmbed => "fastembed",
            Self::LlamaCppServer => "llamacppserver",
        }
    }

    /// Construct the provider for `config`, which must be of this kind.
    pub fn build(self, config: EmbeddingModelConfig) -> Result<Box<dyn EmbeddingModel>> {
        let model: Box<dyn EmbeddingModel> = match (self, config) {
            (Self::OpenAi, EmbeddingModelConfig::OpenAi(c)) => Box::new(OpenAiEmbeddings::new(c)?),
            (Self::SentenceTransformer, EmbeddingModelConfig::SentenceTransformer(c)) => Box::new(SentenceTransformerEmbeddings::new(c)?),
            (Self::FastEmbed, EmbeddingModelConfig::FastEmbed(c)) => Box::new(FastEmbedEmbeddings::new(c)?),
            (Self::LlamaCppServer, EmbeddingModelConfig::LlamaCppServer(c)) => Box::new(LlamaCppServerEmbeddings::new(c)?),
            (kind, other) => {
                return Err(Error::InvalidConfig(format!(
                    "{} provider cannot be built from a '{}' configuration",
                    kind.as_str(),
                    other.model_type()
                )))
            }
        };
        Ok(model)
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Map a provider name to its kind. Unrecognized names fall back to the local
/// sentence-transformer provider.
pub fn dispatch(kind: &str) -> ModelKind {
    match kind {
        "openai" => ModelKind::OpenAi,
        "fastembed" => ModelKind::FastEmbed,
        "llamacppserver" => ModelKind::LlamaCppServer,
        _ => ModelKind::SentenceTransformer,
    }
}

/// Build the provider selected by the config's own `model_type`.
pub fn embedding_model(config: EmbeddingModelConfig) -> Result<Box<dyn EmbeddingModel>> {
    dispatch(config.model_type()).build(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_names_map_to_their_kind() {
        assert_eq!(dispatch("openai"), ModelKind::OpenAi);
        assert_eq!(dispatch("fastembed"), ModelKind::FastEmbed);
        assert_eq!(dispatch("llamacppserver"), ModelKind::LlamaCppServer);
        assert_eq!(dispatch("sentence-transformer"), ModelKind::SentenceTransformer);
    }

    #[test]
    fn unknown_names_fall_back_to_sentence_transformer() {
        for name in ["", "OpenAI", "cohere", "sentencetransformer"] {
            assert_eq!(dispatch(name), ModelKind::SentenceTransformer, "{name}");
        }
    }

    #[test]
    fn every_kind_dispatches_from_its_own_name() {
        for kind in ModelKind::ALL {
            assert_eq!(dispatch(kind.as_str()), kind);
        }
    }
}
