//! Embed a couple of sentences with whichever provider `embedkit.toml` selects.
//!
//!     cargo run -p embedkit-models --example embed

use embedkit_core::config::Config;
use embedkit_models::{embedding_model, EmbeddingModelConfig};

fn main() -> anyhow::Result<()> {
    let config = EmbeddingModelConfig::from_config(&Config::load()?)?;
    let model = embedding_model(config)?;
    let texts = vec!["hello world".to_string(), "rust embeddings".to_string()];
    let embs = model.embedding_fn()(&texts)?;
    println!("model={} B={} dim={}", model.model_name(), embs.len(), model.embedding_dims()?);
    Ok(())
}
