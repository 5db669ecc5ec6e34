//! embedkit: embed text with the configured provider and print JSON vectors.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use embedkit_core::config::Config;
use embedkit_models::{
    dispatch, embedding_model, EmbeddingModel, EmbeddingModelConfig, ModelKind, SentenceTransformerEmbeddingsConfig,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "embedkit")]
#[command(about = "Embed text with OpenAI, local sentence-transformer, fastembed or llama.cpp server models", long_about = None)]
#[command(version)]
struct Cli {
    /// Directory holding embedkit.toml and embedkit.<env>.toml.
    #[arg(long, default_value = ".")]
    config_dir: PathBuf,
    /// Config environment (selects embedkit.<env>.toml).
    #[arg(long, env = "RUST_ENV", default_value = "dev")]
    env: String,
    /// Override `embedding.model_type`.
    #[arg(short, long)]
    kind: Option<String>,
    /// Override `embedding.model_name`.
    #[arg(short, long)]
    model: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Embed the given texts (or stdin, one text per line) and print a JSON array of vectors.
    Embed { texts: Vec<String> },
    /// Print the embedding dimensionality of the configured model.
    Dims,
    /// List provider kinds, marking the configured one.
    Kinds,
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let config = resolve_config(&cli)?;

    match cli.command {
        Commands::Kinds => {
            let selected = dispatch(config.model_type());
            for kind in ModelKind::ALL {
                let marker = if kind == selected { "*" } else { " " };
                println!("{marker} {kind}");
            }
        }
        Commands::Dims => {
            let model = embedding_model(config)?;
            println!("{}", model.embedding_dims()?);
        }
        Commands::Embed { texts } => {
            let texts = if texts.is_empty() { read_stdin_lines()? } else { texts };
            let model = embedding_model(config)?;
            info!(model = model.model_name(), count = texts.len(), "embedding");
            let embeddings = model.embedding_fn()(&texts)?;
            let stdout = io::stdout();
            let mut out = stdout.lock();
            serde_json::to_writer(&mut out, &embeddings)?;
            writeln!(out)?;
        }
    }
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(io::stderr).with_target(false).init();
}

/// Layered config plus command-line overrides. Without an `embedding`
/// section the local sentence-transformer defaults apply.
fn resolve_config(cli: &Cli) -> Result<EmbeddingModelConfig> {
    let mut config = Config::load_from(&cli.config_dir, &cli.env)
        .with_context(|| format!("loading configuration from {}", cli.config_dir.display()))?;
    if let Some(kind) = &cli.kind {
        config = config.with_override("embedding.model_type", kind);
    }
    if let Some(model) = &cli.model {
        config = config.with_override("embedding.model_name", model);
    }
    if !config.contains("embedding") {
        return Ok(EmbeddingModelConfig::SentenceTransformer(SentenceTransformerEmbeddingsConfig::default()));
    }
    if !config.contains("embedding.model_type") {
        config = config.with_override("embedding.model_type", ModelKind::SentenceTransformer.as_str());
    }
    Ok(EmbeddingModelConfig::from_config(&config)?)
}

fn read_stdin_lines() -> Result<Vec<String>> {
    let mut texts = Vec::new();
    for line in io::stdin().lock().lines() {
        let line = line.context("reading stdin")?;
        if !line.trim().is_empty() {
            texts.push(line);
        }
    }
    Ok(texts)
}
