//! Subcommand implementations plus the setup they share.

pub mod agent;
pub mod config_cmd;
pub mod retrieve;
pub mod tools;

use std::path::Path;
use std::sync::Arc;

use toolrelay_config::{AppConfig, RetrievalStrategy};
use toolrelay_core::error::RetrievalError;
use toolrelay_core::provider::Provider;
use toolrelay_memory::{EmbeddingRetrieve, Retriever, VectorRetriever};

/// Load config from `path` with environment overrides.
pub fn load_config(path: &Path) -> Result<AppConfig, Box<dyn std::error::Error>> {
    AppConfig::load_with_env(path).map_err(|e| format!("Failed to load config: {e}").into())
}

/// Read every `.md` and `.txt` file in `dir` as one document each, in file
/// name order. Blank files are skipped.
pub fn load_documents(dir: &Path) -> std::io::Result<Vec<String>> {
    let mut paths: Vec<_> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
            p.is_file()
                && matches!(
                    p.extension().and_then(|e| e.to_str()),
                    Some("md") | Some("txt")
                )
        })
        .collect();
    paths.sort();

    let mut documents = Vec::with_capacity(paths.len());
    for path in paths {
        let text = std::fs::read_to_string(&path)?;
        let text = text.trim();
        if !text.is_empty() {
            documents.push(text.to_string());
        }
    }
    Ok(documents)
}

/// Build the configured retrieval strategy over `documents`.
pub async fn build_retriever(
    config: &AppConfig,
    provider: Arc<dyn Provider>,
    documents: Vec<String>,
) -> Result<Box<dyn Retriever>, RetrievalError> {
    match config.retrieval.strategy {
        RetrievalStrategy::Rerank => {
            let reranker = toolrelay_providers::build_reranker(config);
            Ok(Box::new(EmbeddingRetrieve::new(reranker, documents)))
        }
        RetrievalStrategy::Vector => {
            let retriever = VectorRetriever::new(provider, &config.retrieval.embedding_model);
            retriever.index_documents(documents).await?;
            Ok(Box::new(retriever))
        }
    }
}

/// Print the standard "no API key" help and return the matching error.
pub fn missing_api_key() -> Box<dyn std::error::Error> {
    eprintln!();
    eprintln!("  ERROR: No API key configured!");
    eprintln!();
    eprintln!("  Set one of these environment variables:");
    eprintln!("    TOOLRELAY_API_KEY = 'sk-...'");
    eprintln!("    OPENAI_API_KEY    = 'sk-...'");
    eprintln!();
    eprintln!("  Or add `api_key` to your config file:");
    eprintln!("    {}", AppConfig::config_path().display());
    eprintln!();
    "No API key found. See above for setup instructions.".into()
}
