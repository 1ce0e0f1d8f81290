//! `toolrelay retrieve`: Rank local documents against a query.

use std::path::{Path, PathBuf};

use super::{build_retriever, load_config, load_documents, missing_api_key};

pub async fn run(
    config_path: &Path,
    query: &str,
    top_k: Option<usize>,
    dir: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(config_path)?;
    if !config.has_api_key() && config.retrieval.api_key.is_none() {
        return Err(missing_api_key());
    }

    let dir = dir
        .or_else(|| config.retrieval.documents_dir.as_ref().map(PathBuf::from))
        .ok_or("No documents directory. Pass --dir or set retrieval.documents_dir")?;
    let documents = load_documents(&dir)
        .map_err(|e| format!("Failed to read {}: {e}", dir.display()))?;
    if documents.is_empty() {
        println!("No .md or .txt documents in {}", dir.display());
        return Ok(());
    }

    let provider = toolrelay_providers::build_from_config(&config);
    let retriever = build_retriever(&config, provider, documents).await?;
    let top_k = top_k.unwrap_or(config.retrieval.top_k);
    let ranked = retriever.retrieve(query, top_k).await?;

    println!();
    println!("  Strategy: {}", retriever.name());
    for (rank, hit) in ranked.iter().enumerate() {
        let first_line = hit.document.lines().next().unwrap_or("");
        println!("  {:>2}. {:.4}  {first_line}", rank + 1, hit.score);
    }
    println!();
    Ok(())
}
