//! Build providers from configuration.

use std::sync::Arc;

use toolrelay_config::{AppConfig, RetrievalConfig};
use toolrelay_core::provider::Provider;
use toolrelay_core::rerank::Reranker;
use tracing::debug;

use crate::openai_compat::OpenAiCompatProvider;
use crate::rerank::HttpReranker;

/// Build the chat provider described by the top-level config.
///
/// The provider name is taken from the base URL host so logs say
/// "api.openai.com" or "dashscope.aliyuncs.com" rather than a generic label.
pub fn build_from_config(config: &AppConfig) -> Arc<dyn Provider> {
    let name = provider_name(&config.base_url);
    debug!(provider = %name, base_url = %config.base_url, "Building chat provider");
    Arc::new(OpenAiCompatProvider::new(
        name,
        &config.base_url,
        config.api_key.clone().unwrap_or_default(),
    ))
}

/// Build the reranker for the retrieval stage.
///
/// Falls back to the chat API key when no dedicated rerank key is set.
pub fn build_reranker(config: &AppConfig) -> Arc<dyn Reranker> {
    let RetrievalConfig {
        api_key,
        base_url,
        model,
        ..
    } = &config.retrieval;
    let key = api_key
        .clone()
        .or_else(|| config.api_key.clone())
        .unwrap_or_default();
    Arc::new(HttpReranker::new(base_url, key, model))
}

fn provider_name(base_url: &str) -> String {
    let without_scheme = base_url
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(base_url);
    let host = without_scheme.split(['/', ':']).next().unwrap_or_default();
    if host.is_empty() {
        "openai-compatible".to_string()
    } else {
        host.to_string()
    }
}
