//! Reranker trait: relevance scoring delegated to an external capability.

use async_trait::async_trait;

use crate::error::RetrievalError;

/// Scores candidate documents against a query.
#[async_trait]
pub trait Reranker: Send + Sync {
    /// A human-readable name for this reranker.
    fn name(&self) -> &str;

    /// Relevance scores aligned positionally with `documents`.
    async fn rerank(&self, query: &str, documents: &[String]) -> Result<Vec<f32>, RetrievalError>;
}
