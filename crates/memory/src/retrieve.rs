//! Retrieval strategies for building a context string before the agent runs.
//!
//! Two independent rankers share the [`Retriever`] trait:
//!
//! - [`EmbeddingRetrieve`] sends the query and every candidate document to a
//!   remote [`Reranker`] and trusts its scores.
//! - [`VectorRetriever`] embeds the query with a [`Provider`] and ranks a local
//!   [`VectorStore`] by cosine similarity. Its store is populated separately
//!   through [`VectorRetriever::index_documents`]; nothing keeps it in sync
//!   with the rerank corpus.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use toolrelay_core::error::RetrievalError;
use toolrelay_core::provider::{EmbeddingRequest, Provider};
use toolrelay_core::rerank::Reranker;
use tracing::{debug, info, warn};

use crate::vector::{VectorStore, descending};

/// A document together with the score that ranked it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredDocument {
    pub document: String,
    pub score: f32,
}

/// Something that can rank documents against a query.
#[async_trait]
pub trait Retriever: Send + Sync {
    fn name(&self) -> &str;

    /// At most `top_k` documents, best first. Equal scores keep corpus order.
    async fn retrieve(
        &self,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<ScoredDocument>, RetrievalError>;
}

/// Ranks a fixed document list with a remote reranker.
pub struct EmbeddingRetrieve {
    reranker: Arc<dyn Reranker>,
    documents: Vec<String>,
}

impl EmbeddingRetrieve {
    pub fn new(reranker: Arc<dyn Reranker>, documents: Vec<String>) -> Self {
        Self {
            reranker,
            documents,
        }
    }

    pub fn documents(&self) -> &[String] {
        &self.documents
    }

    /// Relevance scores aligned positionally with `documents`.
    pub async fn score(
        &self,
        query: &str,
        documents: &[String],
    ) -> Result<Vec<f32>, RetrievalError> {
        let scores = self.reranker.rerank(query, documents).await?;
        if scores.len() != documents.len() {
            return Err(RetrievalError::MalformedResponse(format!(
                "expected {} scores, got {}",
                documents.len(),
                scores.len()
            )));
        }
        Ok(scores)
    }
}

#[async_trait]
impl Retriever for EmbeddingRetrieve {
    fn name(&self) -> &str {
        "rerank"
    }

    async fn retrieve(
        &self,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<ScoredDocument>, RetrievalError> {
        if self.documents.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }

        let scores = self.score(query, &self.documents).await?;
        let mut ranked: Vec<ScoredDocument> = scores
            .into_iter()
            .zip(self.documents.iter())
            .map(|(score, doc)| ScoredDocument {
                document: doc.clone(),
                score,
            })
            .collect();

        ranked.sort_by(|a, b| descending(a.score, b.score));
        ranked.truncate(top_k);

        debug!(
            reranker = %self.reranker.name(),
            candidates = self.documents.len(),
            returned = ranked.len(),
            "Reranked documents"
        );
        Ok(ranked)
    }
}

/// Ranks locally stored embeddings by cosine similarity to the query.
pub struct VectorRetriever {
    provider: Arc<dyn Provider>,
    model: String,
    store: RwLock<VectorStore>,
}

impl VectorRetriever {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            store: RwLock::new(VectorStore::new()),
        }
    }

    /// Use an already-populated store.
    pub fn with_store(mut self, store: VectorStore) -> Self {
        self.store = RwLock::new(store);
        self
    }

    /// Embed `documents` in one batch and append them to the store.
    ///
    /// Returns the number of documents added.
    pub async fn index_documents(&self, documents: Vec<String>) -> Result<usize, RetrievalError> {
        if documents.is_empty() {
            return Ok(0);
        }

        let added = documents.len();
        let embeddings = self.embed(documents.clone()).await?;
        if embeddings.len() != documents.len() {
            return Err(RetrievalError::MalformedResponse(format!(
                "expected {} embeddings, got {}",
                documents.len(),
                embeddings.len()
            )));
        }

        let mut store = self.store.write().await;
        for (embedding, document) in embeddings.into_iter().zip(documents) {
            store.add_item(embedding, document);
        }
        info!(model = %self.model, added, total = store.len(), "Indexed documents");
        Ok(added)
    }

    pub async fn len(&self) -> usize {
        self.store.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.store.read().await.is_empty()
    }

    async fn embed(&self, inputs: Vec<String>) -> Result<Vec<Vec<f32>>, RetrievalError> {
        let response = self
            .provider
            .embed(EmbeddingRequest {
                model: self.model.clone(),
                inputs,
            })
            .await
            .map_err(|e| RetrievalError::EmbeddingFailed(e.to_string()))?;
        Ok(response.embeddings)
    }
}

#[async_trait]
impl Retriever for VectorRetriever {
    fn name(&self) -> &str {
        "vector"
    }

    async fn retrieve(
        &self,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<ScoredDocument>, RetrievalError> {
        if top_k == 0 || self.store.read().await.is_empty() {
            return Ok(Vec::new());
        }

        let query_embedding = self
            .embed(vec![query.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| RetrievalError::MalformedResponse("no query embedding".into()))?;

        let store = self.store.read().await;
        Ok(store
            .search_scored(&query_embedding, top_k)
            .into_iter()
            .map(|(score, doc)| ScoredDocument {
                document: doc.to_string(),
                score,
            })
            .collect())
    }
}

/// Retrieve and join the top documents into one context block.
///
/// Best-effort: any retrieval failure is logged and yields an empty string.
pub async fn build_context(retriever: &dyn Retriever, query: &str, top_k: usize) -> String {
    match retriever.retrieve(query, top_k).await {
        Ok(docs) => {
            debug!(retriever = %retriever.name(), documents = docs.len(), "Built retrieval context");
            docs.into_iter()
                .map(|d| d.document)
                .collect::<Vec<_>>()
                .join("\n\n")
        }
        Err(e) => {
            warn!(retriever = %retriever.name(), error = %e, "Retrieval failed; continuing without context");
            String::new()
        }
    }
}
