//! HTTP reranker for DashScope-style text-rerank endpoints.
//!
//! Request: `POST {base_url}/services/rerank/text-rerank/text-rerank` with
//! `{"model", "input": {"query", "documents"}}`.
//! Response: `{"output": {"results": [{"index", "relevance_score"}]}}`.

use async_trait::async_trait;
use serde::Deserialize;
use toolrelay_core::error::RetrievalError;
use toolrelay_core::rerank::Reranker;
use tracing::{debug, warn};

const RERANK_PATH: &str = "/services/rerank/text-rerank/text-rerank";

/// Scores documents with a hosted rerank model.
pub struct HttpReranker {
    base_url: String,
    api_key: String,
    model: String,
    client: reqwest::Client,
}

impl HttpReranker {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
            client,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl Reranker for HttpReranker {
    fn name(&self) -> &str {
        "http-rerank"
    }

    async fn rerank(&self, query: &str, documents: &[String]) -> Result<Vec<f32>, RetrievalError> {
        if documents.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}{RERANK_PATH}", self.base_url);
        let body = serde_json::json!({
            "model": self.model,
            "input": {
                "query": query,
                "documents": documents,
            },
        });

        debug!(model = %self.model, documents = documents.len(), "Sending rerank request");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| RetrievalError::RerankFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(RetrievalError::RerankFailed(format!(
                "HTTP {}: {text}",
                status.as_u16()
            )));
        }

        let parsed: RerankResponse = response
            .json()
            .await
            .map_err(|e| RetrievalError::MalformedResponse(e.to_string()))?;

        Ok(scores_by_index(parsed, documents.len()))
    }
}

/// Lay result scores out positionally. Documents the service didn't score
/// get 0.0; indices past the end are dropped.
fn scores_by_index(response: RerankResponse, len: usize) -> Vec<f32> {
    let mut scores = vec![0.0; len];
    for result in response.output.results {
        match scores.get_mut(result.index) {
            Some(slot) => *slot = result.relevance_score,
            None => warn!(
                index = result.index,
                documents = len,
                "Rerank result index out of range; ignoring"
            ),
        }
    }
    scores
}

#[derive(Debug, Deserialize)]
struct RerankResponse {
    output: RerankOutput,
}

#[derive(Debug, Deserialize)]
struct RerankOutput {
    #[serde(default)]
    results: Vec<RerankResult>,
}

#[derive(Debug, Deserialize)]
struct RerankResult {
    index: usize,
    relevance_score: f32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    fn docs() -> Vec<String> {
        vec!["apples".into(), "oranges".into(), "rust borrow checker".into()]
    }

    #[test]
    fn scores_are_placed_by_index() {
        let json = r#"{"output":{"results":[
            {"index":2,"relevance_score":0.9},
            {"index":0,"relevance_score":0.1}
        ]}}"#;
        let parsed: RerankResponse = serde_json::from_str(json).unwrap();
        assert_eq!(scores_by_index(parsed, 3), vec![0.1, 0.0, 0.9]);
    }

    #[test]
    fn out_of_range_index_is_ignored() {
        let json = r#"{"output":{"results":[{"index":7,"relevance_score":0.5}]}}"#;
        let parsed: RerankResponse = serde_json::from_str(json).unwrap();
        assert_eq!(scores_by_index(parsed, 2), vec![0.0, 0.0]);
    }

    #[tokio::test]
    async fn rerank_posts_query_and_documents() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/api/v1/services/rerank/text-rerank/text-rerank")
                    .header("authorization", "Bearer sk-rerank")
                    .json_body_partial(r#"{"model":"gte-rerank","input":{"query":"memory safety"}}"#);
                then.status(200).json_body(serde_json::json!({
                    "output": {"results": [
                        {"index": 2, "relevance_score": 0.93},
                        {"index": 1, "relevance_score": 0.12},
                        {"index": 0, "relevance_score": 0.05}
                    ]}
                }));
            })
            .await;

        let reranker = HttpReranker::new(server.url("/api/v1"), "sk-rerank", "gte-rerank");
        let scores = reranker.rerank("memory safety", &docs()).await.unwrap();

        mock.assert_async().await;
        assert_eq!(scores, vec![0.05, 0.12, 0.93]);
    }

    #[tokio::test]
    async fn empty_documents_skip_the_request() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.any_request();
                then.status(500);
            })
            .await;

        let reranker = HttpReranker::new(server.url(""), "k", "gte-rerank");
        let scores = reranker.rerank("anything", &[]).await.unwrap();

        assert!(scores.is_empty());
        mock.assert_hits_async(0).await;
    }

    #[tokio::test]
    async fn http_error_is_reported() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST);
                then.status(400).body("InvalidParameter");
            })
            .await;

        let reranker = HttpReranker::new(server.url(""), "k", "gte-rerank");
        let err = reranker.rerank("q", &docs()).await.unwrap_err();
        match err {
            RetrievalError::RerankFailed(msg) => assert!(msg.contains("400")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn malformed_body_is_reported() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST);
                then.status(200).body("{\"unexpected\":true}");
            })
            .await;

        let reranker = HttpReranker::new(server.url(""), "k", "gte-rerank");
        let err = reranker.rerank("q", &docs()).await.unwrap_err();
        assert!(matches!(err, RetrievalError::MalformedResponse(_)));
    }
}
