//! In-memory vector store with cosine-similarity search.
//!
//! Items are appended and never mutated; search is a full scan. There is no
//! deduplication or capacity bound.

use serde::{Deserialize, Serialize};

/// Compute cosine similarity between two vectors.
///
/// Returns a value in [-1, 1] where 1 = identical, 0 = orthogonal, -1 = opposite.
/// Returns 0.0 for empty or mismatched vectors, for any zero-norm vector, and
/// when a non-finite component makes the result undefined.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;

    for (x, y) in a.iter().zip(b.iter()) {
        let x = *x as f64;
        let y = *y as f64;
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < 1e-10 {
        return 0.0;
    }

    let sim = dot / denom;
    // Infinite components give inf/inf
    if sim.is_finite() { sim as f32 } else { 0.0 }
}

/// Descending order for ranking scores. NaN ranks below every number and
/// `-0.0` ties with `0.0`, so a stable sort stays a total order.
pub(crate) fn descending(a: f32, b: f32) -> std::cmp::Ordering {
    fn key(s: f32) -> f32 {
        if s.is_nan() {
            f32::NEG_INFINITY
        } else if s == 0.0 {
            0.0
        } else {
            s
        }
    }
    key(b).total_cmp(&key(a))
}

/// One stored document with its embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorItem {
    pub embedding: Vec<f32>,
    pub document: String,
}

/// An append-only collection of embedded documents.
#[derive(Debug, Clone, Default)]
pub struct VectorStore {
    items: Vec<VectorItem>,
}

impl VectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_item(&mut self, embedding: Vec<f32>, document: impl Into<String>) {
        self.items.push(VectorItem {
            embedding,
            document: document.into(),
        });
    }

    /// Up to `top_k` documents ordered by descending similarity to `query`.
    ///
    /// Equal scores keep insertion order.
    pub fn search(&self, query: &[f32], top_k: usize) -> Vec<String> {
        self.search_scored(query, top_k)
            .into_iter()
            .map(|(_, doc)| doc.to_string())
            .collect()
    }

    /// Like [`search`](Self::search) but keeps the similarity alongside each document.
    pub fn search_scored(&self, query: &[f32], top_k: usize) -> Vec<(f32, &str)> {
        let mut scored: Vec<(f32, &str)> = self
            .items
            .iter()
            .map(|item| {
                (
                    cosine_similarity(&item.embedding, query),
                    item.document.as_str(),
                )
            })
            .collect();

        // sort_by is stable
        scored.sort_by(|a, b| descending(a.0, b.0));
        scored.truncate(top_k);
        scored
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}
