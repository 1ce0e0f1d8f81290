//! Retrieval for toolrelay: an in-memory vector store and the rankers that
//! feed context into the agent.

pub mod retrieve;
pub mod vector;

pub use retrieve::{
    EmbeddingRetrieve, Retriever, ScoredDocument, VectorRetriever, build_context,
};
pub use vector::{VectorItem, VectorStore, cosine_similarity};
