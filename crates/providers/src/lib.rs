//! LLM provider implementations for toolrelay.
//!
//! The chat provider implements `toolrelay_core::Provider`; the reranker
//! implements `toolrelay_core::Reranker`. [`factory`] wires both from config.

pub mod factory;
pub mod openai_compat;
pub mod rerank;

pub use factory::{build_from_config, build_reranker};
pub use openai_compat::OpenAiCompatProvider;
pub use rerank::HttpReranker;
