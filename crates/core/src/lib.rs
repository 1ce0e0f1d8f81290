//! # ToolRelay Core
//!
//! Domain types, traits, and error definitions for the ToolRelay agent runtime.
//! Every external capability the agent talks to is a trait here:
//!
//! - [`Provider`]: chat completion (streamed) and embeddings
//! - [`ToolProvider`]: a catalog of invokable tools behind some transport
//! - [`Reranker`]: relevance scoring of documents against a query
//!
//! Implementations live in their respective crates and all crates depend
//! inward on this one.

pub mod error;
pub mod message;
pub mod provider;
pub mod rerank;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use error::{AgentError, Error, ProviderError, Result, RetrievalError, ToolError};
pub use message::{Conversation, ConversationId, Message, MessageToolCall, Role};
pub use provider::{Provider, ProviderRequest, ProviderResponse, StreamChunk, ToolCallDelta};
pub use rerank::Reranker;
pub use tool::{ToolDescriptor, ToolProvider, ToolRegistry};
