//! Model Context Protocol client over stdio.

pub mod provider;
pub mod transport;
pub mod types;

pub use provider::McpToolProvider;
pub use transport::StdioTransport;
