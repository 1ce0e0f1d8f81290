//! Tool providers for toolrelay.
//!
//! Tools live in external MCP servers. Each configured server becomes one
//! [`McpToolProvider`]; the agent flattens their catalogs into a single
//! registry at `init()`.

pub mod mcp;

use std::sync::Arc;

use toolrelay_config::ToolServerConfig;
use toolrelay_core::tool::ToolProvider;

pub use mcp::McpToolProvider;

/// One provider per configured server, in configuration order.
///
/// Order matters: on a tool-name collision the earlier server wins.
pub fn providers_from_config(servers: &[ToolServerConfig]) -> Vec<Arc<dyn ToolProvider>> {
    servers
        .iter()
        .map(|s| Arc::new(McpToolProvider::from_config(s)) as Arc<dyn ToolProvider>)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn providers_keep_configuration_order() {
        let server = |name: &str| ToolServerConfig {
            name: name.into(),
            command: "npx".into(),
            args: vec![],
            cwd: None,
            env: HashMap::new(),
        };
        let providers = providers_from_config(&[server("fetch"), server("filesystem")]);
        let names: Vec<_> = providers.iter().map(|p| p.name()).collect();
        assert_eq!(names, vec!["fetch", "filesystem"]);
    }
}
