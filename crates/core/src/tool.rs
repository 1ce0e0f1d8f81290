//! Tool providers and the tool registry.
//!
//! A [`ToolProvider`] is an external capability (usually a separate process)
//! that exposes a catalog of named tools. The agent flattens every provider's
//! catalog into one [`ToolRegistry`] at startup and resolves model-issued
//! tool calls against it with a plain lookup.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

use crate::error::ToolError;

/// A tool as declared by its provider and advertised to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// The tool name (unique within one provider)
    pub name: String,

    /// Description of what the tool does
    #[serde(default)]
    pub description: String,

    /// JSON Schema describing the tool's parameters
    #[serde(default = "empty_object_schema", alias = "inputSchema")]
    pub input_schema: serde_json::Value,
}

fn empty_object_schema() -> serde_json::Value {
    serde_json::json!({ "type": "object", "properties": {} })
}

/// An external source of invokable tools.
///
/// Lifecycle: uninitialized → initialized → closed. Implementations use
/// interior mutability so a provider can be shared behind an `Arc`.
#[async_trait]
pub trait ToolProvider: Send + Sync {
    /// A human-readable name for this provider (e.g., "filesystem", "fetch").
    fn name(&self) -> &str;

    /// Connect and perform any handshake. A second call is a no-op.
    async fn init(&self) -> Result<(), ToolError>;

    /// The tools this provider offers. Fails if not initialized.
    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, ToolError>;

    /// Invoke a tool with structured arguments.
    async fn invoke(
        &self,
        name: &str,
        arguments: serde_json::Value,
    ) -> Result<serde_json::Value, ToolError>;

    /// Release resources. Must be safe in every state, including after a
    /// failed `init` or on a provider that never connected.
    async fn close(&self);
}

struct RegisteredTool {
    descriptor: ToolDescriptor,
    provider: Arc<dyn ToolProvider>,
}

/// A flattened, ordered mapping from tool name to owning provider.
///
/// When two providers declare the same name, the provider registered first
/// wins; later declarations are skipped (logged, not an error).
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<RegisteredTool>,
    by_name: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from already-initialized providers, in order.
    pub async fn from_providers(providers: &[Arc<dyn ToolProvider>]) -> Result<Self, ToolError> {
        let mut registry = Self::new();
        for provider in providers {
            let tools = provider.list_tools().await?;
            registry.register(provider.clone(), tools);
        }
        Ok(registry)
    }

    /// Register a provider's tools. Returns the names that were shadowed by
    /// an earlier provider.
    pub fn register(
        &mut self,
        provider: Arc<dyn ToolProvider>,
        tools: Vec<ToolDescriptor>,
    ) -> Vec<String> {
        let mut shadowed = Vec::new();
        for descriptor in tools {
            if let Some(&existing) = self.by_name.get(&descriptor.name) {
                warn!(
                    tool = %descriptor.name,
                    kept = %self.tools[existing].provider.name(),
                    skipped = %provider.name(),
                    "Duplicate tool name across providers; keeping first registration"
                );
                shadowed.push(descriptor.name);
                continue;
            }
            self.by_name
                .insert(descriptor.name.clone(), self.tools.len());
            self.tools.push(RegisteredTool {
                descriptor,
                provider: provider.clone(),
            });
        }
        shadowed
    }

    /// Find the provider that owns a tool.
    pub fn resolve(&self, name: &str) -> Option<&Arc<dyn ToolProvider>> {
        self.by_name.get(name).map(|&i| &self.tools[i].provider)
    }

    /// Invoke a tool by name on its owning provider.
    pub async fn invoke(
        &self,
        name: &str,
        arguments: serde_json::Value,
    ) -> Result<serde_json::Value, ToolError> {
        let provider = self
            .resolve(name)
            .ok_or_else(|| ToolError::NotFound(name.to_string()))?;
        provider.invoke(name, arguments).await
    }

    /// All tool descriptors in registration order (for sending to the model).
    pub fn definitions(&self) -> Vec<ToolDescriptor> {
        self.tools.iter().map(|t| t.descriptor.clone()).collect()
    }

    /// List all registered tool names.
    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.descriptor.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A provider with a fixed catalog that echoes its own name back.
    struct StaticProvider {
        name: String,
        tools: Vec<&'static str>,
    }

    impl StaticProvider {
        fn new(name: &str, tools: Vec<&'static str>) -> Arc<dyn ToolProvider> {
            Arc::new(Self {
                name: name.into(),
                tools,
            })
        }
    }

    #[async_trait]
    impl ToolProvider for StaticProvider {
        fn name(&self) -> &str {
            &self.name
        }
        async fn init(&self) -> Result<(), ToolError> {
            Ok(())
        }
        async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, ToolError> {
            Ok(self
                .tools
                .iter()
                .map(|n| ToolDescriptor {
                    name: n.to_string(),
                    description: format!("{n} from {}", self.name),
                    input_schema: empty_object_schema(),
                })
                .collect())
        }
        async fn invoke(
            &self,
            name: &str,
            arguments: serde_json::Value,
        ) -> Result<serde_json::Value, ToolError> {
            Ok(serde_json::json!({ "provider": self.name, "tool": name, "args": arguments }))
        }
        async fn close(&self) {}
    }

    #[tokio::test]
    async fn first_registration_wins_on_collision() {
        let a = StaticProvider::new("a", vec!["read", "write"]);
        let b = StaticProvider::new("b", vec!["write", "fetch"]);
        let registry = ToolRegistry::from_providers(&[a, b]).await.unwrap();

        assert_eq!(registry.names(), vec!["read", "write", "fetch"]);
        assert_eq!(registry.resolve("write").unwrap().name(), "a");
        assert_eq!(registry.resolve("fetch").unwrap().name(), "b");
    }

    #[test]
    fn register_reports_shadowed_names() {
        let mut registry = ToolRegistry::new();
        registry.register(
            StaticProvider::new("a", vec![]),
            vec![ToolDescriptor {
                name: "x".into(),
                description: String::new(),
                input_schema: empty_object_schema(),
            }],
        );
        let shadowed = registry.register(
            StaticProvider::new("b", vec![]),
            vec![ToolDescriptor {
                name: "x".into(),
                description: String::new(),
                input_schema: empty_object_schema(),
            }],
        );
        assert_eq!(shadowed, vec!["x".to_string()]);
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn invoke_routes_to_owner() {
        let registry =
            ToolRegistry::from_providers(&[StaticProvider::new("fs", vec!["read"])])
                .await
                .unwrap();
        let out = registry
            .invoke("read", serde_json::json!({"path": "/tmp"}))
            .await
            .unwrap();
        assert_eq!(out["provider"], "fs");
        assert_eq!(out["args"]["path"], "/tmp");
    }

    #[tokio::test]
    async fn invoke_missing_tool() {
        let registry = ToolRegistry::new();
        let err = registry
            .invoke("nonexistent", serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::NotFound(_)));
    }

    #[test]
    fn descriptor_accepts_mcp_input_schema_key() {
        let json = r#"{"name":"fetch","description":"Fetch a URL","inputSchema":{"type":"object"}}"#;
        let tool: ToolDescriptor = serde_json::from_str(json).unwrap();
        assert_eq!(tool.input_schema["type"], "object");
    }
}
