//! JSON-RPC 2.0 envelopes and the slice of MCP payloads the client reads.

use serde::{Deserialize, Serialize};
use toolrelay_core::tool::ToolDescriptor;

/// Protocol revision sent in the `initialize` request.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

// ─── JSON-RPC 2.0 ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

impl JsonRpcRequest {
    pub fn new(id: u64, method: &str, params: Option<serde_json::Value>) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            method: method.to_string(),
            params,
        }
    }
}

/// A notification carries no id and gets no reply.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcNotification {
    pub jsonrpc: &'static str,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

/// Anything the server writes that has an `id`.
///
/// Server-initiated requests also carry an id; they are told apart from
/// responses by the presence of `method`.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcResponse {
    pub id: u64,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<JsonRpcError>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(default)]
    pub data: Option<serde_json::Value>,
}

impl std::fmt::Display for JsonRpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (code {})", self.message, self.code)
    }
}

/// Unwrap a response into its result, or the server's error.
pub fn extract_result(response: JsonRpcResponse) -> Result<serde_json::Value, JsonRpcError> {
    if let Some(err) = response.error {
        return Err(err);
    }
    response.result.ok_or(JsonRpcError {
        code: -32603,
        message: "response missing both result and error".into(),
        data: None,
    })
}

// ─── MCP payloads ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServerInfo {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResult {
    #[serde(default)]
    pub protocol_version: Option<String>,
    #[serde(default)]
    pub server_info: Option<ServerInfo>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListToolsResult {
    #[serde(default)]
    pub tools: Vec<ToolDescriptor>,
    #[serde(default)]
    pub next_cursor: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallToolResult {
    #[serde(default)]
    pub content: serde_json::Value,
    #[serde(default)]
    pub is_error: bool,
}

impl CallToolResult {
    /// Concatenated text blocks, for error messages.
    pub fn text(&self) -> String {
        match &self.content {
            serde_json::Value::Array(blocks) => blocks
                .iter()
                .filter_map(|b| b.get("text").and_then(|t| t.as_str()))
                .collect::<Vec<_>>()
                .join("\n"),
            serde_json::Value::String(s) => s.clone(),
            _ => String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_omits_missing_params() {
        let json = serde_json::to_string(&JsonRpcRequest::new(1, "tools/list", None)).unwrap();
        assert!(json.contains("\"jsonrpc\":\"2.0\""));
        assert!(json.contains("\"method\":\"tools/list\""));
        assert!(!json.contains("params"));
    }

    #[test]
    fn extract_result_prefers_error() {
        let resp: JsonRpcResponse = serde_json::from_str(
            r#"{"jsonrpc":"2.0","id":3,"error":{"code":-32601,"message":"Method not found"}}"#,
        )
        .unwrap();
        let err = extract_result(resp).unwrap_err();
        assert_eq!(err.code, -32601);
        assert_eq!(err.to_string(), "Method not found (code -32601)");
    }

    #[test]
    fn extract_result_missing_both() {
        let resp: JsonRpcResponse = serde_json::from_str(r#"{"jsonrpc":"2.0","id":3}"#).unwrap();
        assert_eq!(extract_result(resp).unwrap_err().code, -32603);
    }

    #[test]
    fn server_request_is_recognized() {
        let msg: JsonRpcResponse =
            serde_json::from_str(r#"{"jsonrpc":"2.0","id":1,"method":"roots/list"}"#).unwrap();
        assert_eq!(msg.method.as_deref(), Some("roots/list"));
    }

    #[test]
    fn list_tools_reads_input_schema() {
        let result: ListToolsResult = serde_json::from_str(
            r#"{"tools":[{"name":"fetch","description":"Fetch a URL","inputSchema":{"type":"object","properties":{"url":{"type":"string"}}}}],"nextCursor":"page2"}"#,
        )
        .unwrap();
        assert_eq!(result.tools[0].name, "fetch");
        assert_eq!(result.tools[0].input_schema["properties"]["url"]["type"], "string");
        assert_eq!(result.next_cursor.as_deref(), Some("page2"));
    }

    #[test]
    fn call_result_text_joins_blocks() {
        let result: CallToolResult = serde_json::from_str(
            r#"{"content":[{"type":"text","text":"line one"},{"type":"image","data":"..."},{"type":"text","text":"line two"}],"isError":true}"#,
        )
        .unwrap();
        assert!(result.is_error);
        assert_eq!(result.text(), "line one\nline two");
    }
}
