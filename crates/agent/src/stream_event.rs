//! Agent-level streaming events.
//!
//! `AgentStreamEvent` is what a caller sees while `Agent::invoke` runs:
//! text as it streams, each tool round-trip, and a closing summary. Events
//! are a side channel; dropping the receiver never affects the loop.

use serde::{Deserialize, Serialize};
use toolrelay_core::provider::Usage;

/// Events emitted by the agent during one invocation.
///
/// - `chunk`      : partial text token from the model
/// - `tool_call`  : the agent is invoking a tool
/// - `tool_result`: the invocation finished (or failed)
/// - `done`       : the loop ended
/// - `error`      : the loop aborted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentStreamEvent {
    /// Partial text token from the model.
    Chunk { content: String },

    /// The agent is calling a tool.
    ToolCall {
        id: String,
        name: String,
        input: serde_json::Value,
    },

    /// Tool execution completed; `output` is what the model will see.
    ToolResult {
        id: String,
        name: String,
        output: String,
        success: bool,
    },

    /// The loop is complete.
    Done {
        conversation_id: String,
        usage: Option<Usage>,
        iterations: u32,
        tool_calls_made: usize,
        /// True when the iteration limit ended the loop
        truncated: bool,
    },

    /// An error ended the loop.
    Error { message: String },
}

impl AgentStreamEvent {
    /// Short name for this event type.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Chunk { .. } => "chunk",
            Self::ToolCall { .. } => "tool_call",
            Self::ToolResult { .. } => "tool_result",
            Self::Done { .. } => "done",
            Self::Error { .. } => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_serialization() {
        let event = AgentStreamEvent::Chunk {
            content: "Hello".into(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"chunk""#));
        assert!(json.contains(r#""content":"Hello""#));
    }

    #[test]
    fn tool_call_serialization() {
        let event = AgentStreamEvent::ToolCall {
            id: "call_1".into(),
            name: "fetch".into(),
            input: serde_json::json!({"url": "https://example.com"}),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"tool_call""#));
        assert!(json.contains(r#""name":"fetch""#));
    }

    #[test]
    fn done_serialization() {
        let event = AgentStreamEvent::Done {
            conversation_id: "abc".into(),
            usage: Some(Usage {
                prompt_tokens: 10,
                completion_tokens: 20,
                total_tokens: 30,
            }),
            iterations: 2,
            tool_calls_made: 1,
            truncated: false,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"done""#));
        assert!(json.contains(r#""iterations":2"#));
        assert_eq!(event.event_type(), "done");
    }

    #[test]
    fn tool_result_type_name() {
        let event = AgentStreamEvent::ToolResult {
            id: "a".into(),
            name: "b".into(),
            output: "c".into(),
            success: false,
        };
        assert_eq!(event.event_type(), "tool_result");
    }

    #[test]
    fn deserialization_round_trip() {
        let json = r#"{"type":"error","message":"stream interrupted"}"#;
        let event: AgentStreamEvent = serde_json::from_str(json).unwrap();
        assert_eq!(
            event,
            AgentStreamEvent::Error {
                message: "stream interrupted".into()
            }
        );
    }
}
