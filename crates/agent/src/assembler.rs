//! Reassembly of a streamed model turn.
//!
//! A provider stream interleaves text fragments with tool-call fragments.
//! Tool-call fragments carry a position index; the first fragment at an
//! index opens an accumulator, later ones fill it in. `id` and `name` are
//! set (non-empty fragments only), `arguments` is appended.

use std::collections::BTreeMap;

use toolrelay_core::error::ProviderError;
use toolrelay_core::message::{Message, MessageToolCall};
use toolrelay_core::provider::{ChunkReceiver, StreamChunk, ToolCallDelta, Usage};
use tracing::debug;

/// Partial state of one tool call while its fragments arrive.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolCallAccumulator {
    pub id: String,
    pub name: String,
    pub arguments: String,
}

impl ToolCallAccumulator {
    fn apply(&mut self, delta: ToolCallDelta) {
        if let Some(id) = delta.id.filter(|s| !s.is_empty()) {
            self.id = id;
        }
        if let Some(name) = delta.name.filter(|s| !s.is_empty()) {
            self.name = name;
        }
        if let Some(args) = delta.arguments {
            self.arguments.push_str(&args);
        }
    }

    fn is_complete(&self) -> bool {
        !self.id.is_empty() && !self.name.is_empty()
    }
}

/// Normalize an argument blob to a JSON document string.
///
/// A blob that parses is returned verbatim. Anything else, including the
/// empty string, is wrapped as `{"input": raw}`.
pub fn normalize_arguments(raw: String) -> String {
    match serde_json::from_str::<serde_json::Value>(&raw) {
        Ok(_) => raw,
        Err(_) => serde_json::json!({ "input": raw }).to_string(),
    }
}

/// Accumulates one streamed assistant turn.
#[derive(Debug, Default)]
pub struct StreamAssembler {
    content: String,
    calls: BTreeMap<u32, ToolCallAccumulator>,
    usage: Option<Usage>,
}

impl StreamAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one chunk in. Returns the chunk's text fragment, if any, so the
    /// caller can echo it.
    pub fn push(&mut self, chunk: StreamChunk) -> Option<String> {
        for delta in chunk.tool_calls {
            self.calls.entry(delta.index).or_default().apply(delta);
        }
        if chunk.usage.is_some() {
            self.usage = chunk.usage;
        }
        let text = chunk.content.filter(|c| !c.is_empty())?;
        self.content.push_str(&text);
        Some(text)
    }

    /// Text received so far.
    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn usage(&self) -> Option<&Usage> {
        self.usage.as_ref()
    }

    /// Accumulators by index, including incomplete ones.
    pub fn pending_calls(&self) -> &BTreeMap<u32, ToolCallAccumulator> {
        &self.calls
    }

    /// The finished assistant message.
    ///
    /// Tool calls without both an id and a name are dropped.
    pub fn finish(self) -> Message {
        let mut tool_calls = Vec::with_capacity(self.calls.len());
        for (index, acc) in self.calls {
            if !acc.is_complete() {
                debug!(
                    index,
                    id = %acc.id,
                    name = %acc.name,
                    "Dropping incomplete tool call"
                );
                continue;
            }
            tool_calls.push(MessageToolCall {
                id: acc.id,
                name: acc.name,
                arguments: normalize_arguments(acc.arguments),
            });
        }
        Message::assistant_with_tool_calls(self.content, tool_calls)
    }
}

/// A fully received model turn.
#[derive(Debug, Clone)]
pub struct AssembledTurn {
    pub message: Message,
    pub usage: Option<Usage>,
}

/// Drain a provider stream into a message, calling `on_text` for each text
/// fragment as it arrives.
///
/// Stops at the first `done` chunk or when the channel closes. A provider
/// error item aborts the turn.
pub async fn assemble(
    mut rx: ChunkReceiver,
    mut on_text: impl FnMut(&str),
) -> Result<AssembledTurn, ProviderError> {
    let mut assembler = StreamAssembler::new();
    while let Some(item) = rx.recv().await {
        let chunk = item?;
        let done = chunk.done;
        if let Some(text) = assembler.push(chunk) {
            on_text(&text);
        }
        if done {
            break;
        }
    }
    let usage = assembler.usage.clone();
    Ok(AssembledTurn {
        message: assembler.finish(),
        usage,
    })
}
