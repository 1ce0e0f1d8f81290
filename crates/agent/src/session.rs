//! The conversation owned by one agent.

use toolrelay_core::message::{Conversation, Message};
use toolrelay_core::provider::ProviderRequest;
use toolrelay_core::tool::ToolDescriptor;

/// Append-only conversation state plus request building.
#[derive(Debug, Clone)]
pub struct ChatSession {
    conversation: Conversation,
}

impl ChatSession {
    /// Start a session. Empty `system_prompt` or `context` add no turn.
    ///
    /// Retrieved context goes in as a user turn right after the system prompt.
    pub fn new(system_prompt: &str, context: &str) -> Self {
        let mut conversation = Conversation::new();
        if !system_prompt.is_empty() {
            conversation.push(Message::system(system_prompt));
        }
        if !context.is_empty() {
            conversation.push(Message::user(context));
        }
        Self { conversation }
    }

    pub fn append_user(&mut self, content: impl Into<String>) {
        self.conversation.push(Message::user(content));
    }

    pub fn append_assistant(&mut self, message: Message) {
        self.conversation.push(message);
    }

    pub fn append_tool_result(&mut self, tool_call_id: impl Into<String>, content: impl Into<String>) {
        self.conversation
            .push(Message::tool_result(tool_call_id, content));
    }

    /// A streaming request over the whole history.
    pub fn request(
        &self,
        model: &str,
        temperature: f32,
        max_tokens: Option<u32>,
        tools: Vec<ToolDescriptor>,
    ) -> ProviderRequest {
        ProviderRequest {
            model: model.to_string(),
            messages: self.conversation.messages.clone(),
            temperature,
            max_tokens,
            tools,
            stream: true,
        }
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn messages(&self) -> &[Message] {
        &self.conversation.messages
    }
}
