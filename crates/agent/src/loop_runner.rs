//! The agent tool loop.

use std::sync::Arc;

use tokio::sync::mpsc::UnboundedSender;
use toolrelay_core::error::{AgentError, ToolError};
use toolrelay_core::provider::{Provider, Usage};
use toolrelay_core::tool::{ToolDescriptor, ToolProvider, ToolRegistry};
use tracing::{debug, info, warn};

use crate::assembler::assemble;
use crate::session::ChatSession;
use crate::stream_event::AgentStreamEvent;

/// Returned when the iteration limit ends the loop before a final answer.
pub const MAX_ITERATIONS_NOTICE: &str =
    "I've reached the maximum number of tool call iterations. Please provide further guidance.";

/// Drives model turns and tool calls until the model answers in plain text.
pub struct Agent {
    /// The chat provider
    provider: Arc<dyn Provider>,

    model: String,
    temperature: f32,
    max_tokens: Option<u32>,

    /// Maximum model round-trips per invocation
    max_iterations: u32,

    /// Tool providers in registration order
    tool_providers: Vec<Arc<dyn ToolProvider>>,

    system_prompt: String,

    /// Retrieval context injected after the system prompt
    context: String,

    /// Close tool providers when an invocation finishes
    close_on_finish: bool,

    /// Present between `init()` and `close()`
    registry: Option<ToolRegistry>,

    session: Option<ChatSession>,

    events: Option<UnboundedSender<AgentStreamEvent>>,
}

impl Agent {
    pub fn new(
        provider: Arc<dyn Provider>,
        model: impl Into<String>,
        tool_providers: Vec<Arc<dyn ToolProvider>>,
        system_prompt: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature: 0.7,
            max_tokens: None,
            max_iterations: 25,
            tool_providers,
            system_prompt: system_prompt.into(),
            context: String::new(),
            close_on_finish: true,
            registry: None,
            session: None,
            events: None,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Set the default max tokens per model response.
    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    /// Set the maximum number of model round-trips per invocation.
    pub fn with_max_iterations(mut self, max: u32) -> Self {
        self.max_iterations = max;
        self
    }

    /// Retrieved context, added as a user turn after the system prompt.
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = context.into();
        self
    }

    /// Receive streaming events while `invoke` runs.
    pub fn with_event_sink(mut self, sink: UnboundedSender<AgentStreamEvent>) -> Self {
        self.events = Some(sink);
        self
    }

    /// Keep tool providers running after an invocation finishes, so the
    /// same agent can be invoked again without re-initializing.
    pub fn keep_alive(mut self) -> Self {
        self.close_on_finish = false;
        self
    }

    pub fn is_initialized(&self) -> bool {
        self.registry.is_some()
    }

    pub fn registry(&self) -> Option<&ToolRegistry> {
        self.registry.as_ref()
    }

    pub fn session(&self) -> Option<&ChatSession> {
        self.session.as_ref()
    }

    fn emit(&self, event: AgentStreamEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }

    /// Initialize every tool provider, in order, and build the registry.
    ///
    /// A second call is a no-op. If any provider fails, the ones already
    /// started are closed and the error is returned.
    pub async fn init(&mut self) -> toolrelay_core::Result<()> {
        if self.registry.is_some() {
            return Ok(());
        }

        info!(
            model = %self.model,
            providers = self.tool_providers.len(),
            "Initializing agent"
        );

        for (i, provider) in self.tool_providers.iter().enumerate() {
            if let Err(e) = provider.init().await {
                warn!(provider = %provider.name(), error = %e, "Tool provider failed to initialize");
                for started in &self.tool_providers[..i] {
                    started.close().await;
                }
                return Err(e.into());
            }
        }

        let registry = match ToolRegistry::from_providers(&self.tool_providers).await {
            Ok(registry) => registry,
            Err(e) => {
                self.close_providers().await;
                return Err(e.into());
            }
        };
        info!(tools = ?registry.names(), "Tool registry ready");

        self.registry = Some(registry);
        if self.session.is_none() {
            self.session = Some(ChatSession::new(&self.system_prompt, &self.context));
        }
        Ok(())
    }

    /// Run the loop for one prompt and return the model's final text.
    ///
    /// The prompt is appended as a user turn; later rounds add only the
    /// model's turns and tool results.
    pub async fn invoke(&mut self, prompt: &str) -> toolrelay_core::Result<String> {
        let Some(registry) = self.registry.as_ref() else {
            return Err(AgentError::Uninitialized.into());
        };
        let tools = registry.definitions();

        let mut session = self
            .session
            .take()
            .unwrap_or_else(|| ChatSession::new(&self.system_prompt, &self.context));
        session.append_user(prompt);

        let result = self.drive(&mut session, tools).await;
        self.session = Some(session);

        match result {
            Ok(answer) => {
                self.finish().await;
                Ok(answer)
            }
            Err(e) => {
                self.emit(AgentStreamEvent::Error {
                    message: e.to_string(),
                });
                Err(e)
            }
        }
    }

    async fn drive(
        &self,
        session: &mut ChatSession,
        tools: Vec<ToolDescriptor>,
    ) -> toolrelay_core::Result<String> {
        let conversation_id = session.conversation().id.to_string();
        let mut usage_total: Option<Usage> = None;
        let mut tool_calls_made = 0usize;

        for iteration in 1..=self.max_iterations {
            debug!(conversation_id = %conversation_id, iteration, "Agent loop iteration");

            let request = session.request(
                &self.model,
                self.temperature,
                self.max_tokens,
                tools.clone(),
            );
            let rx = self.provider.stream(request).await?;
            let turn = assemble(rx, |text| {
                self.emit(AgentStreamEvent::Chunk {
                    content: text.to_string(),
                })
            })
            .await?;
            if let Some(u) = &turn.usage {
                add_usage(&mut usage_total, u);
            }

            let tool_calls = turn.message.tool_calls.clone();
            let content = turn.message.content.clone();
            session.append_assistant(turn.message);

            if tool_calls.is_empty() {
                info!(
                    conversation_id = %conversation_id,
                    iterations = iteration,
                    tool_calls_made,
                    "Agent produced final answer"
                );
                self.emit(AgentStreamEvent::Done {
                    conversation_id,
                    usage: usage_total,
                    iterations: iteration,
                    tool_calls_made,
                    truncated: false,
                });
                return Ok(content);
            }

            debug!(count = tool_calls.len(), "Executing tool calls");
            for call in &tool_calls {
                let input = call.parsed_arguments();
                self.emit(AgentStreamEvent::ToolCall {
                    id: call.id.clone(),
                    name: call.name.clone(),
                    input: input.clone(),
                });

                let (output, success) = self.dispatch(&call.name, input).await;
                tool_calls_made += 1;

                self.emit(AgentStreamEvent::ToolResult {
                    id: call.id.clone(),
                    name: call.name.clone(),
                    output: output.clone(),
                    success,
                });
                session.append_tool_result(&call.id, output);
            }
        }

        warn!(
            conversation_id = %conversation_id,
            max_iterations = self.max_iterations,
            "Max tool iterations reached"
        );
        self.emit(AgentStreamEvent::Done {
            conversation_id,
            usage: usage_total,
            iterations: self.max_iterations,
            tool_calls_made,
            truncated: true,
        });
        Ok(MAX_ITERATIONS_NOTICE.to_string())
    }

    /// Invoke one tool and render the outcome as the text of a tool turn.
    /// Failures are rendered as a structured error payload.
    async fn dispatch(&self, name: &str, input: serde_json::Value) -> (String, bool) {
        let Some(registry) = self.registry.as_ref() else {
            return (error_payload("tool_not_found", name, "agent is closed"), false);
        };
        match registry.invoke(name, input).await {
            Ok(value) => (value.to_string(), true),
            Err(ToolError::NotFound(_)) => {
                warn!(tool = %name, "Model requested an unknown tool");
                (
                    error_payload("tool_not_found", name, &format!("No tool named '{name}' is available")),
                    false,
                )
            }
            Err(e) => {
                warn!(tool = %name, error = %e, "Tool invocation failed");
                (error_payload("invocation_failed", name, &e.to_string()), false)
            }
        }
    }

    async fn finish(&mut self) {
        if self.close_on_finish {
            self.close().await;
        }
    }

    /// Close every tool provider. Safe to call repeatedly; afterwards the
    /// agent needs `init()` again.
    pub async fn close(&mut self) {
        if self.registry.take().is_some() {
            info!("Closing tool providers");
        }
        self.close_providers().await;
    }

    async fn close_providers(&self) {
        for provider in &self.tool_providers {
            provider.close().await;
        }
    }
}

fn error_payload(kind: &str, tool: &str, message: &str) -> String {
    serde_json::json!({
        "error": {
            "kind": kind,
            "tool": tool,
            "message": message,
        }
    })
    .to_string()
}

fn add_usage(total: &mut Option<Usage>, u: &Usage) {
    let t = total.get_or_insert(Usage {
        prompt_tokens: 0,
        completion_tokens: 0,
        total_tokens: 0,
    });
    t.prompt_tokens += u.prompt_tokens;
    t.completion_tokens += u.completion_tokens;
    t.total_tokens += u.total_tokens;
}
