//! End-to-end tests for the agent pipeline.
//!
//! These run the loop against a scripted model, real MCP providers talking
//! to in-process servers, and the retrieval stage that feeds context in.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, duplex, split};
use toolrelay_agent::{Agent, AgentStreamEvent};
use toolrelay_core::error::{ProviderError, RetrievalError};
use toolrelay_core::message::{Message, MessageToolCall, Role};
use toolrelay_core::provider::{Provider, ProviderRequest, ProviderResponse, Usage};
use toolrelay_core::rerank::Reranker;
use toolrelay_core::tool::ToolProvider;
use toolrelay_memory::{EmbeddingRetrieve, build_context};
use toolrelay_tools::McpToolProvider;

// ── Mock Provider ────────────────────────────────────────────────────────

/// Returns scripted complete responses in sequence; streaming goes through
/// the trait's default replay.
struct ScriptedProvider {
    responses: std::sync::Mutex<Vec<ProviderResponse>>,
    requests: std::sync::Mutex<Vec<ProviderRequest>>,
}

impl ScriptedProvider {
    fn new(responses: Vec<ProviderResponse>) -> Arc<Self> {
        Arc::new(Self {
            responses: std::sync::Mutex::new(responses.into_iter().rev().collect()),
            requests: std::sync::Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "e2e_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        self.requests.lock().unwrap().push(request);
        self.responses
            .lock()
            .unwrap()
            .pop()
            .ok_or_else(|| ProviderError::ApiError {
                status_code: 500,
                message: "ScriptedProvider exhausted".into(),
            })
    }
}

fn text_response(text: &str) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant(text),
        usage: Some(Usage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        }),
        model: "mock".into(),
    }
}

fn tool_response(calls: Vec<(&str, serde_json::Value)>) -> ProviderResponse {
    let tool_calls = calls
        .into_iter()
        .map(|(name, args)| MessageToolCall {
            id: format!("call_{name}"),
            name: name.to_string(),
            arguments: args.to_string(),
        })
        .collect();
    ProviderResponse {
        message: Message::assistant_with_tool_calls("", tool_calls),
        usage: None,
        model: "mock".into(),
    }
}

// ── In-process MCP server ────────────────────────────────────────────────

/// Serves the named tools; each call answers `"<server>:<tool>"`.
fn mcp_server(server_name: &'static str, tools: &'static [&'static str]) -> Arc<dyn ToolProvider> {
    let (client, server) = duplex(64 * 1024);
    let (client_read, client_write) = split(client);
    let (server_read, mut server_write) = split(server);

    tokio::spawn(async move {
        let mut lines = BufReader::new(server_read).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let msg: serde_json::Value = serde_json::from_str(&line).unwrap();
            let Some(id) = msg.get("id").cloned() else {
                continue;
            };
            let result = match msg["method"].as_str().unwrap_or_default() {
                "initialize" => serde_json::json!({
                    "protocolVersion": "2024-11-05",
                    "capabilities": {"tools": {}},
                    "serverInfo": {"name": server_name}
                }),
                "tools/list" => serde_json::json!({
                    "tools": tools.iter().map(|t| serde_json::json!({
                        "name": t,
                        "description": format!("{t} on {server_name}"),
                        "inputSchema": {"type": "object"}
                    })).collect::<Vec<_>>()
                }),
                "tools/call" => serde_json::json!({
                    "content": [{
                        "type": "text",
                        "text": format!("{server_name}:{}", msg["params"]["name"].as_str().unwrap_or_default())
                    }]
                }),
                _ => serde_json::json!({}),
            };
            let reply = serde_json::json!({"jsonrpc": "2.0", "id": id, "result": result});
            server_write
                .write_all(format!("{reply}\n").as_bytes())
                .await
                .unwrap();
        }
    });

    Arc::new(McpToolProvider::from_streams(
        server_name,
        Box::new(BufReader::new(client_read)),
        Box::new(client_write),
    ))
}

// ── Rerankers ────────────────────────────────────────────────────────────

/// Scores documents by how many query words they contain.
struct WordOverlap;

#[async_trait]
impl Reranker for WordOverlap {
    fn name(&self) -> &str {
        "overlap"
    }

    async fn rerank(&self, query: &str, documents: &[String]) -> Result<Vec<f32>, RetrievalError> {
        let words: Vec<String> = query.split_whitespace().map(str::to_lowercase).collect();
        Ok(documents
            .iter()
            .map(|d| {
                let d = d.to_lowercase();
                words.iter().filter(|w| d.contains(w.as_str())).count() as f32
            })
            .collect())
    }
}

struct Unreachable;

#[async_trait]
impl Reranker for Unreachable {
    fn name(&self) -> &str {
        "unreachable"
    }

    async fn rerank(&self, _query: &str, _documents: &[String]) -> Result<Vec<f32>, RetrievalError> {
        Err(RetrievalError::RerankFailed("connection refused".into()))
    }
}

// ── E2E: tool loop over MCP ──────────────────────────────────────────────

#[tokio::test]
async fn e2e_fetch_then_write_over_mcp() {
    let provider = ScriptedProvider::new(vec![
        tool_response(vec![("fetch", serde_json::json!({"url": "https://news.ycombinator.com"}))]),
        tool_response(vec![("write_file", serde_json::json!({"path": "output/news.md"}))]),
        text_response("Saved the summary to output/news.md"),
    ]);
    let fetch = mcp_server("fetch", &["fetch"]);
    let files = mcp_server("file", &["read_file", "write_file"]);

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let mut agent = Agent::new(provider.clone(), "mock", vec![fetch, files], "You are an assistant")
        .with_event_sink(tx);
    agent.init().await.unwrap();
    assert_eq!(
        agent.registry().unwrap().names(),
        vec!["fetch", "read_file", "write_file"]
    );

    let answer = agent.invoke("Summarize HN into output/news.md").await.unwrap();
    assert_eq!(answer, "Saved the summary to output/news.md");
    assert_eq!(provider.calls(), 3);

    let mut results = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if let AgentStreamEvent::ToolResult { name, output, success, .. } = event {
            assert!(success);
            results.push((name, output));
        }
    }
    assert_eq!(results.len(), 2);
    assert!(results[0].1.contains("fetch:fetch"));
    assert!(results[1].1.contains("file:write_file"));

    // The model's turn order: system, user, (assistant, tool) x2, assistant
    let roles: Vec<_> = agent
        .session()
        .unwrap()
        .messages()
        .iter()
        .map(|m| m.role.clone())
        .collect();
    assert_eq!(
        roles,
        vec![
            Role::System,
            Role::User,
            Role::Assistant,
            Role::Tool,
            Role::Assistant,
            Role::Tool,
            Role::Assistant
        ]
    );
    assert!(!agent.is_initialized());
}

#[tokio::test]
async fn e2e_duplicate_tool_names_route_to_first_server() {
    let provider = ScriptedProvider::new(vec![
        tool_response(vec![("search", serde_json::json!({"q": "rust"}))]),
        text_response("done"),
    ]);
    let primary = mcp_server("primary", &["search"]);
    let secondary = mcp_server("secondary", &["search", "extra"]);

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let mut agent = Agent::new(provider, "mock", vec![primary, secondary], "").with_event_sink(tx);
    agent.init().await.unwrap();
    assert_eq!(agent.registry().unwrap().len(), 2);

    agent.invoke("search for rust").await.unwrap();

    let outputs: Vec<String> = std::iter::from_fn(|| rx.try_recv().ok())
        .filter_map(|e| match e {
            AgentStreamEvent::ToolResult { output, .. } => Some(output),
            _ => None,
        })
        .collect();
    assert_eq!(outputs.len(), 1);
    assert!(outputs[0].contains("primary:search"));
}

#[tokio::test]
async fn e2e_no_tools_sends_no_tool_schema() {
    let provider = ScriptedProvider::new(vec![text_response("42")]);
    let mut agent = Agent::new(provider.clone(), "mock", vec![], "Answer briefly");
    agent.init().await.unwrap();

    assert_eq!(agent.invoke("6 * 7?").await.unwrap(), "42");
    let requests = provider.requests.lock().unwrap();
    assert!(requests[0].tools.is_empty());
}

#[tokio::test]
async fn e2e_provider_failure_propagates() {
    let provider = ScriptedProvider::new(vec![]);
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let mut agent = Agent::new(provider, "mock", vec![], "").with_event_sink(tx);
    agent.init().await.unwrap();

    let err = agent.invoke("hello").await.unwrap_err();
    assert!(matches!(err, toolrelay_core::Error::Provider(_)));
    assert!(matches!(rx.try_recv(), Ok(AgentStreamEvent::Error { .. })));

    // Providers stay up until the caller closes
    assert!(agent.is_initialized());
    agent.close().await;
}

// ── E2E: retrieval feeds context ─────────────────────────────────────────

#[tokio::test]
async fn e2e_retrieved_context_precedes_prompt() {
    let corpus = vec![
        "Bob is a data scientist who works on recommendation systems.".to_string(),
        "Alice is a Rust engineer who maintains an async runtime.".to_string(),
        "The office cafeteria opens at nine.".to_string(),
    ];
    let retriever = EmbeddingRetrieve::new(Arc::new(WordOverlap), corpus);
    let context = build_context(&retriever, "which rust engineer maintains the runtime", 1).await;
    assert_eq!(context, "Alice is a Rust engineer who maintains an async runtime.");

    let provider = ScriptedProvider::new(vec![text_response("Alice")]);
    let mut agent =
        Agent::new(provider.clone(), "mock", vec![], "Use the context").with_context(context);
    agent.init().await.unwrap();
    agent.invoke("Who maintains the runtime?").await.unwrap();

    let requests = provider.requests.lock().unwrap();
    let msgs = &requests[0].messages;
    assert_eq!(msgs.len(), 3);
    assert!(msgs[1].content.starts_with("Alice is a Rust engineer"));
    assert_eq!(msgs[2].content, "Who maintains the runtime?");
}

#[tokio::test]
async fn e2e_failed_retrieval_runs_without_context() {
    let retriever = EmbeddingRetrieve::new(Arc::new(Unreachable), vec!["doc".into()]);
    let context = build_context(&retriever, "anything", 3).await;
    assert!(context.is_empty());

    let provider = ScriptedProvider::new(vec![text_response("fine")]);
    let mut agent = Agent::new(provider.clone(), "mock", vec![], "sys").with_context(context);
    agent.init().await.unwrap();
    agent.invoke("q").await.unwrap();

    // No context turn: system + prompt only
    assert_eq!(provider.requests.lock().unwrap()[0].messages.len(), 2);
}
