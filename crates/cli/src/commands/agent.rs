//! `toolrelay agent`: One-shot or interactive chat with tool use.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use toolrelay_agent::{Agent, AgentStreamEvent, MAX_ITERATIONS_NOTICE};
use toolrelay_config::AppConfig;
use toolrelay_core::provider::Provider;
use toolrelay_core::tool::ToolProvider;
use toolrelay_memory::{Retriever, build_context};
use tracing::{info, warn};

use super::{build_retriever, load_config, load_documents, missing_api_key};

pub async fn run(
    config_path: &Path,
    message: Option<String>,
    no_retrieval: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(config_path)?;
    if !config.has_api_key() {
        return Err(missing_api_key());
    }

    let provider = toolrelay_providers::build_from_config(&config);
    let tool_providers = toolrelay_tools::providers_from_config(&config.tool_servers);

    let retriever = if config.retrieval.enabled && !no_retrieval {
        open_retriever(&config, provider.clone()).await
    } else {
        None
    };

    let (tx, rx) = mpsc::unbounded_channel();
    let (turn_tx, mut turn_end) = mpsc::unbounded_channel();
    let printer = spawn_printer(rx, turn_tx);

    let result = match message {
        Some(msg) => {
            let context = context_for(retriever.as_deref(), &config, &msg).await;
            let mut agent =
                build_agent(&config, provider, tool_providers, context).with_event_sink(tx);
            let outcome = one_shot(&mut agent, &msg, &mut turn_end).await;
            agent.close().await;
            outcome
        }
        None => {
            repl(
                &config,
                provider,
                tool_providers,
                retriever.as_deref(),
                tx,
                &mut turn_end,
            )
            .await
        }
    };

    // The agent owned the last sender, so the printer drains and exits.
    let _ = printer.await;
    result
}

async fn one_shot(
    agent: &mut Agent,
    message: &str,
    turn_end: &mut mpsc::UnboundedReceiver<()>,
) -> Result<(), Box<dyn std::error::Error>> {
    agent.init().await?;
    let outcome = agent.invoke(message).await;
    turn_end.recv().await;
    outcome?;
    println!();
    Ok(())
}

async fn repl(
    config: &AppConfig,
    provider: Arc<dyn Provider>,
    tool_providers: Vec<Arc<dyn ToolProvider>>,
    retriever: Option<&dyn Retriever>,
    tx: mpsc::UnboundedSender<AgentStreamEvent>,
    turn_end: &mut mpsc::UnboundedReceiver<()>,
) -> Result<(), Box<dyn std::error::Error>> {
    println!();
    println!("  toolrelay agent, interactive mode");
    println!("  Model:   {}", config.model);
    println!(
        "  Servers: {}",
        if config.tool_servers.is_empty() {
            "(none)".to_string()
        } else {
            config
                .tool_servers
                .iter()
                .map(|s| s.name.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        }
    );
    println!("  Type 'exit' or Ctrl+D to quit.");
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut agent: Option<Agent> = None;
    let mut pending = Some((provider, tool_providers, tx));

    loop {
        print!("  You > ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if matches!(line, "exit" | "quit") {
            break;
        }

        // Retrieval context is fixed at session start, so the first line
        // picks it.
        if let Some((provider, tool_providers, tx)) = pending.take() {
            let context = context_for(retriever, config, line).await;
            let mut fresh = build_agent(config, provider, tool_providers, context)
                .keep_alive()
                .with_event_sink(tx);
            if let Err(e) = fresh.init().await {
                fresh.close().await;
                return Err(e.into());
            }
            agent = Some(fresh);
        }
        let Some(agent) = agent.as_mut() else {
            break;
        };

        let outcome = agent.invoke(line).await;
        // Let the printer finish this turn before the next prompt
        turn_end.recv().await;
        match outcome {
            Ok(_) => println!("\n"),
            Err(e) => {
                eprintln!("  [Error] {e}");
                println!();
            }
        }
    }

    if let Some(mut agent) = agent {
        agent.close().await;
    }
    println!();
    println!("  Goodbye!");
    Ok(())
}

fn build_agent(
    config: &AppConfig,
    provider: Arc<dyn Provider>,
    tool_providers: Vec<Arc<dyn ToolProvider>>,
    context: String,
) -> Agent {
    Agent::new(
        provider,
        &config.model,
        tool_providers,
        &config.agent.system_prompt,
    )
    .with_temperature(config.temperature)
    .with_max_tokens(config.max_tokens)
    .with_max_iterations(config.agent.max_iterations)
    .with_context(context)
}

/// Load documents and index them. Any failure disables retrieval for this run.
async fn open_retriever(
    config: &AppConfig,
    provider: Arc<dyn Provider>,
) -> Option<Box<dyn Retriever>> {
    let dir = config.retrieval.documents_dir.as_deref()?;
    let documents = match load_documents(Path::new(dir)) {
        Ok(docs) => docs,
        Err(e) => {
            warn!(dir = %dir, error = %e, "Could not read documents; continuing without retrieval");
            return None;
        }
    };
    info!(dir = %dir, documents = documents.len(), "Loaded retrieval documents");

    match build_retriever(config, provider, documents).await {
        Ok(retriever) => Some(retriever),
        Err(e) => {
            warn!(error = %e, "Retriever setup failed; continuing without retrieval");
            None
        }
    }
}

async fn context_for(retriever: Option<&dyn Retriever>, config: &AppConfig, query: &str) -> String {
    match retriever {
        Some(r) => build_context(r, query, config.retrieval.top_k).await,
        None => String::new(),
    }
}

/// Where one rendered event goes.
#[derive(Debug, PartialEq)]
enum Output {
    Stdout(String),
    Stderr(String),
    Nothing,
}

/// Model text and the iteration-limit notice go to stdout; tool activity
/// and errors go to stderr.
fn render(event: AgentStreamEvent) -> Output {
    match event {
        AgentStreamEvent::Chunk { content } => Output::Stdout(content),
        AgentStreamEvent::ToolCall { name, input, .. } => {
            Output::Stderr(format!("\n  [tool] {name} {input}\n"))
        }
        AgentStreamEvent::ToolResult { name, output, success, .. } => {
            let status = if success { "ok" } else { "failed" };
            Output::Stderr(format!("  [tool] {name} {status}: {}\n", preview(&output, 200)))
        }
        AgentStreamEvent::Done { truncated: true, .. } => {
            Output::Stdout(format!("\n{MAX_ITERATIONS_NOTICE}"))
        }
        AgentStreamEvent::Done { .. } => Output::Nothing,
        AgentStreamEvent::Error { message } => Output::Stderr(format!("\n  [agent] {message}\n")),
    }
}

/// Print events as they arrive.
///
/// Signals `turn_end` once the `done` or `error` event of a turn is printed,
/// so the caller can hold the next prompt until the answer is complete.
fn spawn_printer(
    mut rx: mpsc::UnboundedReceiver<AgentStreamEvent>,
    turn_end: mpsc::UnboundedSender<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let ends_turn = matches!(
                event,
                AgentStreamEvent::Done { .. } | AgentStreamEvent::Error { .. }
            );
            match render(event) {
                Output::Stdout(text) => {
                    print!("{text}");
                    let _ = std::io::stdout().flush();
                }
                Output::Stderr(text) => eprint!("{text}"),
                Output::Nothing => {}
            }
            if ends_turn {
                let _ = turn_end.send(());
            }
        }
    })
}

fn preview(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_cuts_on_char_boundaries() {
        assert_eq!(preview("short", 10), "short");
        assert_eq!(preview("héllo wörld", 5), "héllo...");
    }

    fn done(truncated: bool) -> AgentStreamEvent {
        AgentStreamEvent::Done {
            conversation_id: "c".into(),
            usage: None,
            iterations: 3,
            tool_calls_made: 2,
            truncated,
        }
    }

    #[test]
    fn iteration_limit_notice_goes_to_stdout() {
        assert_eq!(
            render(done(true)),
            Output::Stdout(format!("\n{MAX_ITERATIONS_NOTICE}"))
        );
        assert_eq!(render(done(false)), Output::Nothing);
    }

    #[test]
    fn tool_activity_goes_to_stderr() {
        let event = AgentStreamEvent::ToolResult {
            id: "call_1".into(),
            name: "fetch".into(),
            output: "{}".into(),
            success: false,
        };
        assert_eq!(render(event), Output::Stderr("  [tool] fetch failed: {}\n".into()));
    }

    #[tokio::test]
    async fn turn_end_follows_the_last_event_of_each_turn() {
        let (tx, rx) = mpsc::unbounded_channel();
        let (turn_tx, mut turn_end) = mpsc::unbounded_channel();
        let printer = spawn_printer(rx, turn_tx);

        tx.send(AgentStreamEvent::Chunk { content: String::new() }).unwrap();
        tx.send(done(false)).unwrap();
        assert_eq!(turn_end.recv().await, Some(()));

        tx.send(AgentStreamEvent::Error { message: "boom".into() }).unwrap();
        assert_eq!(turn_end.recv().await, Some(()));

        drop(tx);
        printer.await.unwrap();
        assert_eq!(turn_end.recv().await, None);
    }
}
