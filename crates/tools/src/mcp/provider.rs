//! MCP tool provider: a tool server reached over stdio.
//!
//! `init` spawns the server (or adopts a pre-connected stream pair), runs the
//! `initialize` handshake and caches the tool catalog. `close` ends the
//! session and reaps the process; it is safe in every state.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use toolrelay_config::ToolServerConfig;
use toolrelay_core::error::ToolError;
use toolrelay_core::tool::{ToolDescriptor, ToolProvider};
use tracing::{debug, info, warn};

use super::transport::{BoxedReader, BoxedWriter, StdioTransport};
use super::types::{
    CallToolResult, InitializeResult, ListToolsResult, PROTOCOL_VERSION, extract_result,
};

/// Timeout for the initialize handshake and first catalog listing.
///
/// `npx`/`uvx` servers may download packages on first start.
const INIT_TIMEOUT: Duration = Duration::from_secs(60);

/// Grace period after closing stdin before the process is killed.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// How to reach the server.
enum Launcher {
    Process {
        command: String,
        args: Vec<String>,
        cwd: Option<PathBuf>,
        env: HashMap<String, String>,
    },
    /// A stream pair handed over once; used for in-process servers.
    Streams(std::sync::Mutex<Option<(BoxedReader, BoxedWriter)>>),
}

struct Session {
    transport: StdioTransport,
    child: Option<Child>,
    tools: Vec<ToolDescriptor>,
}

/// A [`ToolProvider`] backed by an MCP server.
pub struct McpToolProvider {
    name: String,
    launcher: Launcher,
    session: Mutex<Option<Session>>,
}

impl McpToolProvider {
    /// A server started as `command args...`.
    pub fn new(name: impl Into<String>, command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            name: name.into(),
            launcher: Launcher::Process {
                command: command.into(),
                args,
                cwd: None,
                env: HashMap::new(),
            },
            session: Mutex::new(None),
        }
    }

    pub fn from_config(config: &ToolServerConfig) -> Self {
        Self {
            name: config.name.clone(),
            launcher: Launcher::Process {
                command: config.command.clone(),
                args: config.args.clone(),
                cwd: config.cwd.as_ref().map(PathBuf::from),
                env: config.env.clone(),
            },
            session: Mutex::new(None),
        }
    }

    /// A server already connected through `reader`/`writer`.
    ///
    /// The streams are consumed by the first successful `init`; once closed,
    /// the provider cannot be re-initialized.
    pub fn from_streams(name: impl Into<String>, reader: BoxedReader, writer: BoxedWriter) -> Self {
        Self {
            name: name.into(),
            launcher: Launcher::Streams(std::sync::Mutex::new(Some((reader, writer)))),
            session: Mutex::new(None),
        }
    }

    pub async fn is_initialized(&self) -> bool {
        self.session.lock().await.is_some()
    }

    fn init_failed(&self, reason: impl Into<String>) -> ToolError {
        ToolError::InitFailed {
            provider: self.name.clone(),
            reason: reason.into(),
        }
    }

    fn connect(&self) -> Result<(StdioTransport, Option<Child>), ToolError> {
        match &self.launcher {
            Launcher::Process {
                command,
                args,
                cwd,
                env,
            } => {
                let mut cmd = Command::new(command);
                cmd.args(args)
                    .envs(env)
                    .stdin(Stdio::piped())
                    .stdout(Stdio::piped())
                    .stderr(Stdio::piped())
                    .kill_on_drop(true);
                if let Some(dir) = cwd {
                    cmd.current_dir(dir);
                }

                let mut child = cmd
                    .spawn()
                    .map_err(|e| self.init_failed(format!("failed to spawn '{command}': {e}")))?;

                let stdin = child
                    .stdin
                    .take()
                    .ok_or_else(|| self.init_failed("failed to capture stdin"))?;
                let stdout = child
                    .stdout
                    .take()
                    .ok_or_else(|| self.init_failed("failed to capture stdout"))?;

                if let Some(stderr) = child.stderr.take() {
                    let server = self.name.clone();
                    tokio::spawn(async move {
                        let mut lines = BufReader::new(stderr).lines();
                        while let Ok(Some(line)) = lines.next_line().await {
                            debug!(server = %server, "{line}");
                        }
                    });
                }

                let transport =
                    StdioTransport::new(&self.name, Box::new(BufReader::new(stdout)), Box::new(stdin));
                Ok((transport, Some(child)))
            }
            Launcher::Streams(slot) => {
                let (reader, writer) = slot
                    .lock()
                    .map_err(|_| self.init_failed("stream slot poisoned"))?
                    .take()
                    .ok_or_else(|| self.init_failed("streams already consumed"))?;
                Ok((StdioTransport::new(&self.name, reader, writer), None))
            }
        }
    }

    async fn handshake(&self, transport: &StdioTransport) -> Result<Vec<ToolDescriptor>, ToolError> {
        let params = serde_json::json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {},
            "clientInfo": {
                "name": "toolrelay",
                "version": env!("CARGO_PKG_VERSION"),
            },
        });
        let result = extract_result(transport.request("initialize", Some(params)).await?)
            .map_err(|e| self.init_failed(format!("initialize rejected: {e}")))?;
        let init: InitializeResult = serde_json::from_value(result)
            .map_err(|e| self.init_failed(format!("bad initialize result: {e}")))?;

        if let Some(info) = &init.server_info {
            debug!(
                server = %self.name,
                remote_name = info.name.as_deref().unwrap_or("?"),
                remote_version = info.version.as_deref().unwrap_or("?"),
                protocol = init.protocol_version.as_deref().unwrap_or("?"),
                "MCP handshake complete"
            );
        }

        transport.notify("notifications/initialized", None).await?;

        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let params = cursor
                .as_ref()
                .map(|c| serde_json::json!({ "cursor": c }));
            let result = extract_result(transport.request("tools/list", params).await?)
                .map_err(|e| self.init_failed(format!("tools/list failed: {e}")))?;
            let page: ListToolsResult = serde_json::from_value(result)
                .map_err(|e| self.init_failed(format!("bad tools/list result: {e}")))?;
            tools.extend(page.tools);
            match page.next_cursor {
                Some(next) if !next.is_empty() => cursor = Some(next),
                _ => break,
            }
        }
        Ok(tools)
    }

    async fn shutdown(&self, session: Session) {
        session.transport.shutdown().await;
        if let Some(mut child) = session.child {
            match tokio::time::timeout(SHUTDOWN_TIMEOUT, child.wait()).await {
                Ok(Ok(status)) => debug!(server = %self.name, %status, "Tool server exited"),
                _ => {
                    warn!(server = %self.name, "Tool server did not exit; killing");
                    let _ = child.kill().await;
                }
            }
        }
    }
}

#[async_trait]
impl ToolProvider for McpToolProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn init(&self) -> Result<(), ToolError> {
        let mut guard = self.session.lock().await;
        if guard.is_some() {
            return Ok(());
        }

        let (transport, child) = self.connect()?;
        let tools = match tokio::time::timeout(INIT_TIMEOUT, self.handshake(&transport)).await {
            Ok(Ok(tools)) => tools,
            Ok(Err(e)) => {
                self.shutdown(Session { transport, child, tools: vec![] }).await;
                return Err(match e {
                    ToolError::Transport { reason, .. } => self.init_failed(reason),
                    other => other,
                });
            }
            Err(_) => {
                self.shutdown(Session { transport, child, tools: vec![] }).await;
                return Err(self.init_failed(format!(
                    "handshake timed out after {}s",
                    INIT_TIMEOUT.as_secs()
                )));
            }
        };

        info!(
            server = %self.name,
            tools = ?tools.iter().map(|t| t.name.as_str()).collect::<Vec<_>>(),
            "Connected to tool server"
        );
        *guard = Some(Session {
            transport,
            child,
            tools,
        });
        Ok(())
    }

    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, ToolError> {
        self.session
            .lock()
            .await
            .as_ref()
            .map(|s| s.tools.clone())
            .ok_or_else(|| ToolError::NotInitialized {
                provider: self.name.clone(),
            })
    }

    async fn invoke(
        &self,
        name: &str,
        arguments: serde_json::Value,
    ) -> Result<serde_json::Value, ToolError> {
        let guard = self.session.lock().await;
        let session = guard.as_ref().ok_or_else(|| ToolError::NotInitialized {
            provider: self.name.clone(),
        })?;

        debug!(server = %self.name, tool = %name, "Calling tool");
        let params = serde_json::json!({ "name": name, "arguments": arguments });
        let response = session.transport.request("tools/call", Some(params)).await?;

        let failed = |reason: String| ToolError::ExecutionFailed {
            tool_name: name.to_string(),
            reason,
        };
        let result = extract_result(response).map_err(|e| failed(e.to_string()))?;
        let call: CallToolResult =
            serde_json::from_value(result).map_err(|e| failed(format!("bad tools/call result: {e}")))?;

        if call.is_error {
            return Err(failed(call.text()));
        }
        Ok(call.content)
    }

    async fn close(&self) {
        let session = self.session.lock().await.take();
        if let Some(session) = session {
            self.shutdown(session).await;
            info!(server = %self.name, "Closed tool server");
        }
    }
}
