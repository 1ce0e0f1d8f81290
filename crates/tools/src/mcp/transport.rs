//! Line-delimited JSON-RPC over a byte stream pair.
//!
//! One JSON object per line in each direction. Requests are answered in
//! order; anything on the read side that isn't the awaited response (log
//! noise, notifications, server-initiated requests) is skipped.

use std::sync::atomic::{AtomicU64, Ordering};

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use toolrelay_core::error::ToolError;
use tracing::trace;

use super::types::{JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};

pub type BoxedReader = Box<dyn AsyncBufRead + Send + Unpin>;
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

struct Pipes {
    reader: BoxedReader,
    writer: BoxedWriter,
}

/// Bi-directional JSON-RPC transport.
pub struct StdioTransport {
    server_name: String,
    // One lock for both halves so a request/response pair is never interleaved
    pipes: Mutex<Pipes>,
    next_id: AtomicU64,
}

impl StdioTransport {
    pub fn new(server_name: &str, reader: BoxedReader, writer: BoxedWriter) -> Self {
        Self {
            server_name: server_name.to_string(),
            pipes: Mutex::new(Pipes { reader, writer }),
            next_id: AtomicU64::new(1),
        }
    }

    fn transport_error(&self, reason: String) -> ToolError {
        ToolError::Transport {
            provider: self.server_name.clone(),
            reason,
        }
    }

    /// Send a request and wait for the response with the matching id.
    pub async fn request(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<JsonRpcResponse, ToolError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let req = JsonRpcRequest::new(id, method, params);
        let line = serde_json::to_string(&req)
            .map_err(|e| self.transport_error(format!("failed to serialize request: {e}")))?;

        let mut pipes = self.pipes.lock().await;
        self.write_line(&mut pipes.writer, line).await?;

        let mut buf = String::new();
        loop {
            buf.clear();
            let bytes_read = pipes
                .reader
                .read_line(&mut buf)
                .await
                .map_err(|e| self.transport_error(format!("failed to read from server: {e}")))?;

            if bytes_read == 0 {
                return Err(self.transport_error(
                    "server output closed (process may have exited)".into(),
                ));
            }

            let trimmed = buf.trim();
            if trimmed.is_empty() {
                continue;
            }

            match serde_json::from_str::<JsonRpcResponse>(trimmed) {
                Ok(resp) if resp.id == id && resp.method.is_none() => return Ok(resp),
                Ok(other) => {
                    trace!(server = %self.server_name, id = other.id, "Skipping unrelated message");
                }
                Err(_) => {
                    trace!(server = %self.server_name, line = %trimmed, "Skipping non-response line");
                }
            }
        }
    }

    /// Send a notification (no response expected).
    pub async fn notify(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<(), ToolError> {
        let notification = JsonRpcNotification {
            jsonrpc: "2.0",
            method: method.to_string(),
            params,
        };
        let line = serde_json::to_string(&notification)
            .map_err(|e| self.transport_error(format!("failed to serialize notification: {e}")))?;

        let mut pipes = self.pipes.lock().await;
        self.write_line(&mut pipes.writer, line).await
    }

    /// Close the write side so the server sees end-of-input.
    pub async fn shutdown(&self) {
        let mut pipes = self.pipes.lock().await;
        let _ = pipes.writer.shutdown().await;
    }

    async fn write_line(&self, writer: &mut BoxedWriter, mut line: String) -> Result<(), ToolError> {
        line.push('\n');
        writer
            .write_all(line.as_bytes())
            .await
            .map_err(|e| self.transport_error(format!("failed to write to server: {e}")))?;
        writer
            .flush()
            .await
            .map_err(|e| self.transport_error(format!("failed to flush: {e}")))
    }
}
