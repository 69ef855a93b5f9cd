//! MCP Transport Implementations
//!
//! Transports handle the I/O for MCP communication. Framing errors are not
//! transport errors: an undecodable line comes back as
//! [`IncomingMessage::Invalid`] and the server answers it.

use super::protocol::{IncomingMessage, JsonRpcResponse};
use crate::error::XiaoduError;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines, Stdin, Stdout};
use tokio::sync::Mutex;

/// Transport trait for MCP communication
#[async_trait]
pub trait Transport: Send {
    /// Receive the next message; `None` at end of input.
    ///
    /// Must be cancel-safe: the server polls it inside `select!`.
    async fn receive(&mut self) -> crate::error::Result<Option<IncomingMessage>>;

    /// Send a response through the transport
    async fn send(&mut self, response: &JsonRpcResponse) -> crate::error::Result<()>;
}

/// Stdio transport for MCP
///
/// Messages are newline-delimited JSON on stdin/stdout. Logging goes to
/// stderr so stdout carries nothing but protocol traffic.
pub struct StdioTransport {
    stdin: Lines<BufReader<Stdin>>,
    stdout: Stdout,
}

impl StdioTransport {
    pub fn new() -> Self {
        Self {
            stdin: BufReader::new(tokio::io::stdin()).lines(),
            stdout: tokio::io::stdout(),
        }
    }
}

impl Default for StdioTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for StdioTransport {
    async fn receive(&mut self) -> crate::error::Result<Option<IncomingMessage>> {
        loop {
            let line = self
                .stdin
                .next_line()
                .await
                .map_err(|e| XiaoduError::Transport(format!("Failed to read from stdin: {}", e)))?;

            match line {
                None => return Ok(None),
                Some(line) if line.trim().is_empty() => continue,
                Some(line) => return Ok(Some(IncomingMessage::parse(line.trim()))),
            }
        }
    }

    async fn send(&mut self, response: &JsonRpcResponse) -> crate::error::Result<()> {
        let mut json = serde_json::to_string(response)?;
        json.push('\n');

        self.stdout
            .write_all(json.as_bytes())
            .await
            .map_err(|e| XiaoduError::Transport(format!("Failed to write to stdout: {}", e)))?;
        self.stdout
            .flush()
            .await
            .map_err(|e| XiaoduError::Transport(format!("Failed to flush stdout: {}", e)))?;

        Ok(())
    }
}

/// Scripted transport for tests and embedding
///
/// Yields queued lines in order, then end of input. Everything sent is kept
/// in a shared buffer readable after the server has consumed the transport.
#[derive(Default)]
pub struct MemoryTransport {
    incoming: VecDeque<String>,
    sent: Arc<Mutex<Vec<JsonRpcResponse>>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_line(&mut self, line: &str) {
        self.incoming.push_back(line.to_string());
    }

    /// Handle to the responses written so far
    pub fn sent(&self) -> Arc<Mutex<Vec<JsonRpcResponse>>> {
        self.sent.clone()
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn receive(&mut self) -> crate::error::Result<Option<IncomingMessage>> {
        // let spawned handlers run between messages, as real I/O would
        tokio::task::yield_now().await;
        Ok(self.incoming.pop_front().map(|line| IncomingMessage::parse(&line)))
    }

    async fn send(&mut self, response: &JsonRpcResponse) -> crate::error::Result<()> {
        self.sent.lock().await.push(response.clone());
        Ok(())
    }
}
