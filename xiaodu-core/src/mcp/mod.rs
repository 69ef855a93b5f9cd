//! Model Context Protocol (MCP) server
//!
//! Exposes the tool registry to MCP clients over JSON-RPC 2.0. Three
//! transports share one [`McpServer`]:
//! - stdio, newline-delimited JSON ([`StdioTransport`])
//! - SSE with a companion `POST /messages` endpoint ([`http`])
//! - streamable HTTP, `POST /mcp` ([`http`])
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use xiaodu_core::config::CloudConfig;
//! use xiaodu_core::device::{HttpDeviceCloud, XiaoduService};
//! use xiaodu_core::mcp::{McpServer, StdioTransport};
//! use xiaodu_core::tools::default_registry;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let cloud = HttpDeviceCloud::new(&CloudConfig::default())?;
//! let server = McpServer::builder()
//!     .name("xiaodu-mcp")
//!     .with_tools(default_registry(XiaoduService::new(Arc::new(cloud)))?)
//!     .build();
//!
//! server.run(StdioTransport::new()).await?;
//! # Ok(())
//! # }
//! ```
//!
//! Supported methods: `initialize`, `ping`, `tools/list`, `tools/call`, and
//! the `notifications/initialized` and `notifications/cancelled`
//! notifications.

pub mod http;
mod protocol;
mod server;
mod transport;

pub use http::{router, serve_http};
pub use protocol::*;
pub use server::{McpServer, McpServerBuilder, McpServerConfig, SessionContext, call_result};
pub use transport::{MemoryTransport, StdioTransport, Transport};
