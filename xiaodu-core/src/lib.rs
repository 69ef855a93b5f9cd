//! # Xiaodu MCP
//!
//! Remote control of Xiaodu smart speakers exposed as Model Context Protocol
//! tools:
//! - `list_user_devices`: devices bound to the caller's account
//! - `control_xiaodu`: natural-language commands
//! - `xiaodu_speak`: text to speech
//! - `xiaodu_take_photo`: camera capture, returned as an image block
//! - `push_resource_to_xiaodu`: images, video and audio on the device screen
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use xiaodu_core::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = XiaoduConfig::load(None)?;
//!     let cloud = HttpDeviceCloud::new(&config.cloud)?;
//!     let service = XiaoduService::new(Arc::new(cloud)).with_limits((&config.cloud).into());
//!
//!     let server = McpServer::builder()
//!         .name(config.server.name.clone())
//!         .with_tools(default_registry(service).map_err(|e| e.to_string())?)
//!         .with_default_token(config.cloud.access_token.clone().and_then(AccessToken::new))
//!         .build();
//!
//!     server.run(StdioTransport::new()).await
//! }
//! ```
//!
//! ## Architecture
//!
//! - [`device`]: validation, the [`device::DeviceCloud`] seam and its HTTP client
//! - [`tools`]: tool trait, static registry and the cancellable runtime
//! - [`mcp`]: JSON-RPC dispatch and the stdio, SSE and streamable-HTTP transports
//! - [`config`]: figment-layered configuration

pub mod config;
pub mod device;
pub mod error;
pub mod mcp;
pub mod tools;

/// Current library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::{CloudConfig, ServerConfig, TransportKind, XiaoduConfig};
    pub use crate::device::{
        AccessToken, DeviceCapability, DeviceCloud, DeviceDescriptor, DeviceError, DeviceTarget,
        HttpDeviceCloud, PhotoResult, ResourcePushRequest, ResourceType, ServiceLimits,
        XiaoduService,
    };
    pub use crate::error::{Result, XiaoduError};
    pub use crate::mcp::{
        ContentBlock, JsonRpcError, JsonRpcRequest, JsonRpcResponse, McpServer, McpServerBuilder,
        McpServerConfig, McpTool, RequestId, SessionContext, StdioTransport, Transport,
        serve_http,
    };
    pub use crate::tools::{
        BoxedTool, RegistryError, Tool, ToolContext, ToolError, ToolErrorKind, ToolOutput,
        ToolRegistry, ToolResult, ToolResultEnvelope, ToolRuntime, ToolSchema, default_registry,
    };
}
