//! Tool system
//!
//! Tools are named, schema-described handlers registered once at startup.
//! Key pieces:
//! - [`Tool`] trait and [`ToolRegistry`] static table
//! - [`ToolRuntime`] for cancellation and provenance
//! - [`ToolResultEnvelope`] with a unified error taxonomy
//! - the five device tools in [`xiaodu`]
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use xiaodu_core::config::CloudConfig;
//! use xiaodu_core::device::{HttpDeviceCloud, XiaoduService};
//! use xiaodu_core::tools::{default_registry, ToolContext, ToolRuntime};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let cloud = HttpDeviceCloud::new(&CloudConfig::default())?;
//! let registry = default_registry(XiaoduService::new(Arc::new(cloud)))?;
//!
//! let tool = registry.require("list_user_devices")?;
//! let _result = ToolRuntime::new()
//!     .execute(tool.as_ref(), serde_json::json!({}), &ToolContext::new())
//!     .await;
//! # Ok(())
//! # }
//! ```

mod registry;
mod result;
mod runtime;
mod tool;
pub mod xiaodu;

pub use registry::{RegistryError, ToolRegistry, ToolSummary};
pub use result::{
    ToolError, ToolErrorKind, ToolOutput, ToolProvenance, ToolResult, ToolResultEnvelope,
};
pub use runtime::{ToolContext, ToolRuntime};
pub use tool::{BoxedTool, Tool, ToolExecutionContext, ToolMetadata, ToolSchema};
pub use xiaodu::default_registry;
