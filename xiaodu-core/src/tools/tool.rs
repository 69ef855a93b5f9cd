//! Tool trait and metadata definitions
//!
//! A tool is a name, an argument schema and an async handler. Tools are
//! registered once at startup into a [`super::ToolRegistry`].

use super::result::{ToolError, ToolOutput};
use crate::device::AccessToken;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// Tool metadata for discovery
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolMetadata {
    /// Tool name (unique identifier)
    pub name: String,

    /// Human-readable description shown to MCP clients
    pub description: String,

    /// Tags for categorization
    pub tags: Vec<String>,
}

impl ToolMetadata {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            tags: Vec::new(),
        }
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }
}

/// JSON Schema for tool parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSchema {
    pub parameters: Value,
}

impl ToolSchema {
    pub fn new(parameters: Value) -> Self {
        Self { parameters }
    }

    /// Schema for a tool that takes no parameters
    pub fn empty() -> Self {
        Self {
            parameters: serde_json::json!({
                "type": "object",
                "properties": {}
            }),
        }
    }

    /// Names listed under `required`
    pub fn required(&self) -> Vec<&str> {
        self.parameters
            .get("required")
            .and_then(Value::as_array)
            .map(|names| names.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default()
    }
}

/// Context provided to tool execution
#[derive(Debug, Clone, Default)]
pub struct ToolExecutionContext {
    /// Credential forwarded to the device cloud
    pub access_token: Option<AccessToken>,

    /// Trace ID for correlation
    pub trace_id: Option<String>,
}

impl ToolExecutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_access_token(mut self, token: Option<AccessToken>) -> Self {
        self.access_token = token;
        self
    }

    pub fn with_trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = Some(trace_id.into());
        self
    }
}

/// Core tool trait
#[async_trait]
pub trait Tool: Send + Sync {
    fn metadata(&self) -> &ToolMetadata;

    fn name(&self) -> &str {
        &self.metadata().name
    }

    fn description(&self) -> &str {
        &self.metadata().description
    }

    /// JSON schema for this tool's parameters
    fn schema(&self) -> ToolSchema;

    /// Execute the tool with given arguments.
    ///
    /// The runtime wraps the outcome in a [`super::ToolResultEnvelope`].
    async fn execute(&self, args: Value, ctx: &ToolExecutionContext) -> Result<ToolOutput, ToolError>;
}

/// Type alias for boxed tools
pub type BoxedTool = Arc<dyn Tool>;
