//! Tool runtime
//!
//! Runs one tool call with cancellation and records provenance. Dropping the
//! tool future on cancellation drops any in-flight device cloud request with it.

use super::result::{ToolError, ToolProvenance, ToolResultEnvelope};
use super::tool::{Tool, ToolExecutionContext};
use crate::device::AccessToken;
use serde_json::Value;
use sha2::{Digest, Sha256};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Per-call context passed through the runtime
#[derive(Debug, Clone, Default)]
pub struct ToolContext {
    /// Credential forwarded to the device cloud
    pub access_token: Option<AccessToken>,

    /// Trace ID for correlation
    pub trace_id: Option<String>,

    /// Cancellation token
    pub cancellation: Option<CancellationToken>,
}

impl ToolContext {
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

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Check if cancellation has been requested
    pub fn is_cancelled(&self) -> bool {
        self.cancellation
            .as_ref()
            .map(|t| t.is_cancelled())
            .unwrap_or(false)
    }

    pub fn to_execution_context(&self) -> ToolExecutionContext {
        ToolExecutionContext {
            access_token: self.access_token.clone(),
            trace_id: self.trace_id.clone(),
        }
    }
}

/// Executes tools and wraps their outcome in an envelope
#[derive(Debug, Clone, Default)]
pub struct ToolRuntime;

impl ToolRuntime {
    pub fn new() -> Self {
        Self
    }

    pub async fn execute(&self, tool: &dyn Tool, args: Value, ctx: &ToolContext) -> ToolResultEnvelope {
        let started_at = chrono::Utc::now();
        let tool_name = tool.name().to_string();

        let args_json = serde_json::to_string(&args).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(args_json.as_bytes());
        let args_hash = format!("{:x}", hasher.finalize());

        let mut provenance = ToolProvenance::new(&tool_name, &args_hash[..16]);
        if let Some(ref trace_id) = ctx.trace_id {
            provenance = provenance.with_trace_id(trace_id);
        }

        if ctx.is_cancelled() {
            return ToolResultEnvelope::cancelled("Cancelled before execution", provenance);
        }

        debug!(tool = %tool_name, args_hash = %provenance.args_hash, "Executing tool");

        let exec_ctx = ctx.to_execution_context();
        let execution = tool.execute(args, &exec_ctx);

        let result = if let Some(ref cancel_token) = ctx.cancellation {
            tokio::select! {
                _ = cancel_token.cancelled() => None,
                res = execution => Some(res),
            }
        } else {
            Some(execution.await)
        };

        let duration = (chrono::Utc::now() - started_at)
            .to_std()
            .unwrap_or_default();
        provenance = provenance.with_duration(duration);

        match result {
            Some(Ok(output)) => {
                info!(tool = %tool_name, ?duration, "Tool succeeded");
                ToolResultEnvelope::success(output, provenance)
            }
            Some(Err(error)) => {
                warn!(tool = %tool_name, kind = error.kind.as_str(), ?duration, "Tool failed: {}", error.message);
                ToolResultEnvelope::error(error, provenance)
            }
            None => {
                info!(tool = %tool_name, ?duration, "Tool call cancelled");
                ToolResultEnvelope::cancelled("Execution cancelled", provenance)
            }
        }
    }

    /// Execute and return just the outcome
    pub async fn execute_simple(
        &self,
        tool: &dyn Tool,
        args: Value,
        ctx: &ToolContext,
    ) -> Result<super::ToolOutput, ToolError> {
        self.execute(tool, args, ctx).await.into_result()
    }
}
