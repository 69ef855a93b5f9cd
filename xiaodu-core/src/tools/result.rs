//! Structured tool result envelope and error model
//!
//! Every tool call produces a [`ToolResultEnvelope`]:
//! - Success with a [`ToolOutput`] payload
//! - Error carrying a [`ToolError`] whose kind mirrors [`DeviceError`]
//! - Cancelled when the caller abandoned the request
//!
//! plus [`ToolProvenance`] for log correlation.

use crate::device::DeviceError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::time::Duration;

/// Current schema version for result envelopes
pub const RESULT_SCHEMA_VERSION: u32 = 1;

/// Payload of a successful tool call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolOutput {
    /// Plain text returned by the device cloud
    Text { text: String },

    /// Base64-encoded image
    Image { data: String, mime_type: String },

    /// Structured value, rendered as JSON text for MCP clients
    Json { value: Value },
}

impl ToolOutput {
    pub fn text(text: impl Into<String>) -> Self {
        ToolOutput::Text { text: text.into() }
    }

    pub fn image(data: impl Into<String>, mime_type: impl Into<String>) -> Self {
        ToolOutput::Image {
            data: data.into(),
            mime_type: mime_type.into(),
        }
    }

    pub fn json(value: Value) -> Self {
        ToolOutput::Json { value }
    }
}

/// Structured result envelope for tool execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResultEnvelope {
    /// Schema version for forward compatibility
    pub schema_version: u32,

    /// Result status and payload
    pub result: ToolResult,

    /// Provenance metadata for tracing
    pub provenance: ToolProvenance,
}

impl ToolResultEnvelope {
    pub fn success(output: ToolOutput, provenance: ToolProvenance) -> Self {
        Self {
            schema_version: RESULT_SCHEMA_VERSION,
            result: ToolResult::Success { output },
            provenance,
        }
    }

    pub fn error(error: ToolError, provenance: ToolProvenance) -> Self {
        Self {
            schema_version: RESULT_SCHEMA_VERSION,
            result: ToolResult::Error { error },
            provenance,
        }
    }

    pub fn cancelled(reason: impl Into<String>, provenance: ToolProvenance) -> Self {
        Self {
            schema_version: RESULT_SCHEMA_VERSION,
            result: ToolResult::Cancelled {
                reason: reason.into(),
            },
            provenance,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.result, ToolResult::Success { .. })
    }

    pub fn is_error(&self) -> bool {
        matches!(self.result, ToolResult::Error { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.result, ToolResult::Cancelled { .. })
    }

    /// Get the output if successful
    pub fn output(&self) -> Option<&ToolOutput> {
        match &self.result {
            ToolResult::Success { output } => Some(output),
            _ => None,
        }
    }

    /// Get the error if failed
    pub fn get_error(&self) -> Option<&ToolError> {
        match &self.result {
            ToolResult::Error { error } => Some(error),
            _ => None,
        }
    }

    /// Collapse into the caller-facing outcome; cancellation becomes a
    /// `Cancelled` error.
    pub fn into_result(self) -> Result<ToolOutput, ToolError> {
        match self.result {
            ToolResult::Success { output } => Ok(output),
            ToolResult::Error { error } => Err(error),
            ToolResult::Cancelled { reason } => Err(ToolError::new(ToolErrorKind::Cancelled, reason)),
        }
    }
}

/// Tool execution result (success, error, or cancelled)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ToolResult {
    Success { output: ToolOutput },
    Error { error: ToolError },
    Cancelled { reason: String },
}

/// Structured tool error
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolError {
    /// Error kind
    pub kind: ToolErrorKind,

    /// Human-readable error message
    pub message: String,

    /// Device cloud error code, when one was reported
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<i64>,
}

impl ToolError {
    pub fn new(kind: ToolErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            code: None,
        }
    }

    pub fn with_code(mut self, code: i64) -> Self {
        self.code = Some(code);
        self
    }

    /// Malformed or missing tool arguments
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(ToolErrorKind::InvalidArgument, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ToolErrorKind::Internal, message)
    }

    /// The `{"error": {...}}` body handed to MCP clients
    pub fn to_payload(&self) -> Value {
        json!({ "error": self })
    }
}

impl std::fmt::Display for ToolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.kind.as_str(), self.message)
    }
}

impl std::error::Error for ToolError {}

impl From<DeviceError> for ToolError {
    fn from(err: DeviceError) -> Self {
        let kind = match &err {
            DeviceError::InvalidArgument(_) => ToolErrorKind::InvalidArgument,
            DeviceError::Authentication(_) => ToolErrorKind::Authentication,
            DeviceError::DeviceOffline(_) => ToolErrorKind::DeviceOffline,
            DeviceError::CapabilityUnsupported { .. } => ToolErrorKind::CapabilityUnsupported,
            DeviceError::CaptureTimeout(_) => ToolErrorKind::CaptureTimeout,
            DeviceError::Timeout(_) => ToolErrorKind::Timeout,
            DeviceError::Upstream { .. } => ToolErrorKind::Upstream,
            DeviceError::UpstreamUnavailable(_) => ToolErrorKind::UpstreamUnavailable,
            DeviceError::Cancelled(_) => ToolErrorKind::Cancelled,
        };
        Self {
            kind,
            message: err.to_string(),
            code: err.upstream_code(),
        }
    }
}

/// Error kind taxonomy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolErrorKind {
    InvalidArgument,
    #[serde(rename = "authentication_error")]
    Authentication,
    DeviceOffline,
    CapabilityUnsupported,
    CaptureTimeout,
    Timeout,
    #[serde(rename = "upstream_error")]
    Upstream,
    UpstreamUnavailable,
    Cancelled,
    /// Bug or unexpected state inside the server
    Internal,
}

impl ToolErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolErrorKind::InvalidArgument => "invalid_argument",
            ToolErrorKind::Authentication => "authentication_error",
            ToolErrorKind::DeviceOffline => "device_offline",
            ToolErrorKind::CapabilityUnsupported => "capability_unsupported",
            ToolErrorKind::CaptureTimeout => "capture_timeout",
            ToolErrorKind::Timeout => "timeout",
            ToolErrorKind::Upstream => "upstream_error",
            ToolErrorKind::UpstreamUnavailable => "upstream_unavailable",
            ToolErrorKind::Cancelled => "cancelled",
            ToolErrorKind::Internal => "internal",
        }
    }
}

/// Provenance metadata for tracing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolProvenance {
    pub tool_name: String,

    /// Truncated sha256 of the JSON arguments
    pub args_hash: String,

    pub started_at: DateTime<Utc>,

    #[serde(with = "duration_millis")]
    pub duration: Duration,

    /// Request/trace ID for correlation
    pub trace_id: Option<String>,
}

impl ToolProvenance {
    pub fn new(tool_name: impl Into<String>, args_hash: impl Into<String>) -> Self {
        Self {
            tool_name: tool_name.into(),
            args_hash: args_hash.into(),
            started_at: Utc::now(),
            duration: Duration::ZERO,
            trace_id: None,
        }
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    pub fn with_trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = Some(trace_id.into());
        self
    }
}

// Serde helpers for Duration serialization as milliseconds
mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
