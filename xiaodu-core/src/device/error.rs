//! Error taxonomy for device operations

use super::model::DeviceCapability;
use std::time::Duration;

/// Failure of a single device operation.
///
/// None of these are retried inside the service; retry policy belongs to the
/// calling client.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeviceError {
    /// Local validation failure. Never reaches the network.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Credential missing or rejected by the device cloud
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Target device is not reachable
    #[error("Device offline: {0}")]
    DeviceOffline(String),

    /// The operation needs a capability the device lacks
    #[error("Device {cuid} does not support {capability}")]
    CapabilityUnsupported {
        cuid: String,
        capability: DeviceCapability,
    },

    /// No image arrived within the capture window
    #[error("No image arrived within {0:?}")]
    CaptureTimeout(Duration),

    /// No acknowledgment within the effective timeout
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// The device cloud reported a failure
    #[error("Upstream error ({code}): {message}")]
    Upstream { code: i64, message: String },

    /// The device cloud could not be reached
    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// The caller abandoned the request
    #[error("Cancelled: {0}")]
    Cancelled(String),
}

impl DeviceError {
    /// Stable snake_case kind, surfaced to MCP clients
    pub fn kind(&self) -> &'static str {
        match self {
            DeviceError::InvalidArgument(_) => "invalid_argument",
            DeviceError::Authentication(_) => "authentication_error",
            DeviceError::DeviceOffline(_) => "device_offline",
            DeviceError::CapabilityUnsupported { .. } => "capability_unsupported",
            DeviceError::CaptureTimeout(_) => "capture_timeout",
            DeviceError::Timeout(_) => "timeout",
            DeviceError::Upstream { .. } => "upstream_error",
            DeviceError::UpstreamUnavailable(_) => "upstream_unavailable",
            DeviceError::Cancelled(_) => "cancelled",
        }
    }

    /// Backend error code, when the device cloud supplied one
    pub fn upstream_code(&self) -> Option<i64> {
        match self {
            DeviceError::Upstream { code, .. } => Some(*code),
            _ => None,
        }
    }

    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        DeviceError::InvalidArgument(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds_are_stable() {
        assert_eq!(DeviceError::invalid("x").kind(), "invalid_argument");
        assert_eq!(
            DeviceError::CapabilityUnsupported {
                cuid: "c".into(),
                capability: DeviceCapability::Camera,
            }
            .kind(),
            "capability_unsupported"
        );
        assert_eq!(
            DeviceError::CaptureTimeout(Duration::from_secs(1)).kind(),
            "capture_timeout"
        );
    }

    #[test]
    fn test_upstream_code() {
        let err = DeviceError::Upstream {
            code: 50012,
            message: "busy".into(),
        };
        assert_eq!(err.upstream_code(), Some(50012));
        assert_eq!(err.to_string(), "Upstream error (50012): busy");
        assert!(DeviceError::Timeout(Duration::from_secs(3)).upstream_code().is_none());
    }
}
