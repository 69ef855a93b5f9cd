//! Error types for Xiaodu MCP operations

/// Result type for Xiaodu operations
pub type Result<T> = std::result::Result<T, XiaoduError>;

/// Error types for the server, its configuration and transports.
///
/// Failures of the device operations themselves are [`crate::device::DeviceError`]
/// and travel back to the MCP client as tool results, not through this type.
#[derive(Debug, thiserror::Error)]
pub enum XiaoduError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Transport I/O or framing error
    #[error("Transport error: {0}")]
    Transport(String),

    /// Malformed protocol traffic
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl From<String> for XiaoduError {
    fn from(s: String) -> Self {
        XiaoduError::Other(s)
    }
}

impl From<&str> for XiaoduError {
    fn from(s: &str) -> Self {
        XiaoduError::Other(s.to_string())
    }
}

impl From<anyhow::Error> for XiaoduError {
    fn from(err: anyhow::Error) -> Self {
        XiaoduError::Other(err.to_string())
    }
}

impl From<figment::Error> for XiaoduError {
    fn from(err: figment::Error) -> Self {
        XiaoduError::Configuration(err.to_string())
    }
}
