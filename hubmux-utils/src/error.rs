//! Error types for hubmux
//!
//! Provides a unified error type used across all hubmux crates.

use std::path::PathBuf;

/// Main error type for hubmux operations
#[derive(Debug, thiserror::Error)]
pub enum HubmuxError {
    // === IO Errors ===

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to read file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write file {path}: {source}")]
    FileWrite {
        path: PathBuf,
        source: std::io::Error,
    },

    // === Connection Errors ===

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Connection timeout after {millis}ms")]
    ConnectionTimeout { millis: u64 },

    #[error("Connection closed unexpectedly")]
    ConnectionClosed,

    #[error("Hub not reachable at {url}")]
    HubUnreachable { url: String },

    // === Protocol Errors ===

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    // === Control API Errors ===

    #[error("Hub API {status}: {body}")]
    Api { status: u16, body: String },

    #[error("HTTP request failed: {0}")]
    Http(String),

    // === Configuration Errors ===

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration at {path}: {message}")]
    ConfigInvalid { path: PathBuf, message: String },

    // === Session Errors ===

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    // === Internal Errors ===

    #[error("Internal error: {0}")]
    Internal(String),
}

impl HubmuxError {
    /// Create a connection error
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Create a protocol error
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an HTTP transport error
    pub fn http(msg: impl Into<String>) -> Self {
        Self::Http(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Check if this error is retryable
    ///
    /// Control API failures are deliberately excluded: retry policy for
    /// those belongs to the caller.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ConnectionTimeout { .. }
                | Self::Connection(_)
                | Self::ConnectionClosed
                | Self::HubUnreachable { .. }
        )
    }

    /// HTTP status for control API failures
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Result type alias using HubmuxError
pub type Result<T> = std::result::Result<T, HubmuxError>;

#[cfg(test)]
mod tests {
    use super::*;

    // ==================== Display Tests ====================

    #[test]
    fn test_error_display() {
        let err = HubmuxError::SessionNotFound("qa".into());
        assert_eq!(err.to_string(), "Session not found: qa");
    }

    #[test]
    fn test_error_display_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err = HubmuxError::Io(io_err);
        assert!(err.to_string().contains("IO error"));
    }

    #[test]
    fn test_error_display_file_read() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "permission denied");
        let err = HubmuxError::FileRead {
            path: PathBuf::from("/etc/hubmux.toml"),
            source: io_err,
        };
        let msg = err.to_string();
        assert!(msg.contains("Failed to read file"));
        assert!(msg.contains("/etc/hubmux.toml"));
    }

    #[test]
    fn test_error_display_connection_timeout() {
        let err = HubmuxError::ConnectionTimeout { millis: 5000 };
        assert_eq!(err.to_string(), "Connection timeout after 5000ms");
    }

    #[test]
    fn test_error_display_api() {
        let err = HubmuxError::Api {
            status: 404,
            body: "Agent not found: zz".into(),
        };
        assert_eq!(err.to_string(), "Hub API 404: Agent not found: zz");
        assert_eq!(err.status(), Some(404));
    }

    #[test]
    fn test_error_display_hub_unreachable() {
        let err = HubmuxError::HubUnreachable {
            url: "http://localhost:9000".into(),
        };
        assert_eq!(err.to_string(), "Hub not reachable at http://localhost:9000");
    }

    #[test]
    fn test_error_display_config_invalid() {
        let err = HubmuxError::ConfigInvalid {
            path: PathBuf::from("/home/user/.config/hubmux/config.toml"),
            message: "base_ms must be positive".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("Invalid configuration"));
        assert!(msg.contains("config.toml"));
        assert!(msg.contains("base_ms must be positive"));
    }

    // ==================== Retryable Tests ====================

    #[test]
    fn test_retryable() {
        assert!(HubmuxError::ConnectionTimeout { millis: 100 }.is_retryable());
        assert!(HubmuxError::connection("refused").is_retryable());
        assert!(HubmuxError::ConnectionClosed.is_retryable());
    }

    #[test]
    fn test_not_retryable_errors() {
        let non_retryable = [
            HubmuxError::SessionNotFound("test".into()),
            HubmuxError::Api {
                status: 503,
                body: String::new(),
            },
            HubmuxError::http("dns"),
            HubmuxError::protocol("bad frame"),
            HubmuxError::InvalidMessage("bad".into()),
            HubmuxError::config("bad"),
            HubmuxError::internal("oops"),
        ];

        for err in non_retryable {
            assert!(!err.is_retryable(), "Expected {:?} to NOT be retryable", err);
        }
    }

    #[test]
    fn test_status_only_for_api_errors() {
        assert_eq!(HubmuxError::http("reset").status(), None);
        assert_eq!(HubmuxError::ConnectionClosed.status(), None);
    }

    // ==================== From Trait Tests ====================

    #[test]
    fn test_from_io_error_preserves_kind() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: HubmuxError = io_err.into();
        if let HubmuxError::Io(inner) = err {
            assert_eq!(inner.kind(), std::io::ErrorKind::PermissionDenied);
        } else {
            panic!("Expected Io variant");
        }
    }

    // ==================== Helper Function Tests ====================

    #[test]
    fn test_helpers() {
        assert!(matches!(HubmuxError::connection("x"), HubmuxError::Connection(_)));
        assert!(matches!(HubmuxError::protocol("x"), HubmuxError::Protocol(_)));
        assert!(matches!(HubmuxError::config("x"), HubmuxError::Config(_)));
        assert!(matches!(HubmuxError::http("x"), HubmuxError::Http(_)));
        assert_eq!(
            HubmuxError::internal("invariant violated").to_string(),
            "Internal error: invariant violated"
        );
    }
}
