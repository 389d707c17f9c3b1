//! Error types for MCP operations.

use std::time::Duration;

use thiserror::Error;

/// Result type for MCP operations.
pub type Result<T> = std::result::Result<T, McpError>;

/// Error type for MCP operations.
#[derive(Debug, Clone, Error)]
pub enum McpError {
    /// Failed to spawn the server process.
    #[error("failed to spawn MCP server: {0}")]
    SpawnFailed(String),

    /// The transport could not reach the server or lost it.
    #[error("transport error: {0}")]
    Transport(String),

    /// Every connection attempt failed.
    #[error("failed to connect to '{server}' after {attempts} attempt(s): {reason}")]
    ConnectFailed {
        /// Server name.
        server: String,
        /// Attempts made.
        attempts: u32,
        /// Error from the last attempt.
        reason: String,
    },

    /// A malformed message or an unexpected reply shape.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(String),

    /// Server returned an error response.
    #[error("server error {code}: {message}")]
    ServerError {
        /// Error code from the server.
        code: i64,
        /// Error message from the server.
        message: String,
        /// Optional additional data.
        data: Option<serde_json::Value>,
    },

    /// No reply arrived within the request timeout.
    #[error("timeout after {timeout:?} waiting for response to '{method}'")]
    Timeout {
        /// Method that timed out.
        method: String,
        /// Timeout that elapsed.
        timeout: Duration,
    },

    /// The client has not completed its handshake.
    #[error("client not connected - call connect() first")]
    NotConnected,

    /// Connection closed while the request was outstanding.
    #[error("connection closed")]
    ConnectionClosed,
}

impl From<serde_json::Error> for McpError {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(e.to_string())
    }
}

impl From<std::io::Error> for McpError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

impl McpError {
    /// Create a spawn failed error.
    pub fn spawn_failed(msg: impl Into<String>) -> Self {
        Self::SpawnFailed(msg.into())
    }

    /// Create a transport error.
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Create a protocol error.
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    /// Create a server error from an error response.
    pub fn server_error(
        code: i64,
        message: impl Into<String>,
        data: Option<serde_json::Value>,
    ) -> Self {
        Self::ServerError {
            code,
            message: message.into(),
            data,
        }
    }

    /// Create a timeout error.
    pub fn timeout(method: impl Into<String>, timeout: Duration) -> Self {
        Self::Timeout {
            method: method.into(),
            timeout,
        }
    }

    /// Whether the request ran out of time.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Whether the server is unreachable, as opposed to answering with an error.
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::SpawnFailed(_)
                | Self::Transport(_)
                | Self::ConnectFailed { .. }
                | Self::Io(_)
                | Self::NotConnected
                | Self::ConnectionClosed
        )
    }
}

/// Structured failure from [`McpManager::call_tool`](crate::McpManager::call_tool).
#[derive(Debug, Clone, Error)]
pub enum ToolCallError {
    /// No tool is registered under this name.
    #[error("Tool '{0}' not found")]
    NotFound(String),

    /// The owning server cannot be reached.
    #[error("server '{server}' unavailable: {reason}")]
    ServerUnavailable {
        /// Owning server.
        server: String,
        /// Why the call could not be delivered.
        reason: String,
    },

    /// The server did not answer in time.
    #[error("tool '{tool}' timed out after {timeout:?}")]
    Timeout {
        /// Namespaced tool name.
        tool: String,
        /// Timeout that elapsed.
        timeout: Duration,
    },

    /// The tool ran and reported a failure, or the server rejected the call.
    #[error("tool '{tool}' failed: {message}")]
    Failed {
        /// Namespaced tool name.
        tool: String,
        /// JSON-RPC error code, if the server rejected the call.
        code: Option<i64>,
        /// Failure text.
        message: String,
    },
}

impl ToolCallError {
    /// Short machine-readable kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::ServerUnavailable { .. } => "server_unavailable",
            Self::Timeout { .. } => "timeout",
            Self::Failed { .. } => "tool_error",
        }
    }

    /// Classify a client error raised while calling `tool` on `server`.
    pub fn from_mcp(tool: &str, server: &str, err: McpError) -> Self {
        match err {
            McpError::Timeout { timeout, .. } => Self::Timeout {
                tool: tool.to_string(),
                timeout,
            },
            McpError::ServerError { code, message, .. } => Self::Failed {
                tool: tool.to_string(),
                code: Some(code),
                message,
            },
            e if e.is_connection_error() => Self::ServerUnavailable {
                server: server.to_string(),
                reason: e.to_string(),
            },
            e => Self::Failed {
                tool: tool.to_string(),
                code: None,
                message: e.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = McpError::spawn_failed("command not found");
        assert!(err.to_string().contains("spawn"));
        assert!(err.to_string().contains("command not found"));

        let err = McpError::server_error(-32600, "Invalid Request", None);
        assert!(err.to_string().contains("-32600"));
        assert!(err.to_string().contains("Invalid Request"));

        let err = McpError::timeout("tools/call", Duration::from_millis(200));
        assert!(err.to_string().contains("tools/call"));
    }

    #[test]
    fn test_json_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("invalid json").unwrap_err();
        let mcp_err: McpError = json_err.into();
        assert!(matches!(mcp_err, McpError::Json(_)));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let mcp_err: McpError = io_err.into();
        assert!(matches!(mcp_err, McpError::Io(_)));
        assert!(mcp_err.is_connection_error());
    }

    #[test]
    fn test_timeout_is_not_connection_error() {
        let err = McpError::timeout("ping", Duration::from_secs(1));
        assert!(err.is_timeout());
        assert!(!err.is_connection_error());

        let err = McpError::ConnectFailed {
            server: "a".into(),
            attempts: 3,
            reason: "refused".into(),
        };
        assert!(err.is_connection_error());
        assert!(!err.is_timeout());
    }

    #[test]
    fn test_tool_call_error_classification() {
        let e = ToolCallError::from_mcp("mcp_a_x", "a", McpError::ConnectionClosed);
        assert_eq!(e.kind(), "server_unavailable");

        let e = ToolCallError::from_mcp(
            "mcp_a_x",
            "a",
            McpError::timeout("tools/call", Duration::from_secs(1)),
        );
        assert_eq!(e.kind(), "timeout");

        let e = ToolCallError::from_mcp(
            "mcp_a_x",
            "a",
            McpError::server_error(-32602, "bad params", None),
        );
        assert!(matches!(e, ToolCallError::Failed { code: Some(-32602), .. }));

        assert_eq!(
            ToolCallError::NotFound("mcp_b".into()).to_string(),
            "Tool 'mcp_b' not found"
        );
    }
}
