//! MCP (Model Context Protocol) client and multi-server manager.
//!
//! This crate connects to any number of MCP servers, discovers their tools,
//! exposes them under collision-free names, and routes tool calls to the
//! owning server.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  McpManager / SyncMcpManager                                │
//! │  - Parallel, isolated connects                              │
//! │  - Tool table keyed by <prefix><server>_<tool>              │
//! │  - call_tool, get_status, status_report                     │
//! └─────────────────────────────────────────────────────────────┘
//!                           │ one per server
//!                           ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  McpClient                                                  │
//! │  - initialize / notifications/initialized handshake         │
//! │  - Pending table correlates replies by id                   │
//! │  - Receive loop, notification handlers, health check        │
//! └─────────────────────────────────────────────────────────────┘
//!                           │
//!                           ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Transport                                                  │
//! │  - Stdio: subprocess, Content-Length framing                │
//! │  - Http: POST per message                                   │
//! │  - Sse: event stream (own thread) + POST endpoint           │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use tooldock_mcp::{McpManager, McpServerConfig};
//!
//! let manager = McpManager::new();
//! manager.add_server(McpServerConfig::new("sqlite", "mcp-server-sqlite")
//!     .with_arg("--db")
//!     .with_arg("/path/to/database.db"));
//! manager.add_server(McpServerConfig::http("search", "http://localhost:8080/mcp"));
//!
//! manager.connect_all().await;
//! println!("{}", manager.status_report());
//!
//! let output = manager
//!     .call_tool("mcp_sqlite_query", Some(json!({"sql": "SELECT * FROM users"})))
//!     .await?;
//! println!("{}", output.text);
//! ```
//!
//! # MCP Protocol
//!
//! Stdio servers exchange JSON-RPC 2.0 with Content-Length framing:
//!
//! ```text
//! Content-Length: <length>\r\n
//! \r\n
//! {"jsonrpc": "2.0", "id": 1, "method": "...", "params": {...}}
//! ```
//!
//! Header-less, newline-delimited JSON is accepted on input as well.
//!
//! The protocol flow is:
//! 1. Client sends `initialize` with capabilities
//! 2. Server responds with its capabilities
//! 3. Client sends `notifications/initialized`
//! 4. Client can now call `tools/list` and `tools/call`

pub mod blocking;
pub mod client;
pub mod codec;
pub mod config;
pub mod error;
pub mod manager;
pub mod pending;
pub mod protocol;
pub mod tool;
pub mod transport;

// Re-export main types
pub use blocking::{SyncError, SyncMcpManager};
pub use client::{ClientOptions, ConnectionState, McpClient};
pub use config::{McpServerConfig, TransportType};
pub use error::{McpError, Result, ToolCallError};
pub use manager::{McpManager, ServerState, ServerStatus};
pub use protocol::{
    CallToolParams, CallToolResult, InitializeParams, InitializeResult, JsonRpcError,
    JsonRpcMessage, JsonRpcRequest, ListToolsResult, RequestId, ServerCapabilities, ServerInfo,
    ToolContent, ToolInfo,
};
pub use tool::{McpTool, ToolDescriptor, ToolOutput};
pub use transport::{
    HttpTransport, HttpTransportConfig, MemoryServer, MemoryTransport, SseTransport,
    StdioTransport, Transport, TransportKind,
};
