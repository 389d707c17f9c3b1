//! MCP Manager for multi-server lifecycle management.
//!
//! The [`McpManager`] owns one [`McpClient`] per configured server. It
//! connects them in parallel, discovers each server's tools, exposes them
//! under namespaced names, and routes tool calls to the owning server.
//!
//! # Example
//!
//! ```rust,ignore
//! use tooldock_mcp::{McpManager, McpServerConfig};
//!
//! let manager = McpManager::new();
//! manager.add_server(McpServerConfig::new("sqlite", "mcp-server-sqlite")
//!     .with_arg("--db")
//!     .with_arg("/path/to/db.sqlite"));
//!
//! manager.connect_all().await;
//! for tool in manager.list_tools() {
//!     println!("{}", tool.name);
//! }
//!
//! let output = manager.call_tool("mcp_sqlite_query", Some(args)).await?;
//! manager.shutdown().await;
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;
use tooldock_config::{DEFAULT_TOOL_PREFIX, McpConfig};

use crate::client::{ClientOptions, McpClient};
use crate::config::McpServerConfig;
use crate::error::{McpError, Result, ToolCallError};
use crate::tool::{McpTool, ToolDescriptor, ToolOutput};
use crate::transport::{self, Transport};

/// Connection state of a server, as shown in status output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerState {
    /// No connection has succeeded yet.
    NeverConnected,
    /// Connected and ready.
    Connected,
    /// Was connected; the connection has since been lost.
    Lost,
    /// Shut down by the manager.
    ShutDown,
}

impl std::fmt::Display for ServerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::NeverConnected => "never connected",
            Self::Connected => "connected",
            Self::Lost => "connection lost",
            Self::ShutDown => "shut down",
        };
        f.write_str(s)
    }
}

/// Per-server status.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServerStatus {
    /// Whether requests can be sent right now.
    pub connected: bool,
    /// Last connection or discovery error.
    pub error: Option<String>,
    /// Number of tools registered for this server.
    pub tools_count: usize,
    /// Finer-grained connection state.
    pub state: ServerState,
    /// Transport in use.
    pub transport: String,
    /// Whether the last health check failed.
    pub degraded: bool,
    /// Last tool invocation failure on this server.
    pub last_tool_error: Option<String>,
}

struct ServerConnection {
    config: McpServerConfig,
    transport: Option<Arc<dyn Transport>>,
    client: Option<Arc<McpClient>>,
    ever_connected: bool,
    shut_down: bool,
    error: Option<String>,
    last_tool_error: Option<String>,
    tools: Vec<String>,
}

impl ServerConnection {
    fn new(config: McpServerConfig, transport: Option<Arc<dyn Transport>>) -> Self {
        Self {
            config,
            transport,
            client: None,
            ever_connected: false,
            shut_down: false,
            error: None,
            last_tool_error: None,
            tools: Vec::new(),
        }
    }

    fn is_connected(&self) -> bool {
        self.client.as_ref().is_some_and(|c| c.is_connected())
    }

    fn state(&self) -> ServerState {
        if self.shut_down {
            ServerState::ShutDown
        } else if self.is_connected() {
            ServerState::Connected
        } else if self.ever_connected {
            ServerState::Lost
        } else {
            ServerState::NeverConnected
        }
    }

    fn status(&self) -> ServerStatus {
        ServerStatus {
            connected: self.is_connected(),
            error: self.error.clone(),
            tools_count: self.tools.len(),
            state: self.state(),
            transport: self
                .transport
                .as_ref()
                .map(|t| t.kind().to_string())
                .unwrap_or_else(|| self.config.transport.to_string()),
            degraded: self.client.as_ref().is_some_and(|c| c.is_degraded()),
            last_tool_error: self.last_tool_error.clone(),
        }
    }
}

/// Manager for multiple MCP server connections.
///
/// All methods take `&self`; the manager can be shared behind an `Arc`.
/// Locks are never held across an `.await`.
pub struct McpManager {
    enabled: bool,
    prefix: String,
    options: ClientOptions,
    servers: RwLock<BTreeMap<String, ServerConnection>>,
    tools: RwLock<BTreeMap<String, McpTool>>,
    discovery: tokio::sync::Mutex<()>,
}

impl Default for McpManager {
    fn default() -> Self {
        Self::new()
    }
}

impl McpManager {
    /// Create an empty manager with default options.
    pub fn new() -> Self {
        Self::with_options(DEFAULT_TOOL_PREFIX, ClientOptions::default())
    }

    /// Create an empty manager.
    pub fn with_options(prefix: impl Into<String>, options: ClientOptions) -> Self {
        Self {
            enabled: true,
            prefix: prefix.into(),
            options,
            servers: RwLock::new(BTreeMap::new()),
            tools: RwLock::new(BTreeMap::new()),
            discovery: tokio::sync::Mutex::new(()),
        }
    }

    /// Create a manager for a loaded configuration. Disabled entries are
    /// skipped; a globally disabled config yields a manager that never
    /// connects anything.
    pub fn from_config(config: &McpConfig) -> Self {
        let options = ClientOptions::default()
            .with_request_timeout(Duration::from_secs(config.request_timeout_secs))
            .with_retries(config.connect_retries, Duration::from_secs(1))
            .with_health_check(
                (config.health_check_interval_secs > 0)
                    .then(|| Duration::from_secs(config.health_check_interval_secs)),
            );
        let mut manager = Self::with_options(config.tool_prefix.clone(), options);
        manager.enabled = config.enabled;

        for entry in config.enabled_servers() {
            manager.add_server(McpServerConfig::from(entry));
        }
        manager
    }

    /// Whether MCP integration is enabled.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Prefix used for namespaced tool names.
    pub fn tool_prefix(&self) -> &str {
        &self.prefix
    }

    /// Add a server configuration.
    ///
    /// The server will not be connected until [`connect_all`](Self::connect_all)
    /// or [`connect_server`](Self::connect_server) is called. A server with
    /// the same name is replaced.
    pub fn add_server(&self, config: McpServerConfig) {
        self.insert_server(config, None);
    }

    /// Add a server that talks over a caller-supplied transport.
    pub fn add_server_with_transport(&self, config: McpServerConfig, transport: Arc<dyn Transport>) {
        self.insert_server(config, Some(transport));
    }

    fn insert_server(&self, config: McpServerConfig, transport: Option<Arc<dyn Transport>>) {
        let name = config.name.clone();
        tracing::debug!(server = %name, "adding MCP server configuration");
        let previous = self
            .servers
            .write()
            .insert(name.clone(), ServerConnection::new(config, transport));
        if let Some(previous) = previous {
            self.drop_tools(&previous.tools);
            if let Some(client) = previous.client {
                spawn_shutdown(client);
            }
        }
    }

    /// Remove a server by name, shutting it down if connected.
    ///
    /// Returns true if the server was found and removed.
    pub async fn remove_server(&self, name: &str) -> bool {
        let Some(server) = self.servers.write().remove(name) else {
            return false;
        };
        self.drop_tools(&server.tools);
        if let Some(client) = server.client {
            tracing::info!(server = %name, "disconnecting MCP server");
            if let Err(e) = client.shutdown().await {
                tracing::debug!(server = %name, error = %e, "error shutting down client");
            }
        }
        true
    }

    /// Get the names of all configured servers.
    pub fn server_names(&self) -> Vec<String> {
        self.servers.read().keys().cloned().collect()
    }

    /// Check if a server is configured.
    pub fn has_server(&self, name: &str) -> bool {
        self.servers.read().contains_key(name)
    }

    /// Check if a server is connected.
    pub fn is_connected(&self, name: &str) -> bool {
        self.servers
            .read()
            .get(name)
            .is_some_and(ServerConnection::is_connected)
    }

    /// Get a server's client, if one has been created.
    pub fn get_client(&self, name: &str) -> Option<Arc<McpClient>> {
        self.servers.read().get(name).and_then(|s| s.client.clone())
    }

    /// Connect to all configured servers in parallel.
    ///
    /// A server that fails to connect records the error on its own status
    /// and does not affect the others. Returns the number of servers that
    /// are connected afterwards.
    pub async fn connect_all(&self) -> usize {
        if !self.enabled {
            tracing::info!("MCP integration disabled, not connecting");
            return 0;
        }

        let names = self.server_names();
        let total = names.len();
        let results =
            futures::future::join_all(names.iter().map(|name| self.connect_server(name))).await;
        let connected = results.iter().filter(|r| r.is_ok()).count();

        tracing::info!(connected, total, "MCP server connection complete");
        connected
    }

    /// Connect a single server and discover its tools.
    ///
    /// Already-connected servers are left alone. A discovery failure keeps
    /// the connection and is recorded as the server's error.
    pub async fn connect_server(&self, name: &str) -> Result<()> {
        if !self.enabled {
            return Err(McpError::protocol("MCP integration is disabled"));
        }

        let client = {
            let mut servers = self.servers.write();
            let server = servers
                .get_mut(name)
                .ok_or_else(|| McpError::protocol(format!("server '{}' not configured", name)))?;
            if server.is_connected() {
                return Ok(());
            }
            server.shut_down = false;
            match &server.client {
                Some(client) => Arc::clone(client),
                None => {
                    let client = match &server.transport {
                        Some(transport) => {
                            let mut options = self.options.clone();
                            if let Some(timeout) = server.config.timeout {
                                options.request_timeout = timeout;
                            }
                            McpClient::new(name, Arc::clone(transport), options)
                        }
                        None => match McpClient::from_config(&server.config, self.options.clone()) {
                            Ok(client) => client,
                            Err(e) => {
                                server.error = Some(e.to_string());
                                return Err(e);
                            }
                        },
                    };
                    let client = Arc::new(client);
                    server.client = Some(Arc::clone(&client));
                    client
                }
            }
        };

        if let Err(e) = client.connect().await {
            tracing::error!(server = %name, error = %e, "failed to connect to MCP server");
            if let Some(server) = self.servers.write().get_mut(name) {
                server.error = Some(e.to_string());
            }
            return Err(e);
        }

        if let Some(server) = self.servers.write().get_mut(name) {
            server.ever_connected = true;
            server.error = None;
        }
        tracing::info!(server = %name, "MCP server connected");

        if let Err(e) = self.refresh_tools(name).await {
            tracing::warn!(server = %name, error = %e, "tool discovery failed");
        }
        Ok(())
    }

    /// Rediscover a connected server's tools and rebuild its entries in the
    /// tool table. Returns the number of tools registered.
    ///
    /// Discovery passes are serialized.
    pub async fn refresh_tools(&self, name: &str) -> Result<usize> {
        let _guard = self.discovery.lock().await;

        let client = self
            .get_client(name)
            .filter(|c| c.is_connected())
            .ok_or(McpError::NotConnected)?;

        let infos = match client.list_tools().await {
            Ok(infos) => infos,
            Err(e) => {
                if let Some(server) = self.servers.write().get_mut(name) {
                    server.error = Some(format!("tool discovery failed: {}", e));
                }
                return Err(e);
            }
        };

        let mut servers = self.servers.write();
        let Some(server) = servers.get_mut(name) else {
            return Ok(0);
        };
        let mut tools = self.tools.write();
        for old in server.tools.drain(..) {
            tools.remove(&old);
        }

        for info in &infos {
            let mut descriptor = ToolDescriptor::new(&self.prefix, name, info);
            if tools.contains_key(&descriptor.name) {
                let unique = unique_name(&tools, &descriptor.name);
                tracing::warn!(
                    server = %name,
                    tool = %info.name,
                    renamed = %unique,
                    "namespaced tool name collides, renaming"
                );
                descriptor = descriptor.with_name(unique);
            }
            server.tools.push(descriptor.name.clone());
            tools.insert(
                descriptor.name.clone(),
                McpTool::new(descriptor, Arc::clone(&client)),
            );
        }

        tracing::info!(server = %name, tool_count = server.tools.len(), "registered MCP tools");
        Ok(server.tools.len())
    }

    fn drop_tools(&self, names: &[String]) {
        let mut tools = self.tools.write();
        for name in names {
            tools.remove(name);
        }
    }

    /// Descriptors for every registered tool, sorted by name.
    pub fn list_tools(&self) -> Vec<ToolDescriptor> {
        self.tools
            .read()
            .values()
            .map(|t| t.descriptor().clone())
            .collect()
    }

    /// Every registered tool handle, sorted by name.
    pub fn get_all_tools(&self) -> Vec<McpTool> {
        self.tools.read().values().cloned().collect()
    }

    /// Look up a tool by namespaced name.
    pub fn get_tool(&self, name: &str) -> Option<McpTool> {
        self.tools.read().get(name).cloned()
    }

    /// Number of registered tools.
    pub fn tool_count(&self) -> usize {
        self.tools.read().len()
    }

    /// Invoke a tool by namespaced name.
    ///
    /// Failures are structured: [`ToolCallError::NotFound`] for unknown
    /// names, [`ToolCallError::ServerUnavailable`] when the owning server
    /// cannot be reached, [`ToolCallError::Timeout`], and
    /// [`ToolCallError::Failed`] when the tool itself reports an error.
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: Option<Value>,
    ) -> std::result::Result<ToolOutput, ToolCallError> {
        let tool = self
            .get_tool(name)
            .ok_or_else(|| ToolCallError::NotFound(name.to_string()))?;

        let result = tool.call(arguments).await;
        if let Some(server) = self.servers.write().get_mut(tool.server()) {
            match &result {
                Ok(_) => server.last_tool_error = None,
                Err(e) => {
                    tracing::warn!(
                        server = %tool.server(),
                        tool = %name,
                        kind = e.kind(),
                        error = %e,
                        "MCP tool call failed"
                    );
                    server.last_tool_error = Some(e.to_string());
                    if matches!(e, ToolCallError::ServerUnavailable { .. })
                        && server.error.is_none()
                    {
                        server.error = Some(e.to_string());
                    }
                }
            }
        }
        result
    }

    /// Status of every configured server.
    pub fn get_status(&self) -> BTreeMap<String, ServerStatus> {
        self.servers
            .read()
            .iter()
            .map(|(name, server)| (name.clone(), server.status()))
            .collect()
    }

    /// Status of one server.
    pub fn server_status(&self, name: &str) -> Option<ServerStatus> {
        self.servers.read().get(name).map(ServerConnection::status)
    }

    /// Human-readable status report.
    pub fn status_report(&self) -> String {
        if !self.enabled {
            return "MCP integration is disabled. Set `enabled = true` in the server config to enable."
                .to_string();
        }

        let status = self.get_status();
        if status.is_empty() {
            return "No MCP servers configured.".to_string();
        }

        let mut lines = vec!["MCP Servers Status".to_string(), "=".repeat(40)];
        for (name, info) in &status {
            let mut line = format!(
                "  {} ({}): {}",
                name,
                info.transport,
                if info.connected {
                    "Connected"
                } else {
                    "Disconnected"
                }
            );
            if info.connected {
                line.push_str(&format!(" - {} tools", info.tools_count));
                if info.degraded {
                    line.push_str(" - health check failing");
                }
            } else if info.state != ServerState::NeverConnected {
                line.push_str(&format!(" - {}", info.state));
            }
            if let Some(error) = &info.error {
                line.push_str(&format!(" - Error: {}", error));
            }
            if let Some(error) = &info.last_tool_error {
                line.push_str(&format!(" - Last tool error: {}", error));
            }
            lines.push(line);
        }
        lines.join("\n")
    }

    /// One line per tool: name, owning server, and description.
    pub fn tool_descriptions(&self) -> String {
        let tools = self.list_tools();
        if tools.is_empty() {
            return "No MCP tools available.".to_string();
        }
        tools
            .iter()
            .map(|t| format!("- {}: {}", t.name, t.summary()))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Shut down every server. Configurations are kept so servers can be
    /// connected again.
    pub async fn shutdown(&self) {
        let clients: Vec<(String, Arc<McpClient>)> = {
            let mut servers = self.servers.write();
            tracing::info!(server_count = servers.len(), "shutting down all MCP servers");
            servers
                .iter_mut()
                .filter_map(|(name, server)| {
                    server.shut_down = true;
                    server.tools.clear();
                    server.client.take().map(|c| (name.clone(), c))
                })
                .collect()
        };
        self.tools.write().clear();

        let shutdowns = clients.iter().map(|(name, client)| async move {
            if let Err(e) = client.shutdown().await {
                tracing::debug!(server = %name, error = %e, "error shutting down client");
            }
        });
        futures::future::join_all(shutdowns).await;
    }
}

fn unique_name(tools: &BTreeMap<String, McpTool>, base: &str) -> String {
    (2..)
        .map(|n| format!("{}_{}", base, n))
        .find(|candidate| !tools.contains_key(candidate))
        .unwrap_or_else(|| base.to_string())
}

fn spawn_shutdown(client: Arc<McpClient>) {
    if let Ok(handle) = tokio::runtime::Handle::try_current() {
        handle.spawn(async move {
            let _ = client.shutdown().await;
        });
    }
}

impl std::fmt::Debug for McpManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpManager")
            .field("enabled", &self.enabled)
            .field("prefix", &self.prefix)
            .field("servers", &self.server_names())
            .field("tools", &self.tool_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::JsonRpcError;
    use crate::transport::{MemoryServer, MemoryTransport};
    use serde_json::json;
    use tooldock_config::McpServerEntry;

    fn quick_options() -> ClientOptions {
        ClientOptions::default()
            .with_request_timeout(Duration::from_secs(5))
            .with_retries(2, Duration::from_millis(10))
            .with_health_check(None)
    }

    /// Serve `tools` until the client goes away. Calling `fail` returns an
    /// `isError` result; calling `hang` drops the connection.
    fn serve(server: MemoryServer, tools: Vec<&'static str>) {
        tokio::spawn(async move {
            while let Some(req) = server.recv().await {
                let Some(id) = req.id.clone() else {
                    continue;
                };
                let params = req.params.clone().unwrap_or_default();
                match req.method.as_str() {
                    "initialize" => {
                        server.respond(id, json!({"serverInfo": {"name": "mem", "version": "1"}}));
                    }
                    "tools/list" => {
                        let list: Vec<_> = tools
                            .iter()
                            .map(|t| json!({"name": t, "description": format!("{t} tool")}))
                            .collect();
                        server.respond(id, json!({ "tools": list }));
                    }
                    "tools/call" => match params["name"].as_str() {
                        Some("fail") => {
                            server.respond(
                                id,
                                json!({"content": [{"type": "text", "text": "it broke"}], "isError": true}),
                            );
                        }
                        Some("hang") => server.hang_up(),
                        Some(other) => {
                            server.respond(
                                id,
                                json!({"content": [{"type": "text", "text": format!("ran {other}")}]}),
                            );
                        }
                        None => {
                            server.respond_error(id, JsonRpcError::INVALID_PARAMS, "missing name");
                        }
                    },
                    _ => {
                        server.respond_error(id, JsonRpcError::METHOD_NOT_FOUND, "unknown");
                    }
                }
            }
        });
    }

    fn manager_with(servers: Vec<(&str, Vec<&'static str>)>) -> McpManager {
        let manager = McpManager::with_options("mcp_", quick_options());
        for (name, tools) in servers {
            let (transport, server) = MemoryTransport::pair();
            serve(server, tools);
            manager.add_server_with_transport(McpServerConfig::new(name, "unused"), Arc::new(transport));
        }
        manager
    }

    #[test]
    fn test_new_manager_empty() {
        let manager = McpManager::new();
        assert!(manager.server_names().is_empty());
        assert_eq!(manager.tool_count(), 0);
        assert_eq!(manager.status_report(), "No MCP servers configured.");
    }

    #[test]
    fn test_from_config_skips_disabled_entries() {
        let config = McpConfig::default()
            .with_server(McpServerEntry::stdio("a", "cmd-a"))
            .with_server(McpServerEntry::stdio("b", "cmd-b").with_enabled(false));
        let manager = McpManager::from_config(&config);
        assert_eq!(manager.server_names(), vec!["a".to_string()]);
        assert_eq!(manager.tool_prefix(), "mcp_");
    }

    #[tokio::test]
    async fn test_disabled_config_connects_nothing() {
        let mut config = McpConfig::default().with_server(McpServerEntry::stdio("a", "cmd-a"));
        config.enabled = false;
        let manager = McpManager::from_config(&config);

        assert_eq!(manager.connect_all().await, 0);
        assert!(manager.status_report().contains("disabled"));
    }

    #[tokio::test]
    async fn test_connect_and_call() {
        let manager = manager_with(vec![("files", vec!["read", "fail"])]);
        assert_eq!(manager.connect_all().await, 1);

        let names: Vec<_> = manager.list_tools().into_iter().map(|t| t.name).collect();
        assert_eq!(names, vec!["mcp_files_fail", "mcp_files_read"]);

        let out = manager
            .call_tool("mcp_files_read", Some(json!({"path": "/tmp"})))
            .await
            .unwrap();
        assert_eq!(out.text, "ran read");

        let status = manager.get_status();
        assert!(status["files"].connected);
        assert_eq!(status["files"].tools_count, 2);
        assert_eq!(status["files"].error, None);
    }

    #[tokio::test]
    async fn test_call_tool_failures_are_distinguishable() {
        let manager = manager_with(vec![("svc", vec!["ok", "fail", "hang"])]);
        manager.connect_all().await;

        let err = manager.call_tool("mcp_svc_missing", None).await.unwrap_err();
        assert!(matches!(err, ToolCallError::NotFound(_)));
        assert_eq!(err.to_string(), "Tool 'mcp_svc_missing' not found");

        let err = manager.call_tool("mcp_svc_fail", None).await.unwrap_err();
        assert_eq!(err.kind(), "tool_error");
        assert!(err.to_string().contains("it broke"));
        assert!(manager.get_status()["svc"].last_tool_error.is_some());

        let err = manager.call_tool("mcp_svc_hang", None).await.unwrap_err();
        assert_eq!(err.kind(), "server_unavailable");

        let err = manager.call_tool("mcp_svc_ok", None).await.unwrap_err();
        assert_eq!(err.kind(), "server_unavailable");

        let status = manager.get_status();
        assert!(!status["svc"].connected);
        assert_eq!(status["svc"].state, ServerState::Lost);
    }

    #[tokio::test]
    async fn test_isolation_one_failing_server() {
        let manager = manager_with(vec![("good", vec!["search"])]);
        let (transport, server) = MemoryTransport::pair();
        server.refuse_connects(u32::MAX);
        manager.add_server_with_transport(McpServerConfig::new("bad", "unused"), Arc::new(transport));

        assert_eq!(manager.connect_all().await, 1);

        let status = manager.get_status();
        assert!(status["good"].connected);
        assert_eq!(status["good"].tools_count, 1);
        assert!(!status["bad"].connected);
        assert_eq!(status["bad"].state, ServerState::NeverConnected);
        assert!(status["bad"].error.as_deref().unwrap().contains("connection refused"));
        assert!(manager.get_tool("mcp_good_search").is_some());

        let report = manager.status_report();
        assert!(report.starts_with("MCP Servers Status\n========================================"));
        assert!(report.contains("  good (memory): Connected - 1 tools"));
        assert!(report.contains("  bad (memory): Disconnected - Error:"));
        drop(server);
    }

    #[tokio::test]
    async fn test_stdio_spawn_failure_is_recorded() {
        let manager = McpManager::with_options("mcp_", quick_options());
        manager.add_server(McpServerConfig::new("invalid", "nonexistent-command-12345"));

        assert_eq!(manager.connect_all().await, 0);
        assert!(!manager.is_connected("invalid"));
        let status = manager.server_status("invalid").unwrap();
        assert!(status.error.unwrap().contains("nonexistent-command-12345"));
        assert_eq!(status.transport, "stdio");
    }

    #[tokio::test]
    async fn test_same_tool_name_on_two_servers() {
        let manager = manager_with(vec![("web", vec!["search"]), ("docs", vec!["search"])]);
        assert_eq!(manager.connect_all().await, 2);

        assert!(manager.get_tool("mcp_web_search").is_some());
        assert!(manager.get_tool("mcp_docs_search").is_some());

        let out = manager.call_tool("mcp_docs_search", None).await.unwrap();
        assert_eq!(out.text, "ran search");
        assert_eq!(manager.get_tool("mcp_docs_search").unwrap().server(), "docs");
    }

    #[tokio::test]
    async fn test_namespace_collision_gets_suffix() {
        // "a_b" + "c" and "a" + "b_c" both namespace to mcp_a_b_c.
        let manager = manager_with(vec![("a_b", vec!["c"]), ("a", vec!["b_c"])]);
        manager.connect_all().await;

        let names: Vec<_> = manager.list_tools().into_iter().map(|t| t.name).collect();
        assert_eq!(names.len(), 2);
        assert!(names.contains(&"mcp_a_b_c".to_string()));
        assert!(names.contains(&"mcp_a_b_c_2".to_string()));
    }

    #[tokio::test]
    async fn test_refresh_replaces_server_tools() {
        let manager = manager_with(vec![("one", vec!["x", "y"])]);
        manager.connect_all().await;
        assert_eq!(manager.refresh_tools("one").await.unwrap(), 2);
        assert_eq!(manager.tool_count(), 2);

        assert!(matches!(
            manager.refresh_tools("absent").await,
            Err(McpError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_tool_descriptions() {
        let manager = manager_with(vec![("git", vec!["log"])]);
        assert_eq!(manager.tool_descriptions(), "No MCP tools available.");
        manager.connect_all().await;
        assert_eq!(manager.tool_descriptions(), "- mcp_git_log: [git] log tool");
    }

    #[tokio::test]
    async fn test_shutdown_and_remove() {
        let manager = manager_with(vec![("a", vec!["t"]), ("b", vec!["t"])]);
        manager.connect_all().await;

        assert!(manager.remove_server("b").await);
        assert!(!manager.remove_server("b").await);
        assert!(manager.get_tool("mcp_b_t").is_none());

        manager.shutdown().await;
        assert_eq!(manager.tool_count(), 0);
        let status = manager.get_status();
        assert_eq!(status["a"].state, ServerState::ShutDown);
        assert!(!status["a"].connected);
        assert!(manager.has_server("a"));
    }

    #[test]
    fn test_debug_format() {
        let manager = McpManager::new();
        manager.add_server(McpServerConfig::new("test", "cmd"));
        let debug = format!("{:?}", manager);
        assert!(debug.contains("McpManager"));
        assert!(debug.contains("test"));
    }
}
