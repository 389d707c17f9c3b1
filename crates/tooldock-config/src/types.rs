//! Configuration types for tool servers.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

/// Default prefix for namespaced tool names.
pub const DEFAULT_TOOL_PREFIX: &str = "mcp_";

// ─────────────────────────────────────────────────────────────────────────────
// Top-level Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Configuration for every tool server the manager supervises.
///
/// ```json
/// {
///   "servers": [
///     { "name": "files", "command": "mcp-server-filesystem", "args": ["/tmp"] },
///     { "name": "search", "transport": "sse", "url": "http://localhost:8931/sse" }
///   ]
/// }
/// ```
///
/// The same shape is accepted as TOML:
///
/// ```toml
/// tool_prefix = "mcp_"
///
/// [[servers]]
/// name = "files"
/// command = "mcp-server-filesystem"
/// args = ["/tmp"]
/// env = { DEBUG = "1" }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct McpConfig {
    /// Whether tool servers are enabled at all.
    pub enabled: bool,
    /// Prefix prepended to every namespaced tool name.
    pub tool_prefix: String,
    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,
    /// Seconds between health checks of a connected server.
    pub health_check_interval_secs: u64,
    /// Connection attempts before a server is given up on.
    pub connect_retries: u32,
    /// Configured servers.
    pub servers: Vec<McpServerEntry>,
}

impl Default for McpConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            tool_prefix: DEFAULT_TOOL_PREFIX.to_string(),
            request_timeout_secs: 30,
            health_check_interval_secs: 60,
            connect_retries: 3,
            servers: Vec::new(),
        }
    }
}

impl McpConfig {
    /// Parse a JSON document.
    pub fn from_json(contents: &str) -> Result<Self> {
        Ok(serde_json::from_str(contents)?)
    }

    /// Parse a TOML document.
    pub fn from_toml(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Add a server entry.
    pub fn with_server(mut self, entry: McpServerEntry) -> Self {
        self.servers.push(entry);
        self
    }

    /// Set the tool name prefix.
    pub fn with_tool_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.tool_prefix = prefix.into();
        self
    }

    /// Servers that should be connected.
    ///
    /// Empty when the configuration is globally disabled.
    pub fn enabled_servers(&self) -> impl Iterator<Item = &McpServerEntry> {
        self.servers
            .iter()
            .filter(move |s| self.enabled && s.enabled)
    }

    /// Look up a server entry by name.
    pub fn server(&self, name: &str) -> Option<&McpServerEntry> {
        self.servers.iter().find(|s| s.name == name)
    }

    /// Check names are unique and each entry has what its transport needs.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for entry in &self.servers {
            entry.validate()?;
            if !seen.insert(entry.name.as_str()) {
                return Err(ConfigError::DuplicateServer(entry.name.clone()));
            }
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Server Entries
// ─────────────────────────────────────────────────────────────────────────────

/// Transport used to reach a server.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum McpTransportType {
    /// Spawn a subprocess and speak over its stdin/stdout.
    #[default]
    Stdio,
    /// POST each request to a URL.
    Http,
    /// Hold a Server-Sent-Events stream open and POST to the endpoint it announces.
    Sse,
}

impl McpTransportType {
    /// Lowercase name as it appears in config files.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stdio => "stdio",
            Self::Http => "http",
            Self::Sse => "sse",
        }
    }

    /// Whether this transport needs a URL rather than a command.
    pub fn is_remote(&self) -> bool {
        !matches!(self, Self::Stdio)
    }
}

impl std::fmt::Display for McpTransportType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration for a single server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct McpServerEntry {
    /// Unique name, used in tool namespacing.
    pub name: String,
    /// Transport type. Defaults to stdio.
    #[serde(default)]
    pub transport: McpTransportType,
    /// Command to execute (stdio).
    #[serde(default)]
    pub command: String,
    /// Arguments to pass to the command (stdio).
    #[serde(default)]
    pub args: Vec<String>,
    /// Extra environment variables, added to the inherited environment (stdio).
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// Server URL (http, sse).
    #[serde(default)]
    pub url: Option<String>,
    /// Extra HTTP headers (http, sse).
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Request timeout in seconds; overrides the global value.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    /// HTTP POST retries (http, sse).
    #[serde(default)]
    pub retries: Option<u32>,
    /// Whether this server is enabled. Defaults to true.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl McpServerEntry {
    /// Create an entry for a stdio server.
    pub fn stdio(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self::with_transport(name, McpTransportType::Stdio, command.into(), None)
    }

    /// Create an entry for an HTTP server.
    pub fn http(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self::with_transport(name, McpTransportType::Http, String::new(), Some(url.into()))
    }

    /// Create an entry for an SSE server.
    pub fn sse(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self::with_transport(name, McpTransportType::Sse, String::new(), Some(url.into()))
    }

    fn with_transport(
        name: impl Into<String>,
        transport: McpTransportType,
        command: String,
        url: Option<String>,
    ) -> Self {
        Self {
            name: name.into(),
            transport,
            command,
            args: Vec::new(),
            env: BTreeMap::new(),
            url,
            headers: BTreeMap::new(),
            timeout_secs: None,
            retries: None,
            enabled: true,
        }
    }

    /// Add an argument.
    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Add an environment variable.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Add an HTTP header.
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Set the request timeout in seconds.
    pub fn with_timeout_secs(mut self, timeout: u64) -> Self {
        self.timeout_secs = Some(timeout);
        self
    }

    /// Set the number of HTTP retries.
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = Some(retries);
        self
    }

    /// Set enabled state.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Check the entry carries what its transport needs.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::invalid("<unnamed>", "server name is empty"));
        }
        if self.transport.is_remote() {
            if self.url.as_deref().is_none_or(|u| u.trim().is_empty()) {
                return Err(ConfigError::invalid(
                    &self.name,
                    format!("{} transport requires a url", self.transport),
                ));
            }
        } else if self.command.trim().is_empty() {
            return Err(ConfigError::invalid(
                &self.name,
                "stdio transport requires a command",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = McpConfig::default();
        assert!(cfg.enabled);
        assert_eq!(cfg.tool_prefix, "mcp_");
        assert_eq!(cfg.request_timeout_secs, 30);
        assert_eq!(cfg.health_check_interval_secs, 60);
        assert_eq!(cfg.connect_retries, 3);
        assert!(cfg.servers.is_empty());
    }

    #[test]
    fn test_parse_json() {
        let cfg = McpConfig::from_json(
            r#"{
                "servers": [
                    {"name": "files", "command": "fs-server", "args": ["/tmp"], "env": {"DEBUG": "1"}},
                    {"name": "web", "transport": "sse", "url": "http://localhost:9000/sse", "enabled": false}
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(cfg.servers.len(), 2);
        let files = cfg.server("files").unwrap();
        assert_eq!(files.transport, McpTransportType::Stdio);
        assert_eq!(files.args, vec!["/tmp"]);
        assert_eq!(files.env.get("DEBUG").map(String::as_str), Some("1"));
        assert!(files.enabled);

        let web = cfg.server("web").unwrap();
        assert_eq!(web.transport, McpTransportType::Sse);
        assert!(!web.enabled);
        assert_eq!(cfg.tool_prefix, "mcp_");
    }

    #[test]
    fn test_parse_toml() {
        let cfg = McpConfig::from_toml(
            r#"
            tool_prefix = "ext_"
            request_timeout_secs = 10

            [[servers]]
            name = "remote"
            transport = "http"
            url = "https://tools.example.com/mcp"
            headers = { Authorization = "Bearer abc" }
            retries = 1
            "#,
        )
        .unwrap();

        assert_eq!(cfg.tool_prefix, "ext_");
        assert_eq!(cfg.request_timeout_secs, 10);
        let remote = &cfg.servers[0];
        assert!(remote.transport.is_remote());
        assert_eq!(remote.retries, Some(1));
        assert_eq!(
            remote.headers.get("Authorization").map(String::as_str),
            Some("Bearer abc")
        );
    }

    #[test]
    fn test_enabled_servers_respects_global_switch() {
        let mut cfg = McpConfig::default()
            .with_server(McpServerEntry::stdio("a", "cmd"))
            .with_server(McpServerEntry::stdio("b", "cmd").with_enabled(false));
        assert_eq!(cfg.enabled_servers().count(), 1);

        cfg.enabled = false;
        assert_eq!(cfg.enabled_servers().count(), 0);
    }

    #[test]
    fn test_validate_duplicate_names() {
        let cfg = McpConfig::default()
            .with_server(McpServerEntry::stdio("a", "cmd"))
            .with_server(McpServerEntry::http("a", "http://localhost"));
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::DuplicateServer(name)) if name == "a"
        ));
    }

    #[test]
    fn test_validate_transport_requirements() {
        assert!(McpServerEntry::stdio("a", "").validate().is_err());
        assert!(McpServerEntry::stdio("a", "cmd").validate().is_ok());

        let mut sse = McpServerEntry::sse("b", "http://localhost/sse");
        assert!(sse.validate().is_ok());
        sse.url = None;
        let err = sse.validate().unwrap_err();
        assert!(err.to_string().contains("sse transport requires a url"));

        assert!(McpServerEntry::stdio(" ", "cmd").validate().is_err());
    }

    #[test]
    fn test_entry_builder() {
        let entry = McpServerEntry::stdio("sqlite", "mcp-server-sqlite")
            .with_arg("--db")
            .with_arg("/tmp/db.sqlite")
            .with_env("DEBUG", "1")
            .with_timeout_secs(5);

        assert_eq!(entry.args, vec!["--db", "/tmp/db.sqlite"]);
        assert_eq!(entry.env.len(), 1);
        assert_eq!(entry.timeout_secs, Some(5));
        assert_eq!(entry.transport.to_string(), "stdio");
    }
}
