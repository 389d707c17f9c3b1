//! Per-server connection settings.

use std::time::Duration;

use tooldock_config::McpServerEntry;

use crate::error::{McpError, Result};
use crate::transport::HttpTransportConfig;

pub use tooldock_config::McpTransportType as TransportType;

/// Configuration for an MCP server connection.
#[derive(Debug, Clone)]
pub struct McpServerConfig {
    /// Unique name for this server.
    pub name: String,
    /// Transport type.
    pub transport: TransportType,
    /// Command to spawn (stdio).
    pub command: String,
    /// Arguments to pass to the command.
    pub args: Vec<String>,
    /// Environment variables added to the inherited environment.
    pub env: Vec<(String, String)>,
    /// Server URL (http, sse).
    pub url: Option<String>,
    /// HTTP headers (http, sse).
    pub headers: Vec<(String, String)>,
    /// Request timeout; the manager's default applies when unset.
    pub timeout: Option<Duration>,
    /// HTTP POST retries.
    pub retries: Option<u32>,
}

impl McpServerConfig {
    /// Create a new server config for stdio transport.
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self::base(name, TransportType::Stdio, command.into(), None)
    }

    /// Create a new server config for HTTP transport.
    pub fn http(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self::base(name, TransportType::Http, String::new(), Some(url.into()))
    }

    /// Create a new server config for SSE transport.
    pub fn sse(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self::base(name, TransportType::Sse, String::new(), Some(url.into()))
    }

    fn base(
        name: impl Into<String>,
        transport: TransportType,
        command: String,
        url: Option<String>,
    ) -> Self {
        Self {
            name: name.into(),
            transport,
            command,
            args: Vec::new(),
            env: Vec::new(),
            url,
            headers: Vec::new(),
            timeout: None,
            retries: None,
        }
    }

    /// Add an argument.
    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Add an environment variable.
    pub fn with_env_var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Add an HTTP header.
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }

    /// Set the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the number of HTTP retries.
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = Some(retries);
        self
    }

    /// HTTP settings for the remote transports.
    pub fn http_config(&self) -> Result<HttpTransportConfig> {
        let url = self.url.as_deref().ok_or_else(|| {
            McpError::transport(format!("{} transport requires a URL", self.transport))
        })?;

        let mut config = HttpTransportConfig::new(url);
        if let Some(timeout) = self.timeout {
            config = config.with_timeout(timeout);
        }
        if let Some(retries) = self.retries {
            config = config.with_retries(retries);
        }
        for (key, value) in &self.headers {
            config = config.with_header(key, value);
        }
        Ok(config)
    }
}

impl From<&McpServerEntry> for McpServerConfig {
    fn from(entry: &McpServerEntry) -> Self {
        Self {
            name: entry.name.clone(),
            transport: entry.transport,
            command: entry.command.clone(),
            args: entry.args.clone(),
            env: entry
                .env
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            url: entry.url.clone(),
            headers: entry
                .headers
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            timeout: entry.timeout_secs.map(Duration::from_secs),
            retries: entry.retries,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_config_builder() {
        let config = McpServerConfig::new("test", "mcp-server-test")
            .with_arg("--db")
            .with_arg("/path/to/db")
            .with_env_var("DEBUG", "1");

        assert_eq!(config.name, "test");
        assert_eq!(config.command, "mcp-server-test");
        assert_eq!(config.args, vec!["--db", "/path/to/db"]);
        assert_eq!(config.env, vec![("DEBUG".to_string(), "1".to_string())]);
        assert_eq!(config.transport, TransportType::Stdio);
    }

    #[test]
    fn test_http_config_from_server_config() {
        let config = McpServerConfig::sse("remote", "https://mcp.example.com/sse")
            .with_header("Authorization", "Bearer token123")
            .with_timeout(Duration::from_secs(60))
            .with_retries(5);

        let http = config.http_config().unwrap();
        assert_eq!(http.url, "https://mcp.example.com/sse");
        assert_eq!(http.timeout, Duration::from_secs(60));
        assert_eq!(http.retries, 5);
        assert_eq!(http.headers.len(), 1);
    }

    #[test]
    fn test_http_config_requires_url() {
        let mut config = McpServerConfig::new("test", "cmd");
        config.transport = TransportType::Http;
        let err = config.http_config().unwrap_err();
        assert!(err.to_string().contains("http transport requires a URL"));
    }

    #[test]
    fn test_from_entry() {
        let entry = McpServerEntry::http("web", "http://localhost:8080/mcp")
            .with_header("X-Key", "k")
            .with_timeout_secs(7);
        let config = McpServerConfig::from(&entry);
        assert_eq!(config.transport, TransportType::Http);
        assert_eq!(config.headers, vec![("X-Key".into(), "k".into())]);
        assert_eq!(config.timeout, Some(Duration::from_secs(7)));
    }
}
