//! CLI command handlers.

pub mod call;
pub mod servers;
pub mod status;
pub mod tools;

use std::path::PathBuf;

use anyhow::{Context as _, Result};
use tooldock_config::{McpConfig, discover_config};
use tooldock_mcp::McpManager;

/// Shared context for all commands.
#[derive(Debug, Clone)]
pub struct Context {
    /// Output as JSON for scripting.
    pub json_output: bool,
    /// Verbose output enabled.
    pub verbose: bool,
    /// Explicit config file, if given.
    pub config_path: Option<PathBuf>,
}

impl Context {
    /// Load the server configuration.
    pub fn load_config(&self) -> Result<(McpConfig, Option<PathBuf>)> {
        let (config, path) = discover_config(self.config_path.as_deref())
            .context("failed to load server configuration")?;
        match &path {
            Some(path) => tracing::debug!(path = %path.display(), "loaded server configuration"),
            None => tracing::debug!("no configuration file found, using defaults"),
        }
        Ok((config, path))
    }

    /// Load the configuration and connect every enabled server.
    pub async fn connect(&self) -> Result<McpManager> {
        let (config, _) = self.load_config()?;
        let manager = McpManager::from_config(&config);
        let connected = manager.connect_all().await;
        tracing::debug!(connected, "servers connected");
        Ok(manager)
    }
}

/// Simple text wrapping helper.
pub fn textwrap_simple(text: &str, max_width: usize) -> String {
    let mut result = String::new();
    let mut current_line = String::new();

    for word in text.split_whitespace() {
        if current_line.is_empty() {
            current_line = word.to_string();
        } else if current_line.len() + 1 + word.len() <= max_width {
            current_line.push(' ');
            current_line.push_str(word);
        } else {
            result.push_str(&current_line);
            result.push('\n');
            current_line = word.to_string();
        }
    }

    if !current_line.is_empty() {
        result.push_str(&current_line);
    }

    result
}

/// Truncate a string to a maximum number of characters.
pub fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
