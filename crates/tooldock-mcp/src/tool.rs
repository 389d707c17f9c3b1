//! Namespaced tool handles.
//!
//! Every tool discovered on a server is exposed under
//! `<prefix><server>_<tool>` so that tools from different servers never
//! collide. An [`McpTool`] remembers the original name and the client that
//! owns it, so a call can be routed without consulting the manager again.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use crate::client::McpClient;
use crate::error::ToolCallError;
use crate::protocol::{CallToolResult, ToolContent, ToolInfo};

/// Build the namespaced name for a server's tool.
pub fn namespaced_name(prefix: &str, server: &str, tool: &str) -> String {
    format!("{}{}_{}", prefix, server, tool)
}

fn default_schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {}
    })
}

/// Description of a namespaced tool, as exposed to callers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolDescriptor {
    /// Name callers use (`<prefix><server>_<tool>`).
    pub name: String,
    /// Name the server knows the tool by.
    pub original_name: String,
    /// Owning server.
    pub server: String,
    /// Human-readable description.
    pub description: String,
    /// JSON Schema for the tool's arguments.
    pub input_schema: Value,
}

impl ToolDescriptor {
    /// Describe `info` from `server` under the given prefix.
    pub fn new(prefix: &str, server: &str, info: &ToolInfo) -> Self {
        Self {
            name: namespaced_name(prefix, server, &info.name),
            original_name: info.name.clone(),
            server: server.to_string(),
            description: info
                .description
                .clone()
                .unwrap_or_else(|| format!("MCP tool: {}", info.name)),
            input_schema: info.input_schema.clone().unwrap_or_else(default_schema),
        }
    }

    /// Rename after a collision.
    pub(crate) fn with_name(mut self, name: String) -> Self {
        self.name = name;
        self
    }

    /// Description annotated with the owning server.
    pub fn summary(&self) -> String {
        format!("[{}] {}", self.server, self.description)
    }
}

/// Output of a successful tool call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolOutput {
    /// Text content joined with newlines.
    pub text: String,
    /// Raw content items.
    pub content: Vec<ToolContent>,
}

impl From<CallToolResult> for ToolOutput {
    fn from(result: CallToolResult) -> Self {
        Self {
            text: result.text(),
            content: result.content,
        }
    }
}

/// A tool bound to the client of its owning server.
#[derive(Clone)]
pub struct McpTool {
    descriptor: ToolDescriptor,
    client: Arc<McpClient>,
}

impl McpTool {
    /// Bind a descriptor to its server's client.
    pub fn new(descriptor: ToolDescriptor, client: Arc<McpClient>) -> Self {
        Self { descriptor, client }
    }

    /// Namespaced name.
    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    /// Name on the server.
    pub fn original_name(&self) -> &str {
        &self.descriptor.original_name
    }

    /// Owning server.
    pub fn server(&self) -> &str {
        &self.descriptor.server
    }

    /// Full description.
    pub fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    /// Invoke the tool with the original name.
    ///
    /// A result the server flags as an error becomes
    /// [`ToolCallError::Failed`] carrying the result text.
    pub async fn call(&self, arguments: Option<Value>) -> Result<ToolOutput, ToolCallError> {
        if !self.client.is_connected() {
            return Err(ToolCallError::ServerUnavailable {
                server: self.server().to_string(),
                reason: format!("client is {}", self.client.state()),
            });
        }

        tracing::debug!(
            server = %self.server(),
            tool = %self.original_name(),
            "executing MCP tool"
        );

        let result = self
            .client
            .call_tool(self.original_name(), arguments)
            .await
            .map_err(|e| ToolCallError::from_mcp(self.name(), self.server(), e))?;

        if result.is_error() {
            let text = result.text();
            return Err(ToolCallError::Failed {
                tool: self.name().to_string(),
                code: None,
                message: if text.is_empty() {
                    "Unknown MCP error".to_string()
                } else {
                    text
                },
            });
        }
        Ok(result.into())
    }
}

impl std::fmt::Debug for McpTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpTool")
            .field("name", &self.descriptor.name)
            .field("server", &self.descriptor.server)
            .field("original_name", &self.descriptor.original_name)
            .finish_non_exhaustive()
    }
}
