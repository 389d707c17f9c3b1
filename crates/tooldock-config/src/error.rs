//! Configuration error types.

/// Result type alias for config operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Errors that can occur while loading or validating server configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read a config file.
    #[error("failed to read config file '{path}': {source}")]
    ReadFile {
        path: String,
        source: std::io::Error,
    },

    /// Failed to parse TOML.
    #[error("failed to parse TOML config: {0}")]
    ParseToml(#[from] toml::de::Error),

    /// Failed to parse JSON.
    #[error("failed to parse JSON config: {0}")]
    ParseJson(#[from] serde_json::Error),

    /// Two server entries share a name.
    #[error("duplicate server name '{0}'")]
    DuplicateServer(String),

    /// A server entry is missing something its transport needs.
    #[error("invalid server '{server}': {reason}")]
    InvalidServer { server: String, reason: String },
}

impl ConfigError {
    pub(crate) fn invalid(server: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidServer {
            server: server.into(),
            reason: reason.into(),
        }
    }
}
