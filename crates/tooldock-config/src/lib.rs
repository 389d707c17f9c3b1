//! Server configuration for tooldock.
//!
//! Provides JSON or TOML configuration with:
//! - Named server entries over stdio, HTTP, or SSE transports
//! - Global switches (enabled, tool prefix, timeouts, retries)
//! - File discovery (`TOOLDOCK_CONFIG`, platform config dir, working directory)

pub mod discovery;
pub mod error;
pub mod types;

pub use discovery::{
    CONFIG_PATH_ENV, config_dir, discover_config, discover_config_path, load_config,
    load_config_or_default,
};
pub use error::{ConfigError, Result};
pub use types::*;
