//! Config file discovery and loading.
//!
//! Resolution order (first match wins):
//! 1. `TOOLDOCK_CONFIG` environment variable
//! 2. `<platform config dir>/tooldock/servers.json` (or `servers.toml`)
//! 3. `./servers.json` (or `./servers.toml`)
//!
//! A missing file is not an error: it means no servers are configured.

use std::path::{Path, PathBuf};

use crate::{ConfigError, McpConfig, Result};

/// Environment variable naming an explicit config file.
pub const CONFIG_PATH_ENV: &str = "TOOLDOCK_CONFIG";

/// Application name for platform directory resolution.
const APP_NAME: &str = "tooldock";

/// Candidate file names, checked in order.
const CONFIG_FILES: [&str; 2] = ["servers.json", "servers.toml"];

/// Load configuration from a specific file.
///
/// `.toml` files are parsed as TOML; anything else as JSON. The result is
/// validated before it is returned.
pub fn load_config(path: &Path) -> Result<McpConfig> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.display().to_string(),
        source: e,
    })?;

    let config = if is_toml(path) {
        McpConfig::from_toml(&contents)?
    } else {
        McpConfig::from_json(&contents)?
    };
    config.validate()?;

    tracing::debug!(
        path = %path.display(),
        servers = config.servers.len(),
        "loaded server configuration"
    );
    Ok(config)
}

/// Load configuration, treating a missing file as an empty configuration.
pub fn load_config_or_default(path: &Path) -> Result<McpConfig> {
    if !path.is_file() {
        tracing::debug!(path = %path.display(), "no config file, no servers configured");
        return Ok(McpConfig::default());
    }
    load_config(path)
}

/// Discover and load the configuration.
///
/// `explicit` (usually from the command line) takes precedence over every
/// discovered location.
pub fn discover_config(explicit: Option<&Path>) -> Result<(McpConfig, Option<PathBuf>)> {
    if let Some(path) = explicit {
        return load_config_or_default(path).map(|c| (c, Some(path.to_path_buf())));
    }
    match discover_config_path() {
        Some(path) => load_config(&path).map(|c| (c, Some(path))),
        None => Ok((McpConfig::default(), None)),
    }
}

/// Find the first existing config file in the search order.
pub fn discover_config_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var(CONFIG_PATH_ENV)
        && !path.is_empty()
    {
        return Some(PathBuf::from(path));
    }

    let mut dirs = Vec::new();
    if let Some(dir) = config_dir() {
        dirs.push(dir);
    }
    dirs.push(PathBuf::from("."));

    dirs.iter()
        .flat_map(|dir| CONFIG_FILES.iter().map(move |f| dir.join(f)))
        .find(|p| p.is_file())
}

/// Platform config directory for tooldock.
pub fn config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(APP_NAME))
}

fn is_toml(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("toml"))
}
