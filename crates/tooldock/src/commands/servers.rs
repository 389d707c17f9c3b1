//! `tooldock servers` - list configured servers without connecting.

use anyhow::Result;
use clap::Args;
use serde_json::json;
use tooldock_config::McpServerEntry;

use super::{Context, truncate};

/// Arguments for `tooldock servers`.
#[derive(Args, Debug)]
pub struct ServersArgs {}

fn target(server: &McpServerEntry) -> String {
    if server.transport.is_remote() {
        server.url.clone().unwrap_or_default()
    } else {
        let mut cmd = server.command.clone();
        if !server.args.is_empty() {
            cmd.push(' ');
            cmd.push_str(&server.args.join(" "));
        }
        cmd
    }
}

/// Run `tooldock servers`.
pub async fn run(_args: ServersArgs, ctx: &Context) -> Result<()> {
    let (config, path) = ctx.load_config()?;

    if ctx.json_output {
        let servers: Vec<_> = config
            .servers
            .iter()
            .map(|server| {
                let mut entry = json!({
                    "name": server.name,
                    "enabled": server.enabled,
                    "transport": server.transport.as_str(),
                });
                if server.transport.is_remote() {
                    entry["url"] = json!(server.url);
                } else {
                    entry["command"] = json!(server.command);
                    if !server.args.is_empty() {
                        entry["args"] = json!(server.args);
                    }
                }
                entry
            })
            .collect();
        println!(
            "{}",
            serde_json::to_string_pretty(&json!({
                "config": path.map(|p| p.display().to_string()),
                "enabled": config.enabled,
                "tool_prefix": config.tool_prefix,
                "servers": servers,
            }))?
        );
        return Ok(());
    }

    if config.servers.is_empty() {
        println!("No MCP servers configured.");
        println!();
        println!("Create servers.json in the config directory, or pass --config <path>.");
        return Ok(());
    }

    if let Some(path) = &path {
        println!("Config: {}", path.display());
    }
    if !config.enabled {
        println!("MCP integration is disabled; no server will be connected.");
    }
    println!();
    println!(
        "{:<20} {:<10} {:<10} {:<40}",
        "NAME", "TRANSPORT", "STATUS", "TARGET"
    );
    println!("{}", "-".repeat(80));

    for server in &config.servers {
        let status = if server.enabled { "enabled" } else { "disabled" };
        println!(
            "{:<20} {:<10} {:<10} {:<40}",
            truncate(&server.name, 20),
            server.transport.as_str(),
            status,
            truncate(&target(server), 40)
        );

        if ctx.verbose {
            if !server.env.is_empty() {
                println!("  Environment:");
                for (key, value) in &server.env {
                    println!("    {}={}", key, value);
                }
            }
            if !server.headers.is_empty() {
                println!("  Headers:");
                for (key, value) in &server.headers {
                    println!("    {}: {}", key, value);
                }
            }
            if let Some(timeout) = server.timeout_secs {
                println!("  Timeout: {}s", timeout);
            }
            if let Some(retries) = server.retries {
                println!("  Retries: {}", retries);
            }
        }
    }

    Ok(())
}
