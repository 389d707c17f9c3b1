//! `tooldock tools` - list the namespaced tools of every connected server.

use anyhow::Result;
use clap::Args;

use super::{Context, textwrap_simple};

/// Arguments for `tooldock tools`.
#[derive(Args, Debug)]
pub struct ToolsArgs {
    /// Show full tool schemas
    #[arg(long)]
    pub full: bool,

    /// Only list tools of this server
    #[arg(long)]
    pub server: Option<String>,
}

/// Run `tooldock tools`.
pub async fn run(args: ToolsArgs, ctx: &Context) -> Result<()> {
    let manager = ctx.connect().await?;
    let tools: Vec<_> = manager
        .list_tools()
        .into_iter()
        .filter(|t| args.server.as_deref().is_none_or(|s| s == t.server))
        .collect();

    if ctx.json_output {
        use serde_json::json;

        let tools_json: Vec<_> = tools
            .iter()
            .map(|t| {
                if args.full {
                    json!({
                        "name": t.name,
                        "server": t.server,
                        "original_name": t.original_name,
                        "description": t.description,
                        "schema": t.input_schema,
                    })
                } else {
                    json!({
                        "name": t.name,
                        "server": t.server,
                        "description": t.description,
                    })
                }
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&tools_json)?);
    } else if tools.is_empty() {
        println!("No tools available.");
        if !manager.is_enabled() || manager.server_names().is_empty() {
            println!();
            println!("{}", manager.status_report());
        }
    } else {
        println!("Available tools ({}):", tools.len());
        for tool in &tools {
            println!("  • {}", tool.name);
            let wrapped = textwrap_simple(&tool.summary(), 70);
            for line in wrapped.lines() {
                println!("      {}", line);
            }
            if args.full {
                println!(
                    "      Schema: {}",
                    serde_json::to_string(&tool.input_schema)?
                );
            }
        }
    }

    manager.shutdown().await;
    Ok(())
}
