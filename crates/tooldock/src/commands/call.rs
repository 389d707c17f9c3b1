//! `tooldock call` - invoke one tool by its namespaced name.

use std::time::Duration;

use anyhow::{Context as _, Result};
use clap::Args;
use serde_json::{Value, json};
use tooldock_mcp::ToolCallError;

use super::Context;

/// Arguments for `tooldock call`.
#[derive(Args, Debug)]
pub struct CallArgs {
    /// Namespaced tool name (see `tooldock tools`)
    pub tool: String,

    /// Tool arguments as a JSON object
    #[arg(long)]
    pub args: Option<String>,

    /// Give up after this many seconds
    #[arg(long)]
    pub timeout: Option<u64>,
}

fn parse_arguments(raw: Option<&str>) -> Result<Option<Value>> {
    let Some(raw) = raw else {
        return Ok(None);
    };
    let value: Value = serde_json::from_str(raw).context("--args is not valid JSON")?;
    if !value.is_object() {
        anyhow::bail!("--args must be a JSON object");
    }
    Ok(Some(value))
}

/// Run `tooldock call`.
pub async fn run(args: CallArgs, ctx: &Context) -> Result<()> {
    let arguments = parse_arguments(args.args.as_deref())?;
    let manager = ctx.connect().await?;

    let call = manager.call_tool(&args.tool, arguments);
    let outcome = match args.timeout {
        Some(secs) => {
            let limit = Duration::from_secs(secs);
            tokio::time::timeout(limit, call)
                .await
                .unwrap_or_else(|_| {
                    Err(ToolCallError::Timeout {
                        tool: args.tool.clone(),
                        timeout: limit,
                    })
                })
        }
        None => call.await,
    };
    manager.shutdown().await;

    match outcome {
        Ok(output) => {
            if ctx.json_output {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&json!({
                        "status": "success",
                        "tool": args.tool,
                        "text": output.text,
                        "content": output.content,
                    }))?
                );
            } else {
                println!("{}", output.text);
            }
            Ok(())
        }
        Err(e) => {
            if ctx.json_output {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&json!({
                        "status": "error",
                        "tool": args.tool,
                        "kind": e.kind(),
                        "error": e.to_string(),
                    }))?
                );
            } else {
                eprintln!("❌ {} ({})", e, e.kind());
            }
            Err(e.into())
        }
    }
}
