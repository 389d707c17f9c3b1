//! `tooldock status` - connect to every server and report its state.

use anyhow::Result;
use clap::Args;

use super::Context;

/// Arguments for `tooldock status`.
#[derive(Args, Debug)]
pub struct StatusArgs {}

/// Run `tooldock status`.
pub async fn run(_args: StatusArgs, ctx: &Context) -> Result<()> {
    let manager = ctx.connect().await?;

    if ctx.json_output {
        let status = serde_json::json!({
            "enabled": manager.is_enabled(),
            "servers": manager.get_status(),
        });
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        println!("{}", manager.status_report());
        if ctx.verbose {
            for (name, status) in manager.get_status() {
                println!();
                println!("{}:", name);
                println!("  State:     {}", status.state);
                println!("  Transport: {}", status.transport);
                println!("  Degraded:  {}", status.degraded);
            }
        }
    }

    manager.shutdown().await;
    Ok(())
}
