//! Running a plugin command, and the MCP stdio server.

use anyhow::{bail, Result};
use serde_json::Value;

use hyper_cmd::mcp;

use super::{parse_command_args, start_host, HostOptions};

/// Dispatch one command. Returns the process exit code.
pub(crate) async fn cmd_run(options: &HostOptions, words: Vec<String>) -> Result<i32> {
    let Some((command, rest)) = words.split_first() else {
        bail!("No command given");
    };
    let arguments = parse_command_args(rest)?;

    let mut host = start_host(options).await?;
    let outcome = host.dispatch(command, arguments).await;
    let usage = host.runtime().commands().usage(command);
    host.shutdown().await;

    match outcome {
        Ok(value) => {
            print_value(&value)?;
            Ok(0)
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            if let Some(usage) = usage {
                eprintln!("Usage: hyper-cmd {}", usage);
            }
            Ok(1)
        }
    }
}

fn print_value(value: &Value) -> Result<()> {
    match value {
        Value::Null => {}
        Value::String(text) => {
            print!("{}", text);
            if !text.ends_with('\n') {
                println!();
            }
        }
        other => println!("{}", serde_json::to_string_pretty(other)?),
    }
    Ok(())
}

pub(crate) async fn cmd_mcp(options: &HostOptions) -> Result<()> {
    let mut host = start_host(options).await?;
    let served = mcp::serve_stdio(host.runtime()).await;
    host.shutdown().await;
    served?;
    Ok(())
}
