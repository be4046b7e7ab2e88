//! `plugins` and `commands` listings.

use anyhow::Result;

use super::{start_host, HostOptions};

pub(crate) async fn cmd_plugins(options: &HostOptions, json: bool) -> Result<()> {
    let mut host = start_host(options).await?;
    let summaries = host.summaries();

    if json {
        println!("{}", serde_json::to_string_pretty(&summaries)?);
    } else {
        println!("{:<24} {:<12} {:<14} DETAIL", "PLUGIN", "VERSION", "STATE");
        for row in &summaries {
            let detail = match &row.failure {
                Some(failure) => failure.clone(),
                None => row.commands.join(", "),
            };
            println!(
                "{:<24} {:<12} {:<14} {}",
                row.name,
                row.version,
                row.state.to_string(),
                detail
            );
        }
        for name in host.skipped() {
            println!("{:<24} {:<12} {:<14} disabled by configuration", name, "-", "skipped");
        }
        for (path, error) in host.discovery_errors() {
            println!("! {}: {}", path.display(), error);
        }
    }

    host.shutdown().await;
    Ok(())
}

pub(crate) async fn cmd_commands(options: &HostOptions, json: bool) -> Result<()> {
    let mut host = start_host(options).await?;
    let commands = host.runtime().commands();

    if json {
        let rows: Vec<serde_json::Value> = commands
            .list()
            .into_iter()
            .map(|d| {
                serde_json::json!({
                    "name": d.name,
                    "plugin": d.plugin,
                    "description": d.description,
                    "parameters": d.schema,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
    } else if commands.is_empty() {
        println!("No commands available.");
    } else {
        for descriptor in commands.list() {
            println!("{}", descriptor.usage());
            if !descriptor.description.is_empty() {
                println!("    {} ({})", descriptor.description, descriptor.plugin);
            }
        }
    }

    host.shutdown().await;
    Ok(())
}
