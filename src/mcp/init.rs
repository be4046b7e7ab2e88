//! Generates the `.mcp.json` client configuration that registers this host
//! as a tool server.
//!
//! Before writing, the launcher command must be found on `PATH`; a config
//! pointing at a missing binary would only fail later inside the client.
//! Tool clients already present (an agent session in the environment,
//! existing `.mcp.json` files) are detected and reported back.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::{json, Map, Value};
use tracing::info;

use crate::error::{HyperError, Result};

/// File written into the target directory.
pub const CONFIG_FILE: &str = ".mcp.json";
/// Key under `mcpServers` owned by this host.
pub const SERVER_NAME: &str = "hyper-cmd";
/// Default launcher recorded as the server `command`.
pub const SERVER_COMMAND: &str = "hyper-cmd";
/// Environment variable set by Claude Code sessions.
pub const CLAUDE_CODE_ENV: &str = "CLAUDE_CODE";
pub const CONFIG_VERSION: &str = "1.0";
pub const SCHEMA_URL: &str = "https://modelcontextprotocol.io/schemas/mcp.json";

/// How the file was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    Overwrite,
    Merge,
}

#[derive(Debug, Clone, Serialize)]
pub struct InitOutcome {
    pub path: PathBuf,
    pub strategy: Strategy,
    /// Where the launcher was found on `PATH`.
    pub launcher: PathBuf,
    /// Tool clients detected before writing.
    pub detected_tools: Vec<String>,
}

/// A fresh configuration containing only this host's server entry,
/// launched through `command`.
pub fn generate_config(command: &str) -> Value {
    json!({
        "$schema": SCHEMA_URL,
        "version": CONFIG_VERSION,
        "description": "Tool servers for this project",
        "mcpServers": {
            SERVER_NAME: {
                "command": command,
                "args": ["mcp"],
                "env": {},
                "description": "Hyper-CMD plugin commands exposed as tools"
            }
        }
    })
}

/// Read an existing configuration. A missing file reads as `{}`.
pub fn read_config(path: &Path) -> Result<Value> {
    if !path.exists() {
        return Ok(Value::Object(Map::new()));
    }
    let content = fs::read_to_string(path)?;
    serde_json::from_str(&content).map_err(|e| {
        HyperError::Config(format!(
            "Failed to read existing config {}: {}",
            path.display(),
            e
        ))
    })
}

/// Keep every other server in `existing`, replace ours, and refresh the
/// top-level `version` and `$schema`.
pub fn merge_config(existing: &Value, new: &Value) -> Value {
    let mut merged = match existing {
        Value::Object(map) => map.clone(),
        _ => Map::new(),
    };

    for key in ["$schema", "version", "description"] {
        if let Some(value) = new.get(key) {
            if key == "description" && merged.contains_key(key) {
                continue;
            }
            merged.insert(key.to_string(), value.clone());
        }
    }

    let mut servers = match merged.remove("mcpServers") {
        Some(Value::Object(map)) => map,
        _ => Map::new(),
    };
    if let Some(Value::Object(new_servers)) = new.get("mcpServers") {
        for (name, server) in new_servers {
            servers.insert(name.clone(), server.clone());
        }
    }
    merged.insert("mcpServers".to_string(), Value::Object(servers));

    Value::Object(merged)
}

/// Write pretty-printed JSON followed by a newline.
pub fn write_config(path: &Path, config: &Value) -> Result<()> {
    let mut content = serde_json::to_string_pretty(config)?;
    content.push('\n');
    fs::write(path, content)?;
    Ok(())
}

/// Locate `command` on `PATH`.
pub fn locate_launcher(command: &str) -> Result<PathBuf> {
    which::which(command).map_err(|_| {
        HyperError::Config(format!(
            "'{}' was not found on PATH; install it before registering it as a tool server",
            command
        ))
    })
}

/// Existing `.mcp.json` files in `cwd` and `home`, without duplicates.
pub fn find_existing_configs(cwd: &Path, home: Option<&Path>) -> Vec<PathBuf> {
    let mut found: Vec<PathBuf> = Vec::new();
    for dir in std::iter::once(cwd).chain(home) {
        let candidate = dir.join(CONFIG_FILE);
        if candidate.is_file() && !found.contains(&candidate) {
            found.push(candidate);
        }
    }
    found
}

/// Tool clients visible from `cwd`: a Claude Code session in the
/// environment, and any existing client configs.
pub fn detect_tools(cwd: &Path, home: Option<&Path>) -> Vec<String> {
    let claude_code = std::env::var_os(CLAUDE_CODE_ENV).is_some();
    describe_tools(claude_code, &find_existing_configs(cwd, home))
}

fn describe_tools(claude_code: bool, configs: &[PathBuf]) -> Vec<String> {
    let mut tools = Vec::new();
    if claude_code {
        tools.push("Claude Code".to_string());
    }
    if !configs.is_empty() {
        tools.push(format!("Existing MCP configs ({} found)", configs.len()));
    }
    tools
}

/// Write `.mcp.json` into `dir` for the launcher `command`, merging with an
/// existing file unless `force`.
///
/// Nothing is written when `dir` is not a directory or `command` is not on
/// `PATH`.
pub fn init(dir: &Path, force: bool, command: &str) -> Result<InitOutcome> {
    if !dir.is_dir() {
        return Err(HyperError::Config(format!(
            "{} is not a directory",
            dir.display()
        )));
    }
    let launcher = locate_launcher(command)?;
    let home = dirs::home_dir();
    let detected_tools = detect_tools(dir, home.as_deref());

    let path = dir.join(CONFIG_FILE);
    let generated = generate_config(command);
    let strategy = if force || !path.exists() {
        Strategy::Overwrite
    } else {
        Strategy::Merge
    };

    let config = match strategy {
        Strategy::Overwrite => generated,
        Strategy::Merge => merge_config(&read_config(&path)?, &generated),
    };
    write_config(&path, &config)?;

    info!(
        path = %path.display(),
        strategy = ?strategy,
        launcher = %launcher.display(),
        "Wrote tool server config"
    );
    Ok(InitOutcome {
        path,
        strategy,
        launcher,
        detected_tools,
    })
}
