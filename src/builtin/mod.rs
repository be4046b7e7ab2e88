//! The `core` plugin compiled into the host.
//!
//! Registers `init-mcp` (write the tool server client config) and `config`
//! (show the effective configuration). It goes through the same lifecycle
//! and container injection as any discovered plugin.
//!
//! Its settings block (`settings.core`) accepts `server_command`, the
//! launcher written into `.mcp.json` (default `hyper-cmd`).

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use semver::Version;
use serde_json::{json, Value};

use crate::commands::{handler_fn, CommandDescriptor};
use crate::container::services::{CONFIG, LOG};
use crate::container::{ConfigAccess, LogSink};
use crate::error::{HyperError, Result};
use crate::mcp::init;
use crate::plugins::{ActivationContext, Plugin, PluginManifest, StartContext};

pub const CORE_NAME: &str = "core";
pub const CORE_ENTRY: &str = "builtin:core";

/// Manifest of the core plugin, versioned with the host.
pub fn core_manifest() -> PluginManifest {
    let version = Version::parse(env!("CARGO_PKG_VERSION")).unwrap_or_else(|_| Version::new(0, 1, 0));
    let mut manifest = PluginManifest::new(CORE_NAME, version, CORE_ENTRY)
        .with_service(CONFIG)
        .with_service(LOG);
    manifest.description = "Built-in host commands".to_string();
    manifest
}

#[derive(Default)]
pub struct CorePlugin {
    config: Option<Arc<ConfigAccess>>,
    log: Option<Arc<LogSink>>,
}

impl CorePlugin {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Plugin for CorePlugin {
    async fn activate(&mut self, ctx: &ActivationContext) -> Result<()> {
        self.config = Some(ctx.service::<ConfigAccess>(CONFIG)?);
        self.log = Some(ctx.service::<LogSink>(LOG)?);
        Ok(())
    }

    async fn start(&mut self, ctx: &mut StartContext<'_>) -> Result<()> {
        let config = self
            .config
            .clone()
            .ok_or_else(|| HyperError::Plugin("core started before activation".into()))?;
        let command = server_command(&config);

        ctx.register_command(CommandDescriptor::new(
            "init-mcp",
            "Initialize MCP configuration (.mcp.json) registering this host as an MCP tool server",
            json!({
                "type": "object",
                "properties": {
                    "force": { "type": "boolean" },
                    "config_path": { "type": "string" }
                },
                "additionalProperties": false
            }),
            handler_fn(move |args| init_mcp(&command, args)),
        ))?;

        ctx.register_command(CommandDescriptor::new(
            "config",
            "Show the plugin host configuration",
            json!({ "type": "object", "additionalProperties": false }),
            handler_fn(move |_| show_config(&config)),
        ))?;

        if let Some(log) = &self.log {
            log.debug("core commands registered");
        }
        Ok(())
    }
}

fn server_command(config: &ConfigAccess) -> String {
    config
        .settings()
        .get("server_command")
        .and_then(Value::as_str)
        .unwrap_or(init::SERVER_COMMAND)
        .to_string()
}

fn init_mcp(command: &str, args: Value) -> Result<Value> {
    let force = args.get("force").and_then(Value::as_bool).unwrap_or(false);
    let dir = match args.get("config_path").and_then(Value::as_str) {
        Some(path) => PathBuf::from(path),
        None => std::env::current_dir()?,
    };
    let outcome = init::init(&dir, force, command)?;
    Ok(serde_json::to_value(outcome)?)
}

fn show_config(config: &ConfigAccess) -> Result<Value> {
    Ok(json!({
        "plugins": serde_json::to_value(config.host())?,
        "settings": config.settings(),
    }))
}
