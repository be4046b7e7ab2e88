//! Plugins whose commands are shell templates declared in `plugin.json`.
//!
//! Each [`ShellCommandDef`] becomes one registered command. At dispatch time
//! `{{param}}` placeholders are replaced with the shell-quoted argument
//! values and the result runs under `sh -c` via `tokio::process::Command`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::commands::{CommandDescriptor, CommandHandler};
use crate::error::{HyperError, Result};

use super::lifecycle::{Plugin, StartContext};
use super::types::{PluginManifest, ShellCommandDef};

/// Entry reference selecting this plugin kind.
pub const SHELL_ENTRY: &str = "shell";

static PLACEHOLDER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{\s*([a-zA-Z_][a-zA-Z0-9_\-]*)\s*\}\}").expect("valid regex"));

pub struct ShellPlugin {
    commands: Vec<ShellCommandDef>,
}

impl ShellPlugin {
    pub fn from_manifest(manifest: &PluginManifest) -> Result<Self> {
        if manifest.commands.is_empty() {
            return Err(HyperError::Manifest(format!(
                "Shell plugin '{}' defines no commands",
                manifest.name
            )));
        }
        Ok(Self {
            commands: manifest.commands.clone(),
        })
    }
}

#[async_trait]
impl Plugin for ShellPlugin {
    async fn start(&mut self, ctx: &mut StartContext<'_>) -> Result<()> {
        for def in &self.commands {
            let descriptor = CommandDescriptor::new(
                def.name.clone(),
                def.description.clone(),
                def.parameters.clone(),
                Arc::new(ShellCommand { def: def.clone() }),
            );
            // A conflicting name does not stop the rest from registering.
            if let Err(e) = ctx.register_command(descriptor) {
                warn!(plugin = %ctx.plugin(), error = %e, "Skipping shell command");
            }
        }
        Ok(())
    }
}

struct ShellCommand {
    def: ShellCommandDef,
}

#[async_trait]
impl CommandHandler for ShellCommand {
    async fn call(&self, args: Value) -> Result<Value> {
        let script = interpolate(&self.def.command, &args);
        let timeout = Duration::from_secs(self.def.effective_timeout());
        debug!(command = %self.def.name, script = %script, "Running shell command");

        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(&script).kill_on_drop(true);
        if let Some(dir) = &self.def.working_dir {
            cmd.current_dir(dir);
        }
        if let Some(env) = &self.def.env {
            cmd.envs(env);
        }

        let output = tokio::time::timeout(timeout, cmd.output())
            .await
            .map_err(|_| {
                HyperError::Plugin(format!(
                    "'{}' timed out after {}s",
                    self.def.name,
                    timeout.as_secs()
                ))
            })?
            .map_err(|e| HyperError::Plugin(format!("Failed to run '{}': {}", self.def.name, e)))?;

        if output.status.success() {
            Ok(Value::String(
                String::from_utf8_lossy(&output.stdout).into_owned(),
            ))
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(HyperError::Plugin(format!(
                "'{}' exited with {}: {}",
                self.def.name,
                output.status,
                stderr.trim()
            )))
        }
    }
}

/// Substitute `{{name}}` placeholders with quoted argument values.
///
/// Missing arguments expand to an empty quoted string.
fn interpolate(template: &str, args: &Value) -> String {
    let values: HashMap<&str, String> = args
        .as_object()
        .map(|map| {
            map.iter()
                .map(|(k, v)| (k.as_str(), render(v)))
                .collect()
        })
        .unwrap_or_default();

    PLACEHOLDER_RE
        .replace_all(template, |caps: &regex::Captures<'_>| {
            let value = values.get(&caps[1]).map(String::as_str).unwrap_or("");
            shell_quote(value)
        })
        .into_owned()
}

fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}
