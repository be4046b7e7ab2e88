//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use semver::{Version, VersionReq};
use serde_json::{json, Value};

use hyper_cmd::commands::{handler_fn, CommandDescriptor};
use hyper_cmd::config::Config;
use hyper_cmd::error::{HyperError, Result};
use hyper_cmd::plugins::{ActivationContext, Plugin, PluginManifest, StartContext};

pub const TEST_ENTRY: &str = "test";

pub type Events = Arc<Mutex<Vec<String>>>;

pub fn events() -> Events {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn take(events: &Events) -> Vec<String> {
    std::mem::take(&mut *events.lock().unwrap())
}

/// How a scripted plugin behaves in each hook.
#[derive(Clone, Default)]
pub struct Behavior {
    pub fail_activate: bool,
    pub fail_start: bool,
    pub hang_activate: bool,
    pub commands: Vec<&'static str>,
    pub calls: Arc<AtomicUsize>,
}

impl Behavior {
    pub fn commands(commands: &[&'static str]) -> Self {
        Self {
            commands: commands.to_vec(),
            ..Default::default()
        }
    }

    pub fn failing_activate() -> Self {
        Self {
            fail_activate: true,
            ..Default::default()
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

/// Plugin that records every hook into a shared event log.
pub struct Scripted {
    name: String,
    behavior: Behavior,
    events: Events,
}

impl Scripted {
    fn record(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }
}

#[async_trait]
impl Plugin for Scripted {
    async fn activate(&mut self, _ctx: &ActivationContext) -> Result<()> {
        self.record(format!("activate:{}", self.name));
        if self.behavior.hang_activate {
            tokio::time::sleep(Duration::from_secs(60)).await;
        }
        if self.behavior.fail_activate {
            return Err(HyperError::Hook(format!("{} could not activate", self.name)));
        }
        Ok(())
    }

    async fn start(&mut self, ctx: &mut StartContext<'_>) -> Result<()> {
        self.record(format!("start:{}", self.name));
        for command in &self.behavior.commands {
            let owner = self.name.clone();
            let name = command.to_string();
            let calls = Arc::clone(&self.behavior.calls);
            let descriptor = CommandDescriptor::new(
                *command,
                format!("{} from {}", command, self.name),
                json!({ "type": "object" }),
                handler_fn(move |args| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(json!({ "plugin": owner, "command": name, "args": args }))
                }),
            );
            if let Err(e) = ctx.register_command(descriptor) {
                let kind = match e {
                    HyperError::CommandConflict { .. } => "conflict",
                    _ => "error",
                };
                self.record(format!("{}:{}:{}", kind, self.name, command));
            }
        }
        if self.behavior.fail_start {
            return Err(HyperError::Hook(format!("{} could not start", self.name)));
        }
        Ok(())
    }

    async fn stop(&mut self) -> Result<()> {
        self.record(format!("stop:{}", self.name));
        Ok(())
    }
}

/// Constructor for the `test` entry, keyed by plugin name.
pub fn scripted_factory(
    behaviors: HashMap<&'static str, Behavior>,
    events: Events,
) -> impl Fn(&PluginManifest) -> Result<Box<dyn Plugin>> + Send + Sync + 'static {
    move |manifest: &PluginManifest| {
        Ok(Box::new(Scripted {
            name: manifest.name.clone(),
            behavior: behaviors
                .get(manifest.name.as_str())
                .cloned()
                .unwrap_or_default(),
            events: Arc::clone(&events),
        }) as Box<dyn Plugin>)
    }
}

pub fn manifest(name: &str, version: &str, deps: &[(&str, &str)]) -> PluginManifest {
    let mut m = PluginManifest::new(name, Version::parse(version).unwrap(), TEST_ENTRY);
    for (dep, req) in deps {
        m = m.depends_on(*dep, VersionReq::parse(req).unwrap());
    }
    m
}

/// Write `<root>/<dir>/plugin.json`.
pub fn write_plugin(root: &Path, dir: &str, manifest: &Value) {
    let plugin_dir = root.join(dir);
    fs::create_dir_all(&plugin_dir).unwrap();
    fs::write(
        plugin_dir.join("plugin.json"),
        serde_json::to_string_pretty(manifest).unwrap(),
    )
    .unwrap();
}

/// Default configuration rooted at `root`.
pub fn config_at(root: &Path) -> Config {
    let mut config = Config::default();
    config.plugins.root = root.to_string_lossy().into_owned();
    config.plugins.hook_timeout_secs = 1;
    // A launcher that exists on any unix PATH, for init-mcp.
    config
        .settings
        .insert("core".into(), serde_json::json!({ "server_command": "sh" }));
    config
}
