//! Plugin types for Hyper-CMD
//!
//! This module defines the static descriptor parsed from `plugin.json`, the
//! lifecycle state enum, and the failure record attached to failed plugins.

use std::collections::HashMap;
use std::fmt;

use semver::{Version, VersionReq};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// The manifest loaded from a plugin's `plugin.json` file.
///
/// Loading a manifest never runs plugin code; it is enough to resolve
/// dependencies before anything is constructed.
///
/// # Example
///
/// ```json
/// {
///   "name": "git-tools",
///   "version": "1.2.0",
///   "description": "Git integration commands",
///   "entry": "shell",
///   "dependencies": [{ "name": "core", "version": ">=1.0" }],
///   "capabilities": ["commands"],
///   "services": ["log"],
///   "commands": [
///     {
///       "name": "git-status",
///       "description": "Show the working tree status",
///       "parameters": {
///         "type": "object",
///         "properties": { "path": { "type": "string" } },
///         "required": ["path"]
///       },
///       "command": "git -C {{path}} status --porcelain",
///       "timeout_secs": 10
///     }
///   ]
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginManifest {
    /// Plugin name. Unique, alphanumeric characters and hyphens only,
    /// between 1 and 64 characters.
    pub name: String,

    /// Strict semantic version.
    pub version: Version,

    /// Human-readable description of what the plugin provides.
    #[serde(default)]
    pub description: String,

    /// Optional author name or identifier.
    #[serde(default)]
    pub author: Option<String>,

    /// Plugins that must be running before this one activates.
    #[serde(default)]
    pub dependencies: Vec<DependencySpec>,

    /// What the plugin contributes to the host.
    #[serde(default)]
    pub capabilities: Vec<Capability>,

    /// Container service identifiers injected at activation.
    #[serde(default)]
    pub services: Vec<String>,

    /// Factory reference used to construct the plugin instance.
    pub entry: String,

    /// Shell command definitions, used by the `shell` entry.
    #[serde(default)]
    pub commands: Vec<ShellCommandDef>,
}

impl PluginManifest {
    /// Minimal manifest with no dependencies, for built-in plugins and tests.
    pub fn new(name: impl Into<String>, version: Version, entry: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version,
            description: String::new(),
            author: None,
            dependencies: Vec::new(),
            capabilities: vec![Capability::Commands],
            services: Vec::new(),
            entry: entry.into(),
            commands: Vec::new(),
        }
    }

    /// Add a dependency, builder style.
    pub fn depends_on(mut self, name: impl Into<String>, requirement: VersionReq) -> Self {
        self.dependencies.push(DependencySpec {
            name: name.into(),
            requirement,
        });
        self
    }

    /// Add an injected service, builder style.
    pub fn with_service(mut self, id: impl Into<String>) -> Self {
        self.services.push(id.into());
        self
    }

    /// Add a capability, builder style.
    pub fn with_capability(mut self, capability: Capability) -> Self {
        if !self.capabilities.contains(&capability) {
            self.capabilities.push(capability);
        }
        self
    }

    pub fn has_capability(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }

    /// Names of declared dependencies, in declaration order.
    pub fn dependency_names(&self) -> impl Iterator<Item = &str> {
        self.dependencies.iter().map(|d| d.name.as_str())
    }
}

/// A declared dependency on another plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencySpec {
    pub name: String,

    /// Semver requirement such as `>=1.0` or `^2.1`. Defaults to `*`.
    #[serde(rename = "version", default = "any_version")]
    pub requirement: VersionReq,
}

fn any_version() -> VersionReq {
    VersionReq::STAR
}

impl fmt::Display for DependencySpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.name, self.requirement)
    }
}

/// What a plugin contributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Registers commands while starting.
    Commands,
    /// Registers full-screen panels with the rendering layer.
    Interactive,
}

/// A shell-command definition within a plugin manifest.
///
/// Parameter interpolation uses `{{param_name}}` syntax within the command
/// string; values are shell-quoted before substitution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShellCommandDef {
    /// Command name as registered with the host.
    pub name: String,

    #[serde(default)]
    pub description: String,

    /// JSON Schema describing the command's parameters.
    #[serde(default = "empty_object_schema")]
    pub parameters: Value,

    /// Shell command template.
    /// Must not contain dangerous shell operators (&&, ||, ;, |, backticks).
    pub command: String,

    #[serde(default)]
    pub working_dir: Option<String>,

    /// Optional timeout in seconds. Defaults to 30 if not specified.
    #[serde(default)]
    pub timeout_secs: Option<u64>,

    #[serde(default)]
    pub env: Option<HashMap<String, String>>,
}

impl ShellCommandDef {
    /// Returns the effective timeout in seconds, defaulting to 30.
    pub fn effective_timeout(&self) -> u64 {
        self.timeout_secs.unwrap_or(30)
    }
}

/// Schema accepting an object with any properties.
pub fn empty_object_schema() -> Value {
    json!({ "type": "object", "properties": {} })
}

/// Lifecycle state of one plugin. Mutated only by the runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PluginState {
    Discovered,
    Validated,
    Activated,
    Running,
    Deactivating,
    Stopped,
    Failed,
}

impl PluginState {
    pub fn is_terminal(self) -> bool {
        matches!(self, PluginState::Stopped | PluginState::Failed)
    }
}

impl fmt::Display for PluginState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PluginState::Discovered => "discovered",
            PluginState::Validated => "validated",
            PluginState::Activated => "activated",
            PluginState::Running => "running",
            PluginState::Deactivating => "deactivating",
            PluginState::Stopped => "stopped",
            PluginState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Lifecycle step during which a failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Validate,
    Activate,
    Start,
    Stop,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Validate => "validate",
            Phase::Activate => "activate",
            Phase::Start => "start",
            Phase::Stop => "stop",
        };
        f.write_str(s)
    }
}

/// Why a plugin ended in [`PluginState::Failed`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginFailure {
    pub phase: Phase,
    pub cause: String,
    /// For cascading failures, the plugin whose failure caused this one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
}

impl fmt::Display for PluginFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.origin {
            Some(origin) => write!(
                f,
                "{} skipped: dependency '{}' failed: {}",
                self.phase, origin, self.cause
            ),
            None => write!(f, "{} failed: {}", self.phase, self.cause),
        }
    }
}
