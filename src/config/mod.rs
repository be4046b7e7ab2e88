//! Configuration for Hyper-CMD
//!
//! The host reads one JSON file at startup (`~/.hyper-cmd/config.json` by
//! default). Every field has a default, so an absent or empty file yields a
//! usable configuration. Plugins never read this file; they see it through
//! the `config` service (see [`crate::container::services::ConfigAccess`]).
//!
//! ```json
//! {
//!   "plugins": {
//!     "root": "~/.hyper-cmd/plugins",
//!     "enabled": [],
//!     "disabled": ["noisy-plugin"],
//!     "hook_timeout_secs": 10
//!   },
//!   "settings": {
//!     "git-tools": { "default_remote": "origin" }
//!   }
//! }
//! ```

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{HyperError, Result};

/// Environment variable overriding `plugins.root`.
pub const ENV_PLUGIN_ROOT: &str = "HYPER_CMD_PLUGIN_ROOT";
/// Environment variable overriding `plugins.hook_timeout_secs`.
pub const ENV_HOOK_TIMEOUT: &str = "HYPER_CMD_HOOK_TIMEOUT_SECS";

/// Process-wide settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Plugin discovery and lifecycle settings.
    pub plugins: PluginConfig,
    /// Per-plugin settings blocks, keyed by plugin name.
    pub settings: HashMap<String, Value>,
}

/// Plugin discovery and lifecycle settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginConfig {
    /// Discovery root. Each immediate subdirectory is a candidate plugin.
    pub root: String,

    /// Allowlist of plugin names. If empty, all discovered plugins are allowed.
    pub enabled: Vec<String>,

    /// Blocklist of plugin names. Takes precedence over `enabled`.
    pub disabled: Vec<String>,

    /// Upper bound for any single lifecycle hook, in seconds.
    pub hook_timeout_secs: u64,
}

impl Default for PluginConfig {
    fn default() -> Self {
        Self {
            root: "~/.hyper-cmd/plugins".to_string(),
            enabled: Vec::new(),
            disabled: Vec::new(),
            hook_timeout_secs: 10,
        }
    }
}

impl PluginConfig {
    /// Check whether a plugin name is permitted by the enabled/disabled lists.
    pub fn is_plugin_permitted(&self, name: &str) -> bool {
        if self.disabled.iter().any(|d| d == name) {
            return false;
        }
        self.enabled.is_empty() || self.enabled.iter().any(|e| e == name)
    }

    /// The discovery root with a leading `~` expanded.
    pub fn root_path(&self) -> PathBuf {
        expand_home(&self.root)
    }
}

impl Config {
    /// Directory holding the config file and default plugin root.
    pub fn dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".hyper-cmd")
    }

    /// Default config file location.
    pub fn path() -> PathBuf {
        Self::dir().join("config.json")
    }

    /// Load from the default location, then apply environment overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::path())
    }

    /// Load from an explicit path, then apply environment overrides.
    ///
    /// A missing file is not an error: defaults are used.
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = fs::read_to_string(path).map_err(|e| {
                HyperError::Config(format!("Failed to read {}: {}", path.display(), e))
            })?;
            serde_json::from_str(&content).map_err(|e| {
                HyperError::Config(format!("Failed to parse {}: {}", path.display(), e))
            })?
        } else {
            debug!(path = %path.display(), "Config file not found, using defaults");
            Config::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(root) = lookup(ENV_PLUGIN_ROOT) {
            if !root.trim().is_empty() {
                self.plugins.root = root;
            }
        }

        if let Some(raw) = lookup(ENV_HOOK_TIMEOUT) {
            match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => self.plugins.hook_timeout_secs = secs,
                _ => warn!(value = %raw, "Ignoring invalid {}", ENV_HOOK_TIMEOUT),
            }
        }
    }

    /// The settings block for one plugin, or `Value::Null` when absent.
    pub fn plugin_settings(&self, name: &str) -> Value {
        self.settings.get(name).cloned().unwrap_or(Value::Null)
    }
}

fn expand_home(raw: &str) -> PathBuf {
    if raw == "~" {
        return dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
    }
    if let Some(rest) = raw.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(raw)
}
