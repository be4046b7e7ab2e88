//! Plugin discovery and manifest loading for Hyper-CMD
//!
//! This module handles scanning the discovery root, loading and parsing
//! `plugin.json` manifests, and validating manifest contents for safety and
//! consistency. Loading is purely descriptive: no plugin code runs here.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info, warn};

use crate::error::{HyperError, Result};

use super::types::PluginManifest;

/// Descriptor file name inside each plugin directory.
pub const MANIFEST_FILE: &str = "plugin.json";

static PLUGIN_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9][a-zA-Z0-9\-]{0,63}$").expect("valid regex"));

static COMMAND_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z][a-zA-Z0-9_\-]{0,63}$").expect("valid regex"));

/// A manifest together with the directory it came from.
#[derive(Debug, Clone)]
pub struct LoadedManifest {
    pub manifest: PluginManifest,
    pub path: PathBuf,
}

/// A candidate location that did not yield a usable manifest.
#[derive(Debug)]
pub struct DiscoveryFailure {
    pub path: PathBuf,
    pub error: HyperError,
}

/// Outcome of scanning a discovery root.
#[derive(Debug, Default)]
pub struct DiscoveryReport {
    /// Loaded manifests, in directory path order.
    pub loaded: Vec<LoadedManifest>,
    /// Locations whose manifest was unreadable, malformed or invalid.
    pub failures: Vec<DiscoveryFailure>,
}

impl DiscoveryReport {
    pub fn manifests(&self) -> Vec<PluginManifest> {
        self.loaded.iter().map(|l| l.manifest.clone()).collect()
    }
}

/// Scan each immediate subdirectory of `root` for a `plugin.json`.
///
/// Subdirectories are visited in path order so the result is deterministic.
/// A broken plugin is recorded in `failures` and never stops discovery of the
/// others. When two directories declare the same plugin name, the first one
/// wins and the second is reported as a failure.
///
/// A missing root yields an empty report.
pub fn discover_plugins(root: &Path) -> Result<DiscoveryReport> {
    let mut report = DiscoveryReport::default();

    if !root.exists() {
        info!(dir = %root.display(), "Plugin root does not exist, skipping");
        return Ok(report);
    }

    if !root.is_dir() {
        warn!(path = %root.display(), "Plugin root is not a directory, skipping");
        return Ok(report);
    }

    let entries = fs::read_dir(root).map_err(|e| {
        HyperError::Manifest(format!(
            "Failed to read plugin root {}: {}",
            root.display(),
            e
        ))
    })?;

    let mut dirs = Vec::new();
    for entry in entries {
        let entry = entry
            .map_err(|e| HyperError::Manifest(format!("Failed to read directory entry: {}", e)))?;
        let path = entry.path();
        if path.is_dir() && path.join(MANIFEST_FILE).exists() {
            dirs.push(path);
        }
    }
    dirs.sort();

    let mut seen = HashSet::new();
    for dir in dirs {
        match load_manifest(&dir) {
            Ok(manifest) if !seen.insert(manifest.name.clone()) => {
                let error = HyperError::Manifest(format!(
                    "Plugin name '{}' is already provided by another directory",
                    manifest.name
                ));
                warn!(dir = %dir.display(), error = %error, "Duplicate plugin, skipping");
                report.failures.push(DiscoveryFailure { path: dir, error });
            }
            Ok(manifest) => {
                info!(
                    plugin = %manifest.name,
                    version = %manifest.version,
                    entry = %manifest.entry,
                    "Discovered plugin"
                );
                report.loaded.push(LoadedManifest {
                    manifest,
                    path: dir,
                });
            }
            Err(error) => {
                warn!(
                    dir = %dir.display(),
                    error = %error,
                    "Failed to load plugin manifest, skipping"
                );
                report.failures.push(DiscoveryFailure { path: dir, error });
            }
        }
    }

    debug!(
        loaded = report.loaded.len(),
        failed = report.failures.len(),
        "Discovery finished"
    );
    Ok(report)
}

/// Load and validate the manifest in `dir`.
///
/// # Errors
/// `HyperError::Manifest` if `plugin.json` is missing, unreadable, malformed,
/// lacks a required field, or fails [`validate_manifest`];
/// `HyperError::SecurityViolation` for dangerous shell command templates.
pub fn load_manifest(dir: &Path) -> Result<PluginManifest> {
    let manifest_path = dir.join(MANIFEST_FILE);

    if !manifest_path.exists() {
        return Err(HyperError::Manifest(format!(
            "No {} found in {}",
            MANIFEST_FILE,
            dir.display()
        )));
    }

    let content = fs::read_to_string(&manifest_path).map_err(|e| {
        HyperError::Manifest(format!("Failed to read {}: {}", manifest_path.display(), e))
    })?;

    let manifest: PluginManifest = serde_json::from_str(&content).map_err(|e| {
        HyperError::Manifest(format!("Malformed {}: {}", manifest_path.display(), e))
    })?;

    validate_manifest(&manifest)?;

    Ok(manifest)
}

/// Validate a manifest for structural consistency and safety.
///
/// Checks:
/// - Plugin name must be 1-64 characters, alphanumeric and hyphens only
/// - Entry reference must be non-empty
/// - No dependency on itself, no dependency listed twice
/// - Command names must start with a letter (letters, digits, `_`, `-`)
/// - Command names are unique within the manifest
/// - Shell command templates must not contain dangerous shell operators
pub fn validate_manifest(manifest: &PluginManifest) -> Result<()> {
    if !PLUGIN_NAME_RE.is_match(&manifest.name) {
        return Err(HyperError::Manifest(format!(
            "Invalid plugin name '{}': must be 1-64 alphanumeric characters and hyphens, starting with alphanumeric",
            manifest.name
        )));
    }

    if manifest.entry.trim().is_empty() {
        return Err(HyperError::Manifest(format!(
            "Plugin '{}' has an empty entry reference",
            manifest.name
        )));
    }

    let mut deps = HashSet::new();
    for dep in &manifest.dependencies {
        if dep.name == manifest.name {
            return Err(HyperError::Manifest(format!(
                "Plugin '{}' depends on itself",
                manifest.name
            )));
        }
        if !deps.insert(dep.name.as_str()) {
            return Err(HyperError::Manifest(format!(
                "Plugin '{}' lists dependency '{}' more than once",
                manifest.name, dep.name
            )));
        }
    }

    let mut commands = HashSet::new();
    for command in &manifest.commands {
        if !COMMAND_NAME_RE.is_match(&command.name) {
            return Err(HyperError::Manifest(format!(
                "Invalid command name '{}' in plugin '{}': must start with a letter, then letters, digits, '_' or '-'",
                command.name, manifest.name
            )));
        }
        if !commands.insert(command.name.as_str()) {
            return Err(HyperError::Manifest(format!(
                "Plugin '{}' defines command '{}' more than once",
                manifest.name, command.name
            )));
        }
        validate_command_safety(&command.command, &command.name, &manifest.name)?;
    }

    Ok(())
}

/// Whether `name` is acceptable as a command name.
pub fn is_valid_command_name(name: &str) -> bool {
    COMMAND_NAME_RE.is_match(name)
}

/// Reject shell command templates containing `&&`, `||`, `;`, `|` or backticks.
fn validate_command_safety(command: &str, command_name: &str, plugin_name: &str) -> Result<()> {
    let dangerous_patterns: &[(&str, &str)] = &[
        ("&&", "command chaining (&&)"),
        ("||", "conditional chaining (||)"),
        (";", "command separator (;)"),
        ("`", "backtick execution"),
        ("|", "pipe operator (|)"),
    ];

    for (pattern, description) in dangerous_patterns {
        if command.contains(pattern) {
            return Err(HyperError::SecurityViolation(format!(
                "Command '{}' in plugin '{}' contains dangerous pattern: {}",
                command_name, plugin_name, description
            )));
        }
    }

    Ok(())
}
