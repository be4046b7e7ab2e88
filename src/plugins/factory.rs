//! Plugin constructors keyed by manifest `entry` reference.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::builtin::{CorePlugin, CORE_ENTRY};
use crate::error::{HyperError, Result};

use super::lifecycle::Plugin;
use super::shell::{ShellPlugin, SHELL_ENTRY};
use super::types::PluginManifest;

/// Builds a fresh plugin instance from its manifest.
pub type PluginConstructor =
    Arc<dyn Fn(&PluginManifest) -> Result<Box<dyn Plugin>> + Send + Sync>;

/// Entry references the runtime can instantiate.
#[derive(Default, Clone)]
pub struct PluginFactories {
    constructors: HashMap<String, PluginConstructor>,
}

impl PluginFactories {
    /// No constructors at all.
    pub fn new() -> Self {
        Self::default()
    }

    /// The constructors shipped with the host: `builtin:core` and `shell`.
    pub fn with_builtins() -> Self {
        let mut factories = Self::new();
        factories.constructors.insert(
            CORE_ENTRY.to_string(),
            Arc::new(|_: &PluginManifest| Ok(Box::new(CorePlugin::new()) as Box<dyn Plugin>)),
        );
        factories.constructors.insert(
            SHELL_ENTRY.to_string(),
            Arc::new(|m: &PluginManifest| {
                Ok(Box::new(ShellPlugin::from_manifest(m)?) as Box<dyn Plugin>)
            }),
        );
        factories
    }

    /// Add a constructor. Registering the same entry twice is an error.
    pub fn register<F>(&mut self, entry: impl Into<String>, constructor: F) -> Result<()>
    where
        F: Fn(&PluginManifest) -> Result<Box<dyn Plugin>> + Send + Sync + 'static,
    {
        let entry = entry.into();
        if self.constructors.contains_key(&entry) {
            return Err(HyperError::Config(format!(
                "Plugin entry '{}' already has a constructor",
                entry
            )));
        }
        debug!(entry = %entry, "Registered plugin constructor");
        self.constructors.insert(entry, Arc::new(constructor));
        Ok(())
    }

    pub fn contains(&self, entry: &str) -> bool {
        self.constructors.contains_key(entry)
    }

    /// Construct the instance for `manifest`. Runs no lifecycle hook.
    pub fn build(&self, manifest: &PluginManifest) -> Result<Box<dyn Plugin>> {
        let constructor = self.constructors.get(&manifest.entry).ok_or_else(|| {
            HyperError::Manifest(format!(
                "Plugin '{}' has unknown entry '{}'",
                manifest.name, manifest.entry
            ))
        })?;
        constructor(manifest)
    }

    pub fn entries(&self) -> Vec<&str> {
        let mut entries: Vec<&str> = self.constructors.keys().map(String::as_str).collect();
        entries.sort_unstable();
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::lifecycle::StartContext;
    use async_trait::async_trait;
    use semver::Version;

    struct Noop;

    #[async_trait]
    impl Plugin for Noop {
        async fn start(&mut self, _ctx: &mut StartContext<'_>) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_builtins_present() {
        let factories = PluginFactories::with_builtins();
        assert_eq!(factories.entries(), vec!["builtin:core", "shell"]);
    }

    #[test]
    fn test_register_and_build() {
        let mut factories = PluginFactories::new();
        factories
            .register("test:noop", |_| Ok(Box::new(Noop) as Box<dyn Plugin>))
            .unwrap();
        assert!(factories
            .register("test:noop", |_| Ok(Box::new(Noop) as Box<dyn Plugin>))
            .is_err());

        let manifest = PluginManifest::new("n", Version::new(1, 0, 0), "test:noop");
        assert!(factories.build(&manifest).is_ok());

        let unknown = PluginManifest::new("u", Version::new(1, 0, 0), "test:missing");
        assert!(matches!(
            factories.build(&unknown),
            Err(HyperError::Manifest(_))
        ));
    }
}
