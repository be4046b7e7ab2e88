//! Host facade: one explicit startup sequence for the whole plugin system.
//!
//! discovery → allow/deny filtering → resolution → validation → activation.
//!
//! The [`Container`] and [`PluginRuntime`] are built here once and passed by
//! reference from then on; there are no process-global registries.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{info, warn};

use crate::builtin::core_manifest;
use crate::config::Config;
use crate::container::{register_builtin_services, Container};
use crate::error::{HyperError, Result};
use crate::plugins::loader::DiscoveryFailure;
use crate::plugins::{
    discover_plugins, Plugin, PluginFactories, PluginManifest, PluginRuntime, PluginSummary,
};

/// Configures and starts a [`Host`].
pub struct HostBuilder {
    config: Config,
    factories: PluginFactories,
    container: Container,
    manifests: Vec<PluginManifest>,
    discover: bool,
}

impl HostBuilder {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            factories: PluginFactories::with_builtins(),
            container: Container::new(),
            manifests: vec![core_manifest()],
            discover: true,
        }
    }

    /// Make an additional compiled-in constructor available to manifests.
    pub fn factory<F>(mut self, entry: impl Into<String>, constructor: F) -> Result<Self>
    where
        F: Fn(&PluginManifest) -> Result<Box<dyn Plugin>> + Send + Sync + 'static,
    {
        self.factories.register(entry, constructor)?;
        Ok(self)
    }

    /// Use `container` for services beyond the built-in ones.
    pub fn container(mut self, container: Container) -> Self {
        self.container = container;
        self
    }

    /// Add a manifest that does not come from disk.
    pub fn manifest(mut self, manifest: PluginManifest) -> Self {
        self.manifests.push(manifest);
        self
    }

    /// Skip scanning the plugin root.
    pub fn without_discovery(mut self) -> Self {
        self.discover = false;
        self
    }

    /// Run the startup sequence.
    ///
    /// Per-plugin failures are recorded on the returned host; only a global
    /// resolution error (or a broken plugin root) aborts startup.
    pub async fn start(self) -> Result<Host> {
        let config = Arc::new(self.config);
        register_builtin_services(&self.container, Arc::clone(&config))?;

        let mut failures = Vec::new();
        let mut manifests = self.manifests;

        if self.discover {
            let root = config.plugins.root_path();
            let report = discover_plugins(&root)?;
            failures.extend(report.failures);
            for loaded in report.loaded {
                if manifests.iter().any(|m| m.name == loaded.manifest.name) {
                    let error = HyperError::Manifest(format!(
                        "Plugin name '{}' is reserved by a built-in plugin",
                        loaded.manifest.name
                    ));
                    warn!(dir = %loaded.path.display(), error = %error, "Ignoring discovered plugin");
                    failures.push(DiscoveryFailure {
                        path: loaded.path,
                        error,
                    });
                    continue;
                }
                manifests.push(loaded.manifest);
            }
        }

        let (permitted, skipped): (Vec<_>, Vec<_>) = manifests
            .into_iter()
            .partition(|m| config.plugins.is_plugin_permitted(&m.name));
        let skipped: Vec<String> = skipped.into_iter().map(|m| m.name).collect();
        for name in &skipped {
            info!(plugin = %name, "Plugin disabled by configuration");
        }

        let mut runtime = PluginRuntime::new(Arc::new(self.container), self.factories)
            .with_hook_timeout(Duration::from_secs(config.plugins.hook_timeout_secs));
        runtime.load(permitted);
        runtime.resolve()?;
        runtime.startup().await;

        Ok(Host {
            config,
            runtime,
            discovery_failures: failures,
            skipped,
        })
    }
}

/// A started plugin host.
pub struct Host {
    config: Arc<Config>,
    runtime: PluginRuntime,
    discovery_failures: Vec<DiscoveryFailure>,
    skipped: Vec<String>,
}

impl Host {
    pub fn builder(config: Config) -> HostBuilder {
        HostBuilder::new(config)
    }

    /// Start with the default constructors and the plugins found on disk.
    pub async fn start(config: Config) -> Result<Self> {
        HostBuilder::new(config).start().await
    }

    pub async fn dispatch(&self, command: &str, arguments: Value) -> Result<Value> {
        self.runtime.dispatch(command, arguments).await
    }

    /// Stop running plugins in reverse activation order.
    pub async fn shutdown(&mut self) -> Vec<String> {
        self.runtime.shutdown().await
    }

    pub fn runtime(&self) -> &PluginRuntime {
        &self.runtime
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn summaries(&self) -> Vec<PluginSummary> {
        self.runtime.summaries()
    }

    /// Locations under the plugin root that did not produce a plugin.
    pub fn discovery_failures(&self) -> &[DiscoveryFailure] {
        &self.discovery_failures
    }

    /// Failed discovery paths with their error text.
    pub fn discovery_errors(&self) -> Vec<(PathBuf, String)> {
        self.discovery_failures
            .iter()
            .map(|f| (f.path.clone(), f.error.to_string()))
            .collect()
    }

    /// Plugins left out by the enabled/disabled lists.
    pub fn skipped(&self) -> &[String] {
        &self.skipped
    }
}
