//! Built-in services the host registers before any plugin activates.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::config::{Config, PluginConfig};
use crate::error::Result;

use super::{Container, Scope};

/// Identifier of the [`ConfigAccess`] service.
pub const CONFIG: &str = "config";
/// Identifier of the [`LogSink`] service.
pub const LOG: &str = "log";
/// Identifier of the [`SharedStore`] service.
pub const STORE: &str = "store";

/// Requester name used when a service is resolved outside plugin activation.
pub const HOST_REQUESTER: &str = "host";

/// Register `config`, `log` and `store`.
///
/// `config` and `log` are per-activation: each plugin gets an instance
/// scoped to its own name.
pub fn register_builtin_services(container: &Container, config: Arc<Config>) -> Result<()> {
    container.register(CONFIG, Scope::PerActivation, move |r| {
        Ok(ConfigAccess::new(
            Arc::clone(&config),
            r.requester().unwrap_or(HOST_REQUESTER),
        ))
    })?;
    container.register(LOG, Scope::PerActivation, |r| {
        Ok(LogSink::new(r.requester().unwrap_or(HOST_REQUESTER)))
    })?;
    container.register(STORE, Scope::Singleton, |_| Ok(SharedStore::default()))?;
    Ok(())
}

/// Read-only view of the configuration, scoped to one plugin.
#[derive(Debug, Clone)]
pub struct ConfigAccess {
    config: Arc<Config>,
    plugin: String,
}

impl ConfigAccess {
    pub fn new(config: Arc<Config>, plugin: impl Into<String>) -> Self {
        Self {
            config,
            plugin: plugin.into(),
        }
    }

    /// Plugin this view belongs to.
    pub fn plugin(&self) -> &str {
        &self.plugin
    }

    /// Process-wide plugin host settings.
    pub fn host(&self) -> &PluginConfig {
        &self.config.plugins
    }

    /// This plugin's own settings block, or `Value::Null`.
    pub fn settings(&self) -> Value {
        self.config.plugin_settings(&self.plugin)
    }
}

/// Logging sink handed to plugins.
///
/// Events go through `tracing` under the `hyper_cmd::plugin` target and
/// carry a `plugin` field, so events from command handlers (which run
/// outside any lifecycle span) are still attributed.
#[derive(Debug)]
pub struct LogSink {
    plugin: String,
    emitted: AtomicU64,
}

impl LogSink {
    pub fn new(plugin: impl Into<String>) -> Self {
        Self {
            plugin: plugin.into(),
            emitted: AtomicU64::new(0),
        }
    }

    pub fn plugin(&self) -> &str {
        &self.plugin
    }

    /// Number of events emitted through this sink.
    pub fn emitted(&self) -> u64 {
        self.emitted.load(Ordering::Relaxed)
    }

    pub fn debug(&self, message: &str) {
        self.bump();
        debug!(target: "hyper_cmd::plugin", plugin = %self.plugin, "{}", message);
    }

    pub fn info(&self, message: &str) {
        self.bump();
        info!(target: "hyper_cmd::plugin", plugin = %self.plugin, "{}", message);
    }

    pub fn warn(&self, message: &str) {
        self.bump();
        warn!(target: "hyper_cmd::plugin", plugin = %self.plugin, "{}", message);
    }

    pub fn error(&self, message: &str) {
        self.bump();
        error!(target: "hyper_cmd::plugin", plugin = %self.plugin, "{}", message);
    }

    fn bump(&self) {
        self.emitted.fetch_add(1, Ordering::Relaxed);
    }
}

/// Process-wide key/value store of JSON values shared between plugins.
#[derive(Debug, Default)]
pub struct SharedStore {
    values: Mutex<HashMap<String, Value>>,
}

impl SharedStore {
    pub fn get(&self, key: &str) -> Option<Value> {
        self.values().get(key).cloned()
    }

    /// Insert a value, returning the previous one.
    pub fn set(&self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.values().insert(key.into(), value)
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        self.values().remove(key)
    }

    /// All keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.values().keys().cloned().collect();
        keys.sort();
        keys
    }

    fn values(&self) -> std::sync::MutexGuard<'_, HashMap<String, Value>> {
        self.values
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::downcast;
    use serde_json::json;

    fn container_with_builtins() -> Container {
        let mut config = Config::default();
        config
            .settings
            .insert("git-tools".into(), json!({"remote": "origin"}));
        let container = Container::new();
        register_builtin_services(&container, Arc::new(config)).unwrap();
        container
    }

    #[test]
    fn test_builtins_registered() {
        let container = container_with_builtins();
        assert_eq!(container.ids(), vec![CONFIG, LOG, STORE]);
    }

    #[test]
    fn test_config_access_is_scoped_to_requester() {
        let container = container_with_builtins();
        let access = downcast::<ConfigAccess>(
            CONFIG,
            container.resolve_for(CONFIG, "git-tools").unwrap(),
        )
        .unwrap();
        assert_eq!(access.plugin(), "git-tools");
        assert_eq!(access.settings()["remote"], "origin");
        assert_eq!(access.host().hook_timeout_secs, 10);

        let other =
            downcast::<ConfigAccess>(CONFIG, container.resolve_for(CONFIG, "other").unwrap())
                .unwrap();
        assert_eq!(other.settings(), Value::Null);
    }

    #[test]
    fn test_log_sinks_are_per_activation_and_tagged() {
        let container = container_with_builtins();
        let a = downcast::<LogSink>(LOG, container.resolve_for(LOG, "alpha").unwrap()).unwrap();
        let b = downcast::<LogSink>(LOG, container.resolve_for(LOG, "alpha").unwrap()).unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(a.plugin(), "alpha");

        a.info("hello");
        a.warn("careful");
        assert_eq!(a.emitted(), 2);
        assert_eq!(b.emitted(), 0);

        let host = container.resolve_as::<LogSink>(LOG).unwrap();
        assert_eq!(host.plugin(), HOST_REQUESTER);
    }

    #[test]
    fn test_store_is_shared() {
        let container = container_with_builtins();
        let a = container.resolve_as::<SharedStore>(STORE).unwrap();
        let b = container.resolve_as::<SharedStore>(STORE).unwrap();

        assert!(a.set("k", json!(1)).is_none());
        assert_eq!(b.get("k"), Some(json!(1)));
        assert_eq!(b.set("k", json!(2)), Some(json!(1)));
        assert_eq!(a.keys(), vec!["k"]);
        assert_eq!(a.remove("k"), Some(json!(2)));
        assert!(b.get("k").is_none());
    }
}
