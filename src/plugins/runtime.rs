//! Plugin runtime: owns every plugin's state machine.
//!
//! ```text
//! Discovered --validate--> Validated | Failed
//! Validated  --activate--> Activated | Failed
//! Activated  --start-----> Running   | Failed
//! Running    --stop------> Deactivating --> Stopped | Failed
//! ```
//!
//! Hook errors and timeouts are contained here and recorded against the one
//! plugin that caused them. Dependents of a failed plugin are failed without
//! running any of their hooks. Shutdown walks the achieved activation order
//! backwards.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::commands::CommandRegistry;
use crate::container::{Container, ServiceInstance};
use crate::error::{HyperError, Result};
use crate::panels::PanelRegistry;

use super::factory::PluginFactories;
use super::lifecycle::{ActivationContext, Plugin, StartContext};
use super::loader::validate_manifest;
use super::resolver::{self, ResolvedOrder};
use super::types::{Capability, Phase, PluginFailure, PluginManifest, PluginState};

/// Default bound on a single lifecycle hook.
pub const DEFAULT_HOOK_TIMEOUT: Duration = Duration::from_secs(10);

/// Everything the runtime knows about one plugin.
pub struct PluginRecord {
    manifest: PluginManifest,
    state: PluginState,
    failure: Option<PluginFailure>,
    instance: Option<Box<dyn Plugin>>,
    changed_at: DateTime<Utc>,
}

impl PluginRecord {
    fn new(manifest: PluginManifest) -> Self {
        Self {
            manifest,
            state: PluginState::Discovered,
            failure: None,
            instance: None,
            changed_at: Utc::now(),
        }
    }

    pub fn manifest(&self) -> &PluginManifest {
        &self.manifest
    }

    pub fn state(&self) -> PluginState {
        self.state
    }

    pub fn failure(&self) -> Option<&PluginFailure> {
        self.failure.as_ref()
    }

    pub fn changed_at(&self) -> DateTime<Utc> {
        self.changed_at
    }
}

/// One row of the `plugins` listing.
#[derive(Debug, Clone, Serialize)]
pub struct PluginSummary {
    pub name: String,
    pub version: String,
    pub state: PluginState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
    pub commands: Vec<String>,
    pub changed_at: DateTime<Utc>,
}

pub struct PluginRuntime {
    container: Arc<Container>,
    factories: PluginFactories,
    records: BTreeMap<String, PluginRecord>,
    order: ResolvedOrder,
    activation_order: Vec<String>,
    commands: CommandRegistry,
    panels: PanelRegistry,
    hook_timeout: Duration,
}

impl PluginRuntime {
    pub fn new(container: Arc<Container>, factories: PluginFactories) -> Self {
        Self {
            container,
            factories,
            records: BTreeMap::new(),
            order: ResolvedOrder::default(),
            activation_order: Vec::new(),
            commands: CommandRegistry::new(),
            panels: PanelRegistry::new(),
            hook_timeout: DEFAULT_HOOK_TIMEOUT,
        }
    }

    pub fn with_hook_timeout(mut self, timeout: Duration) -> Self {
        self.hook_timeout = timeout;
        self
    }

    /// Add manifests as `Discovered` plugins. A name already known is ignored.
    pub fn load(&mut self, manifests: impl IntoIterator<Item = PluginManifest>) {
        for manifest in manifests {
            if self.records.contains_key(&manifest.name) {
                warn!(plugin = %manifest.name, "Plugin already loaded, ignoring duplicate");
                continue;
            }
            debug!(plugin = %manifest.name, version = %manifest.version, "Plugin discovered");
            self.records
                .insert(manifest.name.clone(), PluginRecord::new(manifest));
        }
    }

    /// Compute the activation order for every loaded plugin.
    ///
    /// A resolution error is global: nothing may be activated afterwards.
    pub fn resolve(&mut self) -> Result<&ResolvedOrder> {
        let manifests: Vec<PluginManifest> =
            self.records.values().map(|r| r.manifest.clone()).collect();
        self.order = resolver::resolve(&manifests)?;
        info!(order = ?self.order.names(), "Plugin activation order resolved");
        Ok(&self.order)
    }

    /// Move every `Discovered` plugin to `Validated` or `Failed`.
    ///
    /// Checks the manifest contents, that the entry has a constructor, and
    /// that every declared service exists in the container.
    pub fn validate_all(&mut self) {
        let names: Vec<String> = self.order.iter().map(str::to_string).collect();
        for name in names {
            let Some(record) = self.records.get(&name) else {
                continue;
            };
            if record.state != PluginState::Discovered {
                continue;
            }
            match self.validate_one(&record.manifest) {
                Ok(()) => self.set_state(&name, PluginState::Validated),
                Err(e) => self.fail(&name, Phase::Validate, e.to_string(), None),
            }
        }
    }

    fn validate_one(&self, manifest: &PluginManifest) -> Result<()> {
        validate_manifest(manifest)?;
        if !self.factories.contains(&manifest.entry) {
            return Err(HyperError::Manifest(format!(
                "Entry '{}' is not resolvable",
                manifest.entry
            )));
        }
        for service in &manifest.services {
            if !self.container.contains(service) {
                return Err(HyperError::UnknownService(service.clone()));
            }
        }
        Ok(())
    }

    /// Activate and start every `Validated` plugin in resolved order.
    pub async fn activate_all(&mut self) {
        let names: Vec<String> = self.order.iter().map(str::to_string).collect();
        for name in names {
            if self.state(&name) != Some(PluginState::Validated) {
                continue;
            }
            if let Some((origin, cause)) = self.failed_dependency(&name) {
                warn!(
                    plugin = %name,
                    origin = %origin,
                    "Skipping activation because a dependency failed"
                );
                self.fail(&name, Phase::Activate, cause, Some(origin));
                continue;
            }
            if self.activate(&name).await {
                self.start(&name).await;
            }
        }
    }

    /// Validate, then activate. Call after a successful [`resolve`](Self::resolve).
    pub async fn startup(&mut self) {
        self.validate_all();
        self.activate_all().await;
        info!(
            running = self.activation_order.len(),
            total = self.records.len(),
            "Plugin startup complete"
        );
    }

    /// The first dependency of `name` that is not running, as
    /// `(originating plugin, cause)`.
    fn failed_dependency(&self, name: &str) -> Option<(String, String)> {
        let record = self.records.get(name)?;
        record.manifest.dependency_names().find_map(|dep| {
            let dep_record = self.records.get(dep)?;
            if dep_record.state == PluginState::Running {
                return None;
            }
            Some(match &dep_record.failure {
                Some(failure) => (
                    failure.origin.clone().unwrap_or_else(|| dep.to_string()),
                    failure.cause.clone(),
                ),
                None => (dep.to_string(), format!("dependency is {}", dep_record.state)),
            })
        })
    }

    async fn activate(&mut self, name: &str) -> bool {
        let Some(record) = self.records.get(name) else {
            return false;
        };

        let mut instance = match self.factories.build(&record.manifest) {
            Ok(instance) => instance,
            Err(e) => {
                self.fail(name, Phase::Activate, e.to_string(), None);
                return false;
            }
        };

        let services = match self.resolve_services(&record.manifest) {
            Ok(services) => services,
            Err(e) => {
                self.fail(name, Phase::Activate, e.to_string(), None);
                return false;
            }
        };

        let ctx = ActivationContext::new(name, services);
        let result = run_hook(self.hook_timeout, name, Phase::Activate, instance.activate(&ctx)).await;

        match result {
            Ok(()) => {
                if let Some(record) = self.records.get_mut(name) {
                    record.instance = Some(instance);
                }
                self.set_state(name, PluginState::Activated);
                true
            }
            Err(e) => {
                self.release(name, instance).await;
                self.fail(name, Phase::Activate, e.to_string(), None);
                false
            }
        }
    }

    fn resolve_services(&self, manifest: &PluginManifest) -> Result<HashMap<String, ServiceInstance>> {
        manifest
            .services
            .iter()
            .map(|id| Ok((id.clone(), self.container.resolve_for(id, &manifest.name)?)))
            .collect()
    }

    async fn start(&mut self, name: &str) {
        let Some(record) = self.records.get_mut(name) else {
            return;
        };
        let Some(mut instance) = record.instance.take() else {
            return;
        };
        let interactive = record.manifest.has_capability(Capability::Interactive);

        let result = {
            let mut ctx = StartContext::new(name, interactive, &mut self.commands, &mut self.panels);
            run_hook(self.hook_timeout, name, Phase::Start, instance.start(&mut ctx)).await
        };

        match result {
            Ok(()) => {
                if let Some(record) = self.records.get_mut(name) {
                    record.instance = Some(instance);
                }
                self.set_state(name, PluginState::Running);
                self.activation_order.push(name.to_string());
            }
            Err(e) => {
                self.commands.unregister_all(name);
                self.panels.unregister_all(name);
                self.release(name, instance).await;
                self.fail(name, Phase::Start, e.to_string(), None);
            }
        }
    }

    /// Best-effort `stop` after a failed `activate` or `start`.
    async fn release(&self, name: &str, mut instance: Box<dyn Plugin>) {
        if let Err(e) = run_hook(self.hook_timeout, name, Phase::Stop, instance.stop()).await {
            warn!(plugin = %name, error = %e, "Cleanup after failure did not complete");
        }
    }

    /// Deactivate running plugins in reverse activation order.
    ///
    /// Returns the names in the order they were stopped.
    pub async fn shutdown(&mut self) -> Vec<String> {
        let mut stopped = Vec::new();
        let order = std::mem::take(&mut self.activation_order);

        for name in order.iter().rev() {
            if self.state(name) != Some(PluginState::Running) {
                continue;
            }
            self.set_state(name, PluginState::Deactivating);
            self.commands.unregister_all(name);
            self.panels.unregister_all(name);

            let instance = self.records.get_mut(name).and_then(|r| r.instance.take());
            let result = match instance {
                Some(mut instance) => {
                    run_hook(self.hook_timeout, name, Phase::Stop, instance.stop()).await
                }
                None => Ok(()),
            };

            match result {
                Ok(()) => self.set_state(name, PluginState::Stopped),
                Err(e) => self.fail(name, Phase::Stop, e.to_string(), None),
            }
            stopped.push(name.clone());
        }

        info!(stopped = ?stopped, "Plugin shutdown complete");
        stopped
    }

    /// Route a command invocation to its owning plugin.
    pub async fn dispatch(&self, command: &str, arguments: Value) -> Result<Value> {
        self.commands.dispatch(command, arguments).await
    }

    fn set_state(&mut self, name: &str, state: PluginState) {
        if let Some(record) = self.records.get_mut(name) {
            debug!(plugin = %name, from = %record.state, to = %state, "Plugin state changed");
            record.state = state;
            record.changed_at = Utc::now();
        }
    }

    fn fail(&mut self, name: &str, phase: Phase, cause: String, origin: Option<String>) {
        let failure = PluginFailure {
            phase,
            cause,
            origin,
        };
        error!(plugin = %name, failure = %failure, "Plugin failed");
        self.set_state(name, PluginState::Failed);
        if let Some(record) = self.records.get_mut(name) {
            record.failure = Some(failure);
            record.instance = None;
        }
    }

    pub fn state(&self, name: &str) -> Option<PluginState> {
        self.records.get(name).map(|r| r.state)
    }

    pub fn failure(&self, name: &str) -> Option<&PluginFailure> {
        self.records.get(name).and_then(|r| r.failure.as_ref())
    }

    pub fn record(&self, name: &str) -> Option<&PluginRecord> {
        self.records.get(name)
    }

    pub fn order(&self) -> &ResolvedOrder {
        &self.order
    }

    /// Plugins that reached `Running`, in the order they got there.
    pub fn activation_order(&self) -> &[String] {
        &self.activation_order
    }

    pub fn commands(&self) -> &CommandRegistry {
        &self.commands
    }

    pub fn panels(&self) -> &PanelRegistry {
        &self.panels
    }

    pub fn container(&self) -> &Arc<Container> {
        &self.container
    }

    /// Failed plugins with their failure record, by name.
    pub fn failures(&self) -> Vec<(&str, &PluginFailure)> {
        self.records
            .iter()
            .filter_map(|(name, r)| r.failure.as_ref().map(|f| (name.as_str(), f)))
            .collect()
    }

    /// One row per plugin, in resolved order, then any unresolved by name.
    pub fn summaries(&self) -> Vec<PluginSummary> {
        let mut names: Vec<&str> = self.order.iter().collect();
        for name in self.records.keys() {
            if self.order.position(name).is_none() {
                names.push(name.as_str());
            }
        }

        names
            .into_iter()
            .filter_map(|name| self.records.get(name))
            .map(|r| PluginSummary {
                name: r.manifest.name.clone(),
                version: r.manifest.version.to_string(),
                state: r.state,
                failure: r.failure.as_ref().map(ToString::to_string),
                commands: self
                    .commands
                    .commands_of(&r.manifest.name)
                    .into_iter()
                    .map(str::to_string)
                    .collect(),
                changed_at: r.changed_at,
            })
            .collect()
    }
}

/// Await one lifecycle hook under the host-level timeout.
async fn run_hook<F>(timeout: Duration, plugin: &str, phase: Phase, hook: F) -> Result<()>
where
    F: Future<Output = Result<()>>,
{
    let span = info_span!("hook", plugin = %plugin, phase = %phase);
    match tokio::time::timeout(timeout, hook).instrument(span).await {
        Ok(result) => result,
        Err(_) => Err(HyperError::Timeout {
            phase: phase.to_string(),
            elapsed: timeout,
        }),
    }
}
