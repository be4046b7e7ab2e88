//! The interface every plugin implements, and the contexts its hooks receive.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::commands::{CommandDescriptor, CommandRegistry};
use crate::container::{downcast, ServiceInstance};
use crate::error::{HyperError, Result};
use crate::panels::{PanelHandle, PanelRegistry};

/// Lifecycle hooks of a plugin instance.
///
/// The runtime calls `activate` once after construction, `start` once after a
/// successful activation, and `stop` during teardown. Any error moves the
/// plugin to `Failed`; it never reaches other plugins.
#[async_trait]
pub trait Plugin: Send + Sync {
    /// Acquire resources using the injected services.
    async fn activate(&mut self, _ctx: &ActivationContext) -> Result<()> {
        Ok(())
    }

    /// Register commands and panels.
    async fn start(&mut self, ctx: &mut StartContext<'_>) -> Result<()>;

    /// Release resources. Also called best-effort after a failed
    /// `activate` or `start`, so it must tolerate partial initialization.
    async fn stop(&mut self) -> Result<()> {
        Ok(())
    }
}

/// What a plugin sees during `activate`.
pub struct ActivationContext {
    plugin: String,
    services: HashMap<String, ServiceInstance>,
}

impl ActivationContext {
    pub(crate) fn new(
        plugin: impl Into<String>,
        services: HashMap<String, ServiceInstance>,
    ) -> Self {
        Self {
            plugin: plugin.into(),
            services,
        }
    }

    /// Name of the plugin being activated.
    pub fn plugin(&self) -> &str {
        &self.plugin
    }

    /// A service declared in the manifest's `services` list.
    ///
    /// Services the manifest did not declare are not available, even if the
    /// container knows them.
    pub fn service<T>(&self, id: &str) -> Result<Arc<T>>
    where
        T: std::any::Any + Send + Sync,
    {
        let instance = self.services.get(id).cloned().ok_or_else(|| {
            HyperError::UnknownService(format!("{} (not declared by '{}')", id, self.plugin))
        })?;
        downcast(id, instance)
    }

    pub fn has_service(&self, id: &str) -> bool {
        self.services.contains_key(id)
    }
}

/// What a plugin sees during `start`.
pub struct StartContext<'a> {
    plugin: &'a str,
    interactive: bool,
    commands: &'a mut CommandRegistry,
    panels: &'a mut PanelRegistry,
}

impl<'a> StartContext<'a> {
    pub(crate) fn new(
        plugin: &'a str,
        interactive: bool,
        commands: &'a mut CommandRegistry,
        panels: &'a mut PanelRegistry,
    ) -> Self {
        Self {
            plugin,
            interactive,
            commands,
            panels,
        }
    }

    pub fn plugin(&self) -> &str {
        self.plugin
    }

    /// Register a command owned by this plugin.
    ///
    /// A name already owned by another plugin is rejected with
    /// [`HyperError::CommandConflict`]; the plugin may ignore the error and
    /// keep starting.
    pub fn register_command(&mut self, descriptor: CommandDescriptor) -> Result<()> {
        self.commands.register(self.plugin, descriptor)
    }

    /// Register a panel with the rendering layer.
    ///
    /// Only plugins declaring the `interactive` capability may do this.
    pub fn register_panel(&mut self, title: impl Into<String>) -> Result<PanelHandle> {
        if !self.interactive {
            return Err(HyperError::Plugin(format!(
                "Plugin '{}' registered a panel without declaring the interactive capability",
                self.plugin
            )));
        }
        Ok(self.panels.register(self.plugin, title))
    }
}
