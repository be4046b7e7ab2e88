//! Panel registrations from interactive plugins.
//!
//! The host does not render anything itself; it only tracks which plugin
//! owns which panel so a frontend can list them and the runtime can drop a
//! plugin's panels when it stops or fails.

use std::fmt;

use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

/// Opaque handle returned when a panel is registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct PanelHandle(Uuid);

impl fmt::Display for PanelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Panel {
    pub handle: PanelHandle,
    pub plugin: String,
    pub title: String,
}

/// Panels in registration order.
#[derive(Debug, Default)]
pub struct PanelRegistry {
    panels: Vec<Panel>,
}

impl PanelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, plugin: &str, title: impl Into<String>) -> PanelHandle {
        let handle = PanelHandle(Uuid::new_v4());
        let title = title.into();
        debug!(plugin = %plugin, title = %title, handle = %handle, "Registered panel");
        self.panels.push(Panel {
            handle,
            plugin: plugin.to_string(),
            title,
        });
        handle
    }

    /// Drop every panel owned by `plugin`, returning how many.
    pub fn unregister_all(&mut self, plugin: &str) -> usize {
        let before = self.panels.len();
        self.panels.retain(|p| p.plugin != plugin);
        before - self.panels.len()
    }

    pub fn owner(&self, handle: PanelHandle) -> Option<&str> {
        self.panels
            .iter()
            .find(|p| p.handle == handle)
            .map(|p| p.plugin.as_str())
    }

    pub fn for_plugin(&self, plugin: &str) -> Vec<&Panel> {
        self.panels.iter().filter(|p| p.plugin == plugin).collect()
    }

    pub fn list(&self) -> &[Panel] {
        &self.panels
    }

    pub fn len(&self) -> usize {
        self.panels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.panels.is_empty()
    }
}
