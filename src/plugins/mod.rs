//! Plugin system for Hyper-CMD
//!
//! Plugins are discovered from a root directory, resolved into a dependency
//! order, then driven through their lifecycle by the [`PluginRuntime`]. Each
//! plugin is a directory containing a `plugin.json` manifest; its `entry`
//! names a constructor compiled into the host (see [`PluginFactories`]).
//!
//! # Architecture
//!
//! - **types**: Manifest, lifecycle state and failure records
//! - **loader**: Discovery, manifest loading and validation
//! - **resolver**: Deterministic topological activation order
//! - **lifecycle**: The `Plugin` trait and the contexts its hooks receive
//! - **factory**: Entry reference to constructor table
//! - **shell**: Plugins whose commands are shell templates
//! - **runtime**: State machine, failure containment and shutdown
//!
//! # Plugin Directory Structure
//!
//! ```text
//! ~/.hyper-cmd/plugins/
//! ├── git-tools/
//! │   └── plugin.json
//! └── docker-tools/
//!     ├── plugin.json
//!     └── scripts/
//!         └── helper.sh
//! ```
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::path::Path;
//! use std::sync::Arc;
//! use hyper_cmd::container::Container;
//! use hyper_cmd::plugins::{discover_plugins, PluginFactories, PluginRuntime};
//!
//! # async fn run() -> hyper_cmd::error::Result<()> {
//! let report = discover_plugins(Path::new("/home/user/.hyper-cmd/plugins"))?;
//!
//! let mut runtime = PluginRuntime::new(Arc::new(Container::new()), PluginFactories::with_builtins());
//! runtime.load(report.manifests());
//! runtime.resolve()?;
//! runtime.startup().await;
//!
//! println!("{} commands available", runtime.commands().len());
//! runtime.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod factory;
pub mod lifecycle;
pub mod loader;
pub mod resolver;
pub mod runtime;
pub mod shell;
pub mod types;

pub use factory::{PluginConstructor, PluginFactories};
pub use lifecycle::{ActivationContext, Plugin, StartContext};
pub use loader::{discover_plugins, load_manifest, validate_manifest, DiscoveryReport};
pub use resolver::{resolve, ResolvedOrder};
pub use runtime::{PluginRecord, PluginRuntime, PluginSummary};
pub use shell::ShellPlugin;
pub use types::{
    Capability, DependencySpec, Phase, PluginFailure, PluginManifest, PluginState,
    ShellCommandDef,
};
