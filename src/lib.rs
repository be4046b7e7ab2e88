//! Hyper-CMD - plugin host for extensible command-line applications

pub mod builtin;
pub mod commands;
pub mod config;
pub mod container;
pub mod error;
pub mod host;
pub mod mcp;
pub mod panels;
pub mod plugins;

pub use commands::{CommandDescriptor, CommandHandler, CommandRegistry};
pub use config::Config;
pub use container::{Container, Scope};
pub use error::{HyperError, ResolutionError, Result};
pub use host::{Host, HostBuilder};
pub use plugins::{Plugin, PluginManifest, PluginRuntime, PluginState};
