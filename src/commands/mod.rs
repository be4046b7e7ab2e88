//! Command registry and dispatcher
//!
//! Aggregates the commands of every running plugin into one namespace. Each
//! command name maps to exactly one owning plugin at any instant: the first
//! registration wins and a different plugin claiming the same name gets
//! [`HyperError::CommandConflict`].
//!
//! Dispatch validates arguments against the command's parameter schema, then
//! awaits the bound handler. A failing handler never changes registry state.

pub mod schema;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::error::{HyperError, Result};
use crate::plugins::loader::is_valid_command_name;

/// Callable bound to a specific activated plugin instance.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    async fn call(&self, args: Value) -> Result<Value>;
}

struct FnHandler<F>(F);

#[async_trait]
impl<F> CommandHandler for FnHandler<F>
where
    F: Fn(Value) -> Result<Value> + Send + Sync,
{
    async fn call(&self, args: Value) -> Result<Value> {
        (self.0)(args)
    }
}

/// Wrap a synchronous closure as a [`CommandHandler`].
pub fn handler_fn<F>(f: F) -> Arc<dyn CommandHandler>
where
    F: Fn(Value) -> Result<Value> + Send + Sync + 'static,
{
    Arc::new(FnHandler(f))
}

/// A command exposed by a plugin.
#[derive(Clone)]
pub struct CommandDescriptor {
    pub name: String,
    /// Owning plugin. Filled in by the registry on registration.
    pub plugin: String,
    pub description: String,
    /// JSON Schema (object subset) describing the arguments.
    pub schema: Value,
    handler: Arc<dyn CommandHandler>,
}

impl CommandDescriptor {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        schema: Value,
        handler: Arc<dyn CommandHandler>,
    ) -> Self {
        Self {
            name: name.into(),
            plugin: String::new(),
            description: description.into(),
            schema,
            handler,
        }
    }

    /// One-line usage string, e.g. `git-status path=<string> [limit=<integer>]`.
    pub fn usage(&self) -> String {
        schema::usage(&self.name, &self.schema)
    }
}

impl fmt::Debug for CommandDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandDescriptor")
            .field("name", &self.name)
            .field("plugin", &self.plugin)
            .field("description", &self.description)
            .field("schema", &self.schema)
            .finish()
    }
}

/// Command namespace across all running plugins.
#[derive(Debug, Default)]
pub struct CommandRegistry {
    commands: BTreeMap<String, CommandDescriptor>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `descriptor` as owned by `plugin_name`.
    ///
    /// Re-registering a name the same plugin already owns replaces it. A name
    /// owned by a different plugin is rejected and the registry is unchanged,
    /// as is a name that is not a valid command name (it would end up in CLI
    /// usage and tool names).
    pub fn register(&mut self, plugin_name: &str, mut descriptor: CommandDescriptor) -> Result<()> {
        if !is_valid_command_name(&descriptor.name) {
            return Err(HyperError::Plugin(format!(
                "Invalid command name '{}' from plugin '{}': must start with a letter, then letters, digits, '_' or '-'",
                descriptor.name, plugin_name
            )));
        }
        if let Some(existing) = self.commands.get(&descriptor.name) {
            if existing.plugin != plugin_name {
                warn!(
                    command = %descriptor.name,
                    owner = %existing.plugin,
                    requester = %plugin_name,
                    "Rejected conflicting command registration"
                );
                return Err(HyperError::CommandConflict {
                    command: descriptor.name,
                    owner: existing.plugin.clone(),
                    requester: plugin_name.to_string(),
                });
            }
        }

        descriptor.plugin = plugin_name.to_string();
        info!(command = %descriptor.name, plugin = %plugin_name, "Registered command");
        self.commands.insert(descriptor.name.clone(), descriptor);
        Ok(())
    }

    /// Remove every command owned by `plugin_name`, returning how many.
    pub fn unregister_all(&mut self, plugin_name: &str) -> usize {
        let before = self.commands.len();
        self.commands.retain(|_, d| d.plugin != plugin_name);
        let removed = before - self.commands.len();
        if removed > 0 {
            debug!(plugin = %plugin_name, removed, "Unregistered commands");
        }
        removed
    }

    /// Route an invocation to the owning plugin's handler.
    ///
    /// `Value::Null` arguments are treated as an empty object.
    ///
    /// ```rust
    /// use hyper_cmd::commands::{handler_fn, CommandDescriptor, CommandRegistry};
    /// use serde_json::json;
    ///
    /// let mut registry = CommandRegistry::new();
    /// registry
    ///     .register(
    ///         "greeter",
    ///         CommandDescriptor::new("hello", "Say hello", json!({"type": "object"}),
    ///             handler_fn(|_| Ok(json!("hello")))),
    ///     )
    ///     .unwrap();
    ///
    /// # tokio_test::block_on(async {
    /// let out = registry.dispatch("hello", json!({})).await.unwrap();
    /// assert_eq!(out, json!("hello"));
    /// # });
    /// ```
    pub async fn dispatch(&self, command_name: &str, arguments: Value) -> Result<Value> {
        let descriptor = self
            .commands
            .get(command_name)
            .ok_or_else(|| HyperError::UnknownCommand(command_name.to_string()))?;

        let arguments = match arguments {
            Value::Null => Value::Object(Map::new()),
            other => other,
        };

        schema::validate(&descriptor.schema, &arguments).map_err(|reason| {
            HyperError::InvalidArguments {
                command: command_name.to_string(),
                reason,
            }
        })?;

        let plugin = descriptor.plugin.clone();
        let handler = Arc::clone(&descriptor.handler);
        debug!(command = %command_name, plugin = %plugin, "Dispatching command");

        handler.call(arguments).await.map_err(|e| match e {
            HyperError::CommandExecution { .. } => e,
            other => HyperError::CommandExecution {
                command: command_name.to_string(),
                plugin,
                message: other.to_string(),
            },
        })
    }

    pub fn get(&self, command_name: &str) -> Option<&CommandDescriptor> {
        self.commands.get(command_name)
    }

    pub fn contains(&self, command_name: &str) -> bool {
        self.commands.contains_key(command_name)
    }

    /// The plugin owning `command_name`.
    pub fn owner(&self, command_name: &str) -> Option<&str> {
        self.commands.get(command_name).map(|d| d.plugin.as_str())
    }

    /// All descriptors, sorted by command name.
    pub fn list(&self) -> Vec<&CommandDescriptor> {
        self.commands.values().collect()
    }

    /// Command names owned by `plugin_name`, sorted.
    pub fn commands_of(&self, plugin_name: &str) -> Vec<&str> {
        self.commands
            .values()
            .filter(|d| d.plugin == plugin_name)
            .map(|d| d.name.as_str())
            .collect()
    }

    pub fn usage(&self, command_name: &str) -> Option<String> {
        self.commands.get(command_name).map(CommandDescriptor::usage)
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}
