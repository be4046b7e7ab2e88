//! Error types for Hyper-CMD
//!
//! This module defines all error types used throughout the plugin host.
//! Uses `thiserror` for ergonomic error handling with automatic `Display` and
//! `Error` trait implementations.

use thiserror::Error;

/// Why no valid activation order exists for a set of manifests.
///
/// Resolution errors are global: startup aborts when one is returned.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolutionError {
    /// A plugin declares a dependency that is not among the loaded manifests.
    #[error("Plugin '{plugin}' depends on '{dependency}', which is not installed")]
    MissingDependency { plugin: String, dependency: String },

    /// The dependency is present but its version fails the declared range.
    #[error("Plugin '{plugin}' requires '{dependency}' {required}, found {found}")]
    VersionMismatch {
        plugin: String,
        dependency: String,
        required: String,
        found: String,
    },

    /// The dependency graph contains a cycle. `cycle` lists the nodes on it,
    /// starting with the smallest name.
    #[error("Dependency cycle detected: {}", format_cycle(.cycle))]
    Cycle { cycle: Vec<String> },
}

fn format_cycle(cycle: &[String]) -> String {
    let mut path = cycle.join(" -> ");
    if let Some(first) = cycle.first() {
        path.push_str(" -> ");
        path.push_str(first);
    }
    path
}

/// The primary error type for Hyper-CMD operations.
#[derive(Error, Debug)]
pub enum HyperError {
    /// Bad plugin descriptor (malformed, missing field, unreadable location)
    #[error("Manifest error: {0}")]
    Manifest(String),

    /// No valid activation order exists
    #[error("Resolution error: {0}")]
    Resolution(#[from] ResolutionError),

    /// A service identifier was registered twice
    #[error("Service '{0}' is already registered")]
    DuplicateService(String),

    /// A service identifier was never registered
    #[error("Unknown service '{0}'")]
    UnknownService(String),

    /// Resolving a service transitively requires resolving itself
    #[error("Circular service resolution: {}", .chain.join(" -> "))]
    CircularService { chain: Vec<String> },

    /// A service resolved to a different concrete type than requested
    #[error("Service '{id}' is not a {expected}")]
    ServiceType { id: String, expected: &'static str },

    /// A command name is already owned by a different plugin
    #[error("Command '{command}' from plugin '{requester}' conflicts with existing command from plugin '{owner}'")]
    CommandConflict {
        command: String,
        owner: String,
        requester: String,
    },

    /// No command is registered under that name
    #[error("Unknown command '{0}'")]
    UnknownCommand(String),

    /// Arguments do not satisfy the command's parameter schema
    #[error("Invalid arguments for '{command}': {reason}")]
    InvalidArguments { command: String, reason: String },

    /// A command handler returned an error
    #[error("Command '{command}' (plugin '{plugin}') failed: {message}")]
    CommandExecution {
        command: String,
        plugin: String,
        message: String,
    },

    /// A plugin or one of its command handlers reported an error
    #[error("Plugin error: {0}")]
    Plugin(String),

    /// A lifecycle hook reported an error
    #[error("Hook error: {0}")]
    Hook(String),

    /// A lifecycle hook exceeded the host-level timeout
    #[error("Timed out after {}ms during {phase}", .elapsed.as_millis())]
    Timeout {
        phase: String,
        elapsed: std::time::Duration,
    },

    /// Configuration-related errors (invalid config, missing required fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Standard I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Security violations (dangerous shell patterns in command templates)
    #[error("Security violation: {0}")]
    SecurityViolation(String),
}

/// A specialized `Result` type for Hyper-CMD operations.
pub type Result<T> = std::result::Result<T, HyperError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = HyperError::Manifest("missing field `name`".to_string());
        assert_eq!(err.to_string(), "Manifest error: missing field `name`");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: HyperError = io_err.into();
        assert!(matches!(err, HyperError::Io(_)));
    }

    #[test]
    fn test_resolution_error_wraps() {
        let err: HyperError = ResolutionError::MissingDependency {
            plugin: "b".into(),
            dependency: "a".into(),
        }
        .into();
        assert!(matches!(err, HyperError::Resolution(_)));
        assert!(err.to_string().contains("not installed"));
    }

    #[test]
    fn test_timeout_display_keeps_subsecond_precision() {
        let err = HyperError::Timeout {
            phase: "start".into(),
            elapsed: std::time::Duration::from_millis(250),
        };
        assert_eq!(err.to_string(), "Timed out after 250ms during start");
    }

    #[test]
    fn test_cycle_display_closes_loop() {
        let err = ResolutionError::Cycle {
            cycle: vec!["a".into(), "b".into(), "c".into()],
        };
        assert_eq!(err.to_string(), "Dependency cycle detected: a -> b -> c -> a");
    }

    #[test]
    fn test_circular_service_display() {
        let err = HyperError::CircularService {
            chain: vec!["db".into(), "cache".into(), "db".into()],
        };
        assert_eq!(
            err.to_string(),
            "Circular service resolution: db -> cache -> db"
        );
    }

    #[test]
    fn test_command_conflict_display() {
        let err = HyperError::CommandConflict {
            command: "status".into(),
            owner: "plugin-a".into(),
            requester: "plugin-b".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("conflicts"));
        assert!(msg.contains("plugin-a"));
        assert!(msg.contains("plugin-b"));
    }
}
