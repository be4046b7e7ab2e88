//! Subcommand handlers for the `hyper-cmd` binary.

pub(crate) mod plugins;
pub(crate) mod run;

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use serde_json::{Map, Value};

use hyper_cmd::config::Config;
use hyper_cmd::Host;

/// Global flags that affect how the host is built.
pub(crate) struct HostOptions {
    pub config: Option<PathBuf>,
    pub plugin_root: Option<String>,
}

/// Load configuration and start the host.
pub(crate) async fn start_host(options: &HostOptions) -> Result<Host> {
    let mut config = match &options.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    }
    .with_context(|| "Failed to load configuration")?;

    if let Some(root) = &options.plugin_root {
        config.plugins.root = root.clone();
    }

    Host::start(config)
        .await
        .with_context(|| "Failed to start plugin host")
}

/// Turn `key=value` words into a JSON object.
///
/// Values parse as JSON when they can (`count=3`, `tags=["a"]`) and fall
/// back to plain strings. `--flag` means `flag=true`.
pub(crate) fn parse_command_args(words: &[String]) -> Result<Value> {
    let mut args = Map::new();
    for word in words {
        let word = word.strip_prefix("--").unwrap_or(word);
        match word.split_once('=') {
            Some((key, _)) if key.is_empty() => bail!("Missing argument name in '{}'", word),
            Some((key, raw)) => {
                let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
                args.insert(key.to_string(), value);
            }
            None if !word.is_empty() => {
                args.insert(word.to_string(), Value::Bool(true));
            }
            None => bail!("Empty argument"),
        }
    }
    Ok(Value::Object(args))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn words(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_command_args() {
        let args = parse_command_args(&words(&[
            "path=/tmp",
            "count=3",
            "--force",
            "--name=ada",
            "tags=[\"a\",\"b\"]",
            "label=hello world",
        ]))
        .unwrap();
        assert_eq!(
            args,
            json!({
                "path": "/tmp",
                "count": 3,
                "force": true,
                "name": "ada",
                "tags": ["a", "b"],
                "label": "hello world"
            })
        );
    }

    #[test]
    fn test_parse_command_args_rejects_empty_key() {
        assert!(parse_command_args(&words(&["=3"])).is_err());
        assert!(parse_command_args(&words(&["--"])).is_err());
        assert_eq!(parse_command_args(&[]).unwrap(), json!({}));
    }
}
