//! Tool-protocol front-end (MCP over line-delimited JSON-RPC 2.0 on stdio).
//!
//! Exposes a read-only view of the command registry as tools named
//! `hyper_<command>` and passes `tools/call` straight through to dispatch.
//! Holds no state of its own.

pub mod init;

use serde::Deserialize;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, error, info};

use crate::commands::CommandRegistry;
use crate::error::Result;
use crate::plugins::PluginRuntime;

/// Prefix turning a command name into a tool name.
pub const TOOL_PREFIX: &str = "hyper_";
pub const PROTOCOL_VERSION: &str = "2024-11-05";

pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_REQUEST: i64 = -32600;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;

#[derive(Debug, Deserialize)]
struct Request {
    #[serde(default)]
    jsonrpc: Option<String>,
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    params: Value,
}

/// Tool descriptors for every registered command, sorted by name.
pub fn list_tools(commands: &CommandRegistry) -> Vec<Value> {
    commands
        .list()
        .into_iter()
        .map(|d| {
            json!({
                "name": format!("{}{}", TOOL_PREFIX, d.name),
                "description": d.description,
                "inputSchema": d.schema,
            })
        })
        .collect()
}

/// Handle one raw line. Returns the response to write, if any.
pub async fn handle_message(runtime: &PluginRuntime, line: &str) -> Option<Value> {
    match serde_json::from_str::<Value>(line) {
        Ok(value) => handle_request(runtime, value).await,
        Err(e) => Some(error_response(
            Value::Null,
            PARSE_ERROR,
            &format!("Parse error: {}", e),
        )),
    }
}

/// Handle one decoded request. Notifications (no `id`) get no response.
pub async fn handle_request(runtime: &PluginRuntime, raw: Value) -> Option<Value> {
    let request: Request = match serde_json::from_value(raw) {
        Ok(request) => request,
        Err(e) => {
            return Some(error_response(
                Value::Null,
                INVALID_REQUEST,
                &format!("Invalid request: {}", e),
            ))
        }
    };

    let id = request.id.clone().unwrap_or(Value::Null);
    let method = match (&request.jsonrpc, &request.method) {
        (Some(version), Some(method)) if version == "2.0" => method.as_str(),
        _ => {
            return Some(error_response(
                id,
                INVALID_REQUEST,
                "Invalid request: expected jsonrpc 2.0 with a method",
            ))
        }
    };

    debug!(method = %method, "Received tool protocol request");
    let is_notification = request.id.is_none();

    let outcome = match method {
        "initialize" => Ok(json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": { "tools": {} },
            "serverInfo": {
                "name": "hyper-cmd",
                "version": env!("CARGO_PKG_VERSION"),
            }
        })),
        "notifications/initialized" => return None,
        "tools/list" => Ok(json!({ "tools": list_tools(runtime.commands()) })),
        "tools/call" => call_tool(runtime, &request.params).await,
        other => Err((METHOD_NOT_FOUND, format!("Method not found: {}", other))),
    };

    if is_notification {
        return None;
    }
    Some(match outcome {
        Ok(result) => json!({ "jsonrpc": "2.0", "id": id, "result": result }),
        Err((code, message)) => error_response(id, code, &message),
    })
}

async fn call_tool(
    runtime: &PluginRuntime,
    params: &Value,
) -> std::result::Result<Value, (i64, String)> {
    let name = params
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| (INVALID_PARAMS, "Missing tool name".to_string()))?;
    let command = name.strip_prefix(TOOL_PREFIX).unwrap_or(name);
    let arguments = params.get("arguments").cloned().unwrap_or(Value::Null);

    info!(tool = %name, command = %command, "Executing tool");

    // Dispatch errors are tool results, not protocol errors. Only failed
    // results carry `isError`.
    Ok(match runtime.dispatch(command, arguments).await {
        Ok(value) => json!({
            "content": [{ "type": "text", "text": render_text(&value) }],
        }),
        Err(e) => json!({
            "content": [{ "type": "text", "text": e.to_string() }],
            "isError": true,
        }),
    })
}

fn render_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
    }
}

fn error_response(id: Value, code: i64, message: &str) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": { "code": code, "message": message },
    })
}

/// Serve requests from stdin until EOF, writing responses to stdout.
pub async fn serve_stdio(runtime: &PluginRuntime) -> Result<()> {
    let stdin = BufReader::new(tokio::io::stdin());
    let mut stdout = tokio::io::stdout();
    serve(runtime, stdin, &mut stdout).await
}

/// Serve line-delimited requests from `input`, writing to `output`.
pub async fn serve<R, W>(runtime: &PluginRuntime, input: R, output: &mut W) -> Result<()>
where
    R: tokio::io::AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    info!("Tool protocol server listening on stdio");
    let mut lines = input.lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        if let Some(response) = handle_message(runtime, &line).await {
            let mut encoded = match serde_json::to_string(&response) {
                Ok(encoded) => encoded,
                Err(e) => {
                    error!(error = %e, "Failed to encode response");
                    continue;
                }
            };
            encoded.push('\n');
            output.write_all(encoded.as_bytes()).await?;
            output.flush().await?;
        }
    }
    info!("Tool protocol input closed");
    Ok(())
}
