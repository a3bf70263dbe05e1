//! Bridge to MCP-style tool servers spoken to over stdio JSON-RPC.
//!
//! Discovery runs once at load time and fails loudly; every subsequent
//! tool invocation opens a fresh connection, performs the handshake,
//! calls the one tool and closes. Connections are never shared across
//! invocations.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::{debug, warn};

use crate::errors::{AgentError, AgentResult};
use crate::models::tool::Tool;
use crate::tools::FunctionTool;

const PROTOCOL_VERSION: &str = "2025-06-18";
const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(60);

/// How to reach one tool server: the command to spawn plus its
/// environment. Cheap to clone; every invocation clones it into the
/// produced tool's closure.
#[derive(Debug, Clone)]
pub struct McpServerConfig {
    pub command: String,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
    pub workdir: Option<PathBuf>,
    pub call_timeout: Duration,
}

impl McpServerConfig {
    pub fn new<S: Into<String>>(command: S) -> Self {
        McpServerConfig {
            command: command.into(),
            args: Vec::new(),
            env: HashMap::new(),
            workdir: None,
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_env<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }
}

/// Discover the server's tool catalogue and wrap every listed tool as a
/// local FunctionTool. Fails with `AgentError::Discovery` if the server
/// cannot be reached or the listing is malformed; nothing is registered
/// in that case.
pub async fn load_mcp_tools(config: &McpServerConfig) -> AgentResult<Vec<FunctionTool>> {
    let discovery = |err: AgentError| AgentError::Discovery(err.to_string());

    let mut connection = McpConnection::open(config).await.map_err(discovery)?;
    let listing = async {
        connection.handshake().await?;
        connection.request("tools/list", json!({})).await
    }
    .await;
    connection.close().await;

    let descriptors = parse_tool_listing(&listing.map_err(discovery)?)?;
    debug!(
        command = %config.command,
        tools = descriptors.len(),
        "discovered remote tool catalogue"
    );

    let tools = descriptors
        .into_iter()
        .map(|descriptor| {
            let config = config.clone();
            let tool_name = descriptor.name.clone();
            FunctionTool::new(descriptor, move |arguments| {
                call_remote_tool(config.clone(), tool_name.clone(), arguments)
            })
        })
        .collect();

    Ok(tools)
}

/// One remote invocation: fresh connection, handshake, tools/call, close.
async fn call_remote_tool(
    config: McpServerConfig,
    tool: String,
    arguments: Value,
) -> AgentResult<Value> {
    let call = async {
        let mut connection = McpConnection::open(&config).await?;
        let result = async {
            connection.handshake().await?;
            let params = json!({
                "name": tool,
                "arguments": match arguments {
                    Value::Null => json!({}),
                    other => other,
                },
            });
            connection.request("tools/call", params).await
        }
        .await;
        connection.close().await;
        result
    };

    let result = tokio::time::timeout(config.call_timeout, call)
        .await
        .map_err(|_| {
            AgentError::ExecutionError(format!(
                "remote tool call timed out after {:?}",
                config.call_timeout
            ))
        })??;

    let text = extract_text(&result);
    if result.get("isError").and_then(Value::as_bool).unwrap_or(false) {
        return Err(AgentError::ExecutionError(text));
    }
    Ok(Value::String(text))
}

/// Convert a `tools/list` result into local descriptors. A missing or
/// malformed `tools` array is a discovery failure, not an empty catalogue.
fn parse_tool_listing(listing: &Value) -> AgentResult<Vec<Tool>> {
    let tools = listing
        .get("tools")
        .and_then(Value::as_array)
        .ok_or_else(|| {
            AgentError::Discovery("tool listing is missing a 'tools' array".to_string())
        })?;

    tools
        .iter()
        .map(|entry| {
            let name = entry
                .get("name")
                .and_then(Value::as_str)
                .ok_or_else(|| {
                    AgentError::Discovery("listed tool is missing a name".to_string())
                })?;
            let description = entry
                .get("description")
                .and_then(Value::as_str)
                .unwrap_or_default();
            let schema = entry
                .get("inputSchema")
                .cloned()
                .unwrap_or_else(|| json!({"type": "object", "properties": {}}));
            Ok(Tool::new(name, description, schema))
        })
        .collect()
}

/// Concatenate the textual parts of a `tools/call` result payload
fn extract_text(result: &Value) -> String {
    result
        .get("content")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter(|item| item.get("type").and_then(Value::as_str) == Some("text"))
                .filter_map(|item| item.get("text").and_then(Value::as_str))
                .collect::<Vec<_>>()
                .join("\n")
        })
        .unwrap_or_default()
}

/// A single short-lived stdio connection. Requests are strictly
/// sequential, so responses are matched by reading until our id appears;
/// server notifications in between are skipped.
struct McpConnection {
    command: String,
    child: Child,
    writer: BufWriter<ChildStdin>,
    lines: Lines<BufReader<ChildStdout>>,
    next_id: u64,
}

impl McpConnection {
    async fn open(config: &McpServerConfig) -> AgentResult<Self> {
        let mut command = Command::new(&config.command);
        command
            .args(&config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        if let Some(dir) = &config.workdir {
            command.current_dir(dir);
        }
        for (key, value) in &config.env {
            command.env(key, value);
        }

        let mut child = command.spawn().map_err(|source| {
            AgentError::ExecutionError(format!(
                "failed to spawn tool server '{}': {source}",
                config.command
            ))
        })?;

        let stdin = child.stdin.take().ok_or_else(|| {
            AgentError::ExecutionError("failed to capture server stdin".to_string())
        })?;
        let stdout = child.stdout.take().ok_or_else(|| {
            AgentError::ExecutionError("failed to capture server stdout".to_string())
        })?;

        Ok(McpConnection {
            command: config.command.clone(),
            child,
            writer: BufWriter::new(stdin),
            lines: BufReader::new(stdout).lines(),
            next_id: 1,
        })
    }

    async fn handshake(&mut self) -> AgentResult<()> {
        let params = json!({
            "protocolVersion": PROTOCOL_VERSION,
            "clientInfo": {
                "name": env!("CARGO_PKG_NAME"),
                "version": env!("CARGO_PKG_VERSION"),
            },
            "capabilities": {},
        });
        self.request("initialize", params).await?;
        self.notify("notifications/initialized", json!({})).await
    }

    async fn request(&mut self, method: &str, params: Value) -> AgentResult<Value> {
        let id = self.next_id;
        self.next_id += 1;

        self.write_message(&json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        }))
        .await?;

        loop {
            let line = self
                .lines
                .next_line()
                .await
                .map_err(|source| self.transport_error(source.to_string()))?
                .ok_or_else(|| self.transport_error("server closed the connection".into()))?;
            if line.trim().is_empty() {
                continue;
            }

            let message: Value = match serde_json::from_str(&line) {
                Ok(message) => message,
                Err(source) => {
                    warn!(command = %self.command, %source, "invalid JSON from tool server");
                    continue;
                }
            };

            if message.get("id").and_then(Value::as_u64) != Some(id) {
                // notification or unrelated traffic
                continue;
            }

            if let Some(error) = message.get("error") {
                let code = error.get("code").and_then(Value::as_i64).unwrap_or(-32000);
                let text = error
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown error");
                return Err(AgentError::ExecutionError(format!(
                    "tool server '{}' returned JSON-RPC error {code}: {text}",
                    self.command
                )));
            }

            return Ok(message.get("result").cloned().unwrap_or(Value::Null));
        }
    }

    async fn notify(&mut self, method: &str, params: Value) -> AgentResult<()> {
        self.write_message(&json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
        }))
        .await
    }

    async fn write_message(&mut self, message: &Value) -> AgentResult<()> {
        let encoded =
            serde_json::to_string(message).map_err(|source| self.transport_error(source.to_string()))?;
        self.writer
            .write_all(encoded.as_bytes())
            .await
            .map_err(|source| self.transport_error(source.to_string()))?;
        self.writer
            .write_all(b"\n")
            .await
            .map_err(|source| self.transport_error(source.to_string()))?;
        self.writer
            .flush()
            .await
            .map_err(|source| self.transport_error(source.to_string()))
    }

    async fn close(mut self) {
        if let Err(err) = self.child.kill().await {
            debug!(
                command = %self.command,
                %err,
                "failed to kill tool server process (may have already exited)"
            );
        }
        let _ = self.child.wait().await;
    }

    fn transport_error(&self, message: String) -> AgentError {
        AgentError::ExecutionError(format!(
            "tool server '{}' transport error: {message}",
            self.command
        ))
    }
}
