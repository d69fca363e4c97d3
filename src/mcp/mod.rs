//! MCP server over stdio
//!
//! JSON-RPC 2.0, one message per line. Requests run concurrently and get
//! exactly one response line unless cancelled; notifications and client
//! responses get none.

use crate::tools::ToolRegistry;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::task::{AbortHandle, JoinSet};
use tracing::{debug, info, warn};

pub const MCP_PROTOCOL_VERSION: &str = "2024-11-05";
pub const MCP_SERVER_NAME: &str = "banking-gateway";

#[derive(Debug, Clone, PartialEq)]
pub struct RpcError {
    code: i64,
    message: String,
}

impl RpcError {
    fn parse_error(message: impl Into<String>) -> Self {
        Self {
            code: -32700,
            message: message.into(),
        }
    }

    fn invalid_request(message: impl Into<String>) -> Self {
        Self {
            code: -32600,
            message: message.into(),
        }
    }

    fn method_not_found(method: &str) -> Self {
        Self {
            code: -32601,
            message: format!("Method not found: {}", method),
        }
    }

    fn invalid_params(message: impl Into<String>) -> Self {
        Self {
            code: -32602,
            message: message.into(),
        }
    }
}

fn success_response(id: Value, result: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "result": result
    })
}

fn error_response(id: Value, error: RpcError) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": {
            "code": error.code,
            "message": error.message
        }
    })
}

/// Decode one input line. `None` for a blank line; `Err` carries the -32700
/// response for bytes that are not UTF-8 or not JSON.
fn parse_line(line: &[u8]) -> Option<Result<Value, Value>> {
    let text = match std::str::from_utf8(line) {
        Ok(text) => text.trim(),
        Err(e) => {
            warn!(error = %e, "MCP message is not valid UTF-8");
            return Some(Err(error_response(
                Value::Null,
                RpcError::parse_error(format!("Parse error: invalid UTF-8: {}", e)),
            )));
        }
    };
    if text.is_empty() {
        return None;
    }
    Some(serde_json::from_str::<Value>(text).map_err(|e| {
        warn!(error = %e, "Unparseable MCP message");
        error_response(
            Value::Null,
            RpcError::parse_error(format!("Parse error: {}", e)),
        )
    }))
}

/// Id of the request named by a `notifications/cancelled` message.
fn cancelled_request(incoming: &Value) -> Option<String> {
    if incoming.get("method").and_then(Value::as_str) != Some("notifications/cancelled")
        || incoming.get("id").is_some()
    {
        return None;
    }
    incoming
        .get("params")
        .and_then(|p| p.get("requestId"))
        .map(Value::to_string)
}

/// In-flight key for a request: its id in canonical JSON form.
fn request_key(incoming: &Value) -> Option<String> {
    incoming.get("method")?;
    incoming.get("id").map(Value::to_string)
}

async fn write_message<W>(writer: &mut W, message: &Value) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut encoded = serde_json::to_vec(message)?;
    encoded.push(b'\n');
    writer.write_all(&encoded).await?;
    writer.flush().await
}

#[derive(Clone)]
pub struct McpServer {
    registry: Arc<ToolRegistry>,
}

impl McpServer {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self { registry }
    }

    pub async fn serve_stdio(&self) -> std::io::Result<()> {
        let reader = BufReader::new(tokio::io::stdin());
        let writer = tokio::io::stdout();
        self.serve(reader, writer).await
    }

    /// Serve until the reader reaches end of input and every in-flight
    /// request has answered.
    ///
    /// Each message runs in its own task, so responses are written in
    /// completion order. `notifications/cancelled` aborts the named request,
    /// which then gets no response.
    pub async fn serve<R, W>(&self, mut reader: R, mut writer: W) -> std::io::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        info!(tools = self.registry.len(), "MCP server listening on stdio");

        let mut tasks: JoinSet<(Option<String>, Option<Value>)> = JoinSet::new();
        let mut in_flight: HashMap<String, AbortHandle> = HashMap::new();
        // Kept across iterations: a partially read line survives select! picking another branch.
        let mut buf = Vec::new();
        let mut input_open = true;

        loop {
            tokio::select! {
                read = reader.read_until(b'\n', &mut buf), if input_open => {
                    if read? == 0 {
                        input_open = false;
                        continue;
                    }
                    let line = std::mem::take(&mut buf);
                    let incoming = match parse_line(&line) {
                        Some(Ok(incoming)) => incoming,
                        Some(Err(response)) => {
                            write_message(&mut writer, &response).await?;
                            continue;
                        }
                        None => continue,
                    };

                    if let Some(request_id) = cancelled_request(&incoming) {
                        if let Some(handle) = in_flight.remove(&request_id) {
                            info!(request_id = %request_id, "Cancelling in-flight MCP request");
                            handle.abort();
                        }
                        continue;
                    }

                    let key = request_key(&incoming);
                    let server = self.clone();
                    let task_key = key.clone();
                    let handle = tasks.spawn(async move {
                        (task_key, server.handle_message(incoming).await)
                    });
                    if let Some(key) = key {
                        in_flight.insert(key, handle);
                    }
                }
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    match joined {
                        Ok((key, response)) => {
                            if let Some(key) = key {
                                in_flight.remove(&key);
                            }
                            if let Some(response) = response {
                                write_message(&mut writer, &response).await?;
                            }
                        }
                        Err(e) if e.is_cancelled() => {}
                        Err(e) => warn!(error = %e, "MCP request task failed"),
                    }
                }
                else => break,
            }
        }

        info!("MCP input closed, shutting down");
        Ok(())
    }

    pub async fn handle_message(&self, incoming: Value) -> Option<Value> {
        let Some(obj) = incoming.as_object() else {
            return Some(error_response(
                Value::Null,
                RpcError::invalid_request("Request must be a JSON object"),
            ));
        };

        if obj.get("jsonrpc").and_then(Value::as_str) != Some("2.0") {
            let id = obj.get("id").cloned().unwrap_or(Value::Null);
            return Some(error_response(
                id,
                RpcError::invalid_request("jsonrpc must be '2.0'"),
            ));
        }

        // Without a method this is a client response; nothing to answer.
        let method = obj.get("method").and_then(Value::as_str)?;

        let params = obj.get("params").cloned().unwrap_or(Value::Null);
        match obj.get("id").cloned() {
            Some(id) => {
                debug!(method, "MCP request");
                Some(match self.handle_request(method, params).await {
                    Ok(result) => success_response(id, result),
                    Err(err) => error_response(id, err),
                })
            }
            None => {
                debug!(method, "MCP notification ignored");
                None
            }
        }
    }

    async fn handle_request(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        match method {
            "initialize" => Ok(self.initialize_payload()),
            "ping" => Ok(json!({})),
            "tools/list" => Ok(self.tools_list_payload()),
            "tools/call" => self.handle_tools_call(params).await,
            _ => Err(RpcError::method_not_found(method)),
        }
    }

    fn initialize_payload(&self) -> Value {
        json!({
            "protocolVersion": MCP_PROTOCOL_VERSION,
            "capabilities": {
                "tools": {
                    "listChanged": false
                }
            },
            "serverInfo": {
                "name": MCP_SERVER_NAME,
                "version": env!("CARGO_PKG_VERSION")
            },
            "instructions": "Banking operations against an Open Bank Project platform. Every tool returns an envelope with success, data, count and error fields."
        })
    }

    fn tools_list_payload(&self) -> Value {
        json!({ "tools": self.registry.definitions() })
    }

    async fn handle_tools_call(&self, params: Value) -> Result<Value, RpcError> {
        let params = params
            .as_object()
            .ok_or_else(|| RpcError::invalid_params("tools/call params must be an object"))?;

        let name = params
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| RpcError::invalid_params("tools/call requires string field 'name'"))?;

        let args = match params.get("arguments") {
            Some(Value::Object(map)) => map.clone(),
            Some(Value::Null) | None => Map::new(),
            Some(_) => {
                return Err(RpcError::invalid_params(
                    "tools/call 'arguments' must be an object",
                ));
            }
        };

        let tool = self
            .registry
            .get(name)
            .ok_or_else(|| RpcError::invalid_params(format!("Unknown tool: {}", name)))?;

        let envelope = tool.execute(Value::Object(args)).await;
        let structured = envelope.to_json();
        let text = serde_json::to_string_pretty(&structured).unwrap_or_else(|_| structured.to_string());

        Ok(json!({
            "content": [{ "type": "text", "text": text }],
            "structuredContent": structured,
            "isError": !envelope.success
        }))
    }
}
