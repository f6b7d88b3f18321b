use std::sync::Arc;

use serde_json::{json, Value};

use ica_core::{assistant::Assistant, tools};

use crate::protocol::{
    is_response, negotiate_protocol_version, respond_err, respond_ok, Reply, RpcRequest,
    RpcResponse, INTERNAL_ERROR, INVALID_PARAMS, INVALID_REQUEST, JSONRPC_VERSION,
    METHOD_NOT_FOUND,
};

pub const SERVER_NAME: &str = "Intelligent Crypto Assistant";

const INSTRUCTIONS: &str = "Crypto market assistant. Use get_market_overview for a market briefing, \
get_coin_details for one coin (CoinGecko id) and get_realtime_news for recent Telegram channel news.";

/// Transport-independent JSON-RPC dispatcher.
pub struct McpServer {
    assistant: Arc<Assistant>,
    version: String,
}

impl McpServer {
    pub fn new(assistant: Arc<Assistant>, version: impl Into<String>) -> Self {
        Self {
            assistant,
            version: version.into(),
        }
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Handle one decoded JSON payload: a single message or a batch.
    ///
    /// Returns `None` when nothing needs to be sent back (notifications and
    /// client responses only).
    pub async fn handle_payload(&self, payload: Value) -> Option<Reply> {
        match payload {
            Value::Array(items) if items.is_empty() => Some(Reply::Single(respond_err(
                Value::Null,
                INVALID_REQUEST,
                "Invalid Request: empty batch",
            ))),
            Value::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    if let Some(resp) = self.handle_message(item).await {
                        out.push(resp);
                    }
                }
                (!out.is_empty()).then_some(Reply::Batch(out))
            }
            single => self.handle_message(single).await.map(Reply::Single),
        }
    }

    pub async fn handle_message(&self, msg: Value) -> Option<RpcResponse> {
        if !msg.is_object() {
            return Some(respond_err(
                Value::Null,
                INVALID_REQUEST,
                "Invalid Request: expected an object",
            ));
        }
        if is_response(&msg) {
            tracing::debug!("ignoring client response");
            return None;
        }

        let raw_id = msg.get("id").cloned().unwrap_or(Value::Null);
        let req = match serde_json::from_value::<RpcRequest>(msg) {
            Ok(req) => req,
            Err(e) => {
                return Some(respond_err(
                    raw_id,
                    INVALID_REQUEST,
                    format!("Invalid Request: {e}"),
                ))
            }
        };

        if req.jsonrpc.as_deref().is_some_and(|v| v != JSONRPC_VERSION) {
            return Some(respond_err(
                raw_id,
                INVALID_REQUEST,
                "Invalid Request: jsonrpc must be \"2.0\"",
            ));
        }

        // Notifications have no id => no response.
        let Some(id) = req.id else {
            tracing::debug!(method = %req.method, "notification");
            return None;
        };

        Some(self.dispatch(id, &req.method, req.params).await)
    }

    async fn dispatch(&self, id: Value, method: &str, params: Option<Value>) -> RpcResponse {
        tracing::debug!(method, "rpc request");

        match method {
            "initialize" => {
                let requested = params
                    .as_ref()
                    .and_then(|p| p.get("protocolVersion"))
                    .and_then(|v| v.as_str());
                let proto = negotiate_protocol_version(requested);

                if let Some(client) = params.as_ref().and_then(|p| p.get("clientInfo")) {
                    tracing::info!(
                        client = %client.get("name").and_then(|v| v.as_str()).unwrap_or("unknown"),
                        protocol = proto,
                        "mcp client initialized"
                    );
                }

                respond_ok(
                    id,
                    json!({
                        "protocolVersion": proto,
                        "serverInfo": { "name": SERVER_NAME, "version": self.version },
                        "capabilities": { "tools": { "listChanged": false } },
                        "instructions": INSTRUCTIONS
                    }),
                )
            }

            "ping" => respond_ok(id, json!({})),

            "tools/list" => respond_ok(id, json!({ "tools": tools::tool_specs() })),

            "tools/call" => self.call_tool(id, params).await,

            _ => respond_err(id, METHOD_NOT_FOUND, format!("Method not found: {method}")),
        }
    }

    async fn call_tool(&self, id: Value, params: Option<Value>) -> RpcResponse {
        let Some(params) = params.filter(Value::is_object) else {
            return respond_err(id, INVALID_PARAMS, "Missing params");
        };

        let Some(name) = params.get("name").and_then(|v| v.as_str()).map(str::to_string) else {
            return respond_err(id, INVALID_PARAMS, "Missing tool name");
        };

        let arguments = match params.get("arguments") {
            None | Some(Value::Null) => json!({}),
            Some(v @ Value::Object(_)) => v.clone(),
            Some(_) => return respond_err(id, INVALID_PARAMS, "'arguments' must be an object"),
        };

        // Run on its own task so a panicking tool cannot take the transport down.
        let assistant = Arc::clone(&self.assistant);
        let task_name = name.clone();
        let joined = tokio::spawn(async move {
            tools::call_tool(&assistant, &task_name, &arguments).await
        })
        .await;

        match joined {
            Ok(Some(outcome)) => respond_ok(
                id,
                json!({
                    "content": [{ "type": "text", "text": outcome.text }],
                    "isError": outcome.is_error
                }),
            ),
            Ok(None) => respond_err(id, INVALID_PARAMS, format!("Unknown tool: {name}")),
            Err(e) => {
                tracing::error!(tool = %name, error = %e, "tool task failed");
                respond_err(id, INTERNAL_ERROR, "Internal error")
            }
        }
    }
}
