//! JSON-RPC 2.0 message types for the MCP stdio protocol.
//!
//! # Protocol Overview
//!
//! - **Requests**: client → server (`initialize`, `tools/list`, `tools/call`,
//!   `ping`) and occasionally server → client (`ping`)
//! - **Responses**: carry either `result` or `error`, correlated by `id`
//! - **Notifications**: no `id` (`notifications/initialized`,
//!   `notifications/tools/list_changed`, `notifications/message`)

use crate::mcp::error::ProtocolError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

pub const JSONRPC_VERSION: &str = "2.0";

/// Version sent in `initialize`.
pub const PROTOCOL_VERSION: &str = "2025-06-18";

/// Versions accepted in the `initialize` reply.
pub const SUPPORTED_PROTOCOL_VERSIONS: &[&str] = &["2025-06-18", "2025-03-26", "2024-11-05"];

pub const METHOD_NOT_FOUND: i64 = -32601;

pub mod methods {
    pub const INITIALIZE: &str = "initialize";
    pub const INITIALIZED: &str = "notifications/initialized";
    pub const PING: &str = "ping";
    pub const TOOLS_LIST: &str = "tools/list";
    pub const TOOLS_CALL: &str = "tools/call";
    pub const TOOLS_LIST_CHANGED: &str = "notifications/tools/list_changed";
    pub const LOG_MESSAGE: &str = "notifications/message";
}

/// JSON-RPC error object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// One JSON-RPC message in either direction.
///
/// Ids stay as raw JSON values because servers may use strings for the
/// requests they send; ids of our own requests are always integers.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Request {
        id: Value,
        method: String,
        params: Option<Value>,
    },
    Notification {
        method: String,
        params: Option<Value>,
    },
    Response {
        id: Value,
        result: Value,
    },
    ErrorResponse {
        id: Value,
        error: RpcError,
    },
}

impl Message {
    pub fn request(id: u64, method: impl Into<String>, params: Option<Value>) -> Self {
        Message::Request {
            id: Value::from(id),
            method: method.into(),
            params,
        }
    }

    pub fn notification(method: impl Into<String>, params: Option<Value>) -> Self {
        Message::Notification {
            method: method.into(),
            params,
        }
    }

    /// Parse one frame body.
    pub fn parse(body: &[u8]) -> Result<Self, ProtocolError> {
        let malformed = |detail: String| ProtocolError::MalformedMessage {
            detail,
            raw: String::from_utf8_lossy(body).into_owned(),
        };

        let value: Value = serde_json::from_slice(body).map_err(|e| malformed(e.to_string()))?;
        let Value::Object(mut obj) = value else {
            return Err(malformed("message is not a JSON object".into()));
        };

        if let Some(version) = obj.get("jsonrpc")
            && version.as_str() != Some(JSONRPC_VERSION)
        {
            return Err(malformed(format!("unsupported jsonrpc version {version}")));
        }

        let id = obj.remove("id").filter(|v| !v.is_null());
        let method = match obj.remove("method") {
            Some(Value::String(m)) => Some(m),
            Some(other) => return Err(malformed(format!("method is not a string: {other}"))),
            None => None,
        };
        let params = obj.remove("params");

        match (method, id) {
            (Some(method), Some(id)) => Ok(Message::Request { id, method, params }),
            (Some(method), None) => Ok(Message::Notification { method, params }),
            (None, id) => {
                if let Some(error) = obj.remove("error") {
                    let error: RpcError = serde_json::from_value(error)
                        .map_err(|e| malformed(format!("invalid error object: {e}")))?;
                    Ok(Message::ErrorResponse {
                        id: id.unwrap_or(Value::Null),
                        error,
                    })
                } else if let Some(result) = obj.remove("result") {
                    let id = id.ok_or_else(|| malformed("response without id".into()))?;
                    Ok(Message::Response { id, result })
                } else {
                    Err(malformed(
                        "message has neither method nor result/error".into(),
                    ))
                }
            }
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            Message::Request { id, method, params } => {
                let mut v = json!({"jsonrpc": JSONRPC_VERSION, "id": id, "method": method});
                if let Some(p) = params {
                    v["params"] = p.clone();
                }
                v
            }
            Message::Notification { method, params } => {
                let mut v = json!({"jsonrpc": JSONRPC_VERSION, "method": method});
                if let Some(p) = params {
                    v["params"] = p.clone();
                }
                v
            }
            Message::Response { id, result } => {
                json!({"jsonrpc": JSONRPC_VERSION, "id": id, "result": result})
            }
            Message::ErrorResponse { id, error } => {
                json!({"jsonrpc": JSONRPC_VERSION, "id": id, "error": error})
            }
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        // Serializing a Value cannot fail.
        serde_json::to_vec(&self.to_value()).unwrap_or_default()
    }

    /// Short label for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Request { .. } => "request",
            Message::Notification { .. } => "notification",
            Message::Response { .. } => "response",
            Message::ErrorResponse { .. } => "error response",
        }
    }
}

/// `serverInfo` / `clientInfo`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Implementation {
    pub name: String,
    #[serde(default)]
    pub version: String,
}

/// `initialize` result
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResult {
    pub protocol_version: String,
    #[serde(default)]
    pub capabilities: Value,
    #[serde(default)]
    pub server_info: Implementation,
    #[serde(default)]
    pub instructions: Option<String>,
}

pub fn initialize_params(client: &Implementation) -> Value {
    json!({
        "protocolVersion": PROTOCOL_VERSION,
        "capabilities": {},
        "clientInfo": client,
    })
}

/// `tools/list` result page
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListToolsPage {
    #[serde(default)]
    pub tools: Vec<Value>,
    #[serde(default)]
    pub next_cursor: Option<String>,
}

/// `tools/call` result
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallToolResult {
    #[serde(default)]
    pub content: Vec<Value>,
    #[serde(default)]
    pub is_error: bool,
    #[serde(default)]
    pub structured_content: Option<Value>,
}

impl CallToolResult {
    /// Flatten the content blocks into one string.
    ///
    /// Text blocks contribute their text; other blocks are rendered as
    /// JSON. With no content, structured content is used instead.
    pub fn text(&self) -> String {
        let parts: Vec<String> = self
            .content
            .iter()
            .map(|block| match block.get("type").and_then(|t| t.as_str()) {
                Some("text") => block
                    .get("text")
                    .and_then(|t| t.as_str())
                    .unwrap_or_default()
                    .to_string(),
                _ => block.to_string(),
            })
            .collect();

        if parts.is_empty() {
            return self
                .structured_content
                .as_ref()
                .map(|v| v.to_string())
                .unwrap_or_default();
        }
        parts.join("\n")
    }
}

pub fn call_tool_params(name: &str, arguments: &Map<String, Value>) -> Value {
    json!({ "name": name, "arguments": arguments })
}
