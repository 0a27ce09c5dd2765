//! Tool server port
//!
//! A [`ToolServer`] is one connected MCP server as seen by the application
//! layer: a session that can list and call tools. The infrastructure layer
//! backs it with a protocol session over a child process.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::time::Duration;
use thiserror::Error;
use wrp_domain::{ToolFailure, ToolOutput};

/// Failures of a tool server request.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ToolServerError {
    #[error("session to server '{server}' is closed: {reason}")]
    Closed { server: String, reason: String },

    #[error("{method} to server '{server}' timed out after {}s (id={id})", .after.as_secs_f64())]
    Timeout {
        server: String,
        method: String,
        id: u64,
        after: Duration,
    },

    #[error("server '{server}' answered {method} (id={id}) with error {code}: {message}{}", error_data_suffix(.data.as_ref()))]
    Rpc {
        server: String,
        method: String,
        id: u64,
        code: i64,
        message: String,
        data: Option<Value>,
    },

    #[error("protocol error from server '{server}': {detail}")]
    Protocol { server: String, detail: String },
}

impl ToolServerError {
    /// Tool-result category this error is reported as.
    pub fn failure(&self) -> ToolFailure {
        match self {
            ToolServerError::Closed { .. } => ToolFailure::SessionClosed,
            ToolServerError::Timeout { .. } => ToolFailure::Timeout,
            ToolServerError::Rpc { .. } | ToolServerError::Protocol { .. } => {
                ToolFailure::ServerError
            }
        }
    }

    /// Error tool result for a call to `tool`.
    pub fn into_output(self, tool: &str) -> ToolOutput {
        ToolOutput::failure(self.failure(), format!("tool '{tool}' failed: {self}"))
    }
}

/// ` (data: {...})` for the optional `data` of a JSON-RPC error, or nothing.
pub fn error_data_suffix(data: Option<&Value>) -> String {
    match data {
        Some(data) if !data.is_null() => format!(" (data: {data})"),
        _ => String::new(),
    }
}

/// Port for one connected tool server.
///
/// `session_id` changes every time the server is reconnected, and
/// `tools_revision` changes whenever the server announces that its tool
/// list changed. Together they tell the registry when cached descriptors
/// are stale.
#[async_trait]
pub trait ToolServer: Send + Sync {
    /// Configured server name
    fn name(&self) -> &str;

    /// Identity of the current session
    fn session_id(&self) -> u64;

    /// Whether the session is ready to accept requests
    fn is_ready(&self) -> bool;

    /// Counter bumped on every `tools/list_changed` notification
    fn tools_revision(&self) -> u64;

    /// Raw `tools/list` entries (all pages).
    async fn list_tools(&self, timeout: Duration) -> Result<Vec<Value>, ToolServerError>;

    /// Invoke a tool. A server-side error result comes back as an error
    /// [`ToolOutput`], not as `Err`.
    async fn call_tool(
        &self,
        name: &str,
        arguments: &Map<String, Value>,
        timeout: Duration,
    ) -> Result<ToolOutput, ToolServerError>;
}
